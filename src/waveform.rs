//! Metering downsampling and display helpers.
//!
//! Turns the raw metering history of a memo into a fixed number of bars,
//! maps decibels to bar heights, and formats playback times.

/// Number of bars drawn per memo.
pub const WAVEFORM_BARS: usize = 50;

/// Level shown while nothing is being recorded.
pub const SILENCE_DB: f32 = -100.0;

/// dB range mapped onto bar heights.
pub const BAR_DB_RANGE: [f32; 2] = [-60.0, 0.0];

/// Bar height range, in layout units.
pub const BAR_HEIGHT_RANGE: [f32; 2] = [5.0, 50.0];

/// Averages `samples` into at most `buckets` values.
///
/// Bucket `i` covers indices `floor(i*N/B) .. ceil((i+1)*N/B)`. Neighbouring
/// buckets may share a boundary sample, and with fewer samples than buckets
/// a sample is repeated across several bars. Empty buckets are skipped.
pub fn downsample(samples: &[f32], buckets: usize) -> Vec<f32> {
    let n = samples.len();
    if n == 0 || buckets == 0 {
        return Vec::new();
    }

    let mut averages = Vec::with_capacity(buckets);
    for i in 0..buckets {
        let start = i * n / buckets;
        let end = ((i + 1) * n).div_ceil(buckets).min(n);
        if start >= end {
            continue;
        }

        let values = &samples[start..end];
        let sum: f32 = values.iter().sum();
        averages.push(sum / values.len() as f32);
    }

    averages
}

/// Piecewise-linear interpolation over ascending breakpoints, clamped at
/// both ends.
///
/// `input` and `output` must have the same length (at least 2).
pub fn interpolate(value: f32, input: &[f32], output: &[f32]) -> f32 {
    debug_assert_eq!(input.len(), output.len());
    let len = input.len().min(output.len());
    if len == 0 {
        return 0.0;
    }
    if len == 1 || value <= input[0] {
        return output[0];
    }
    if value >= input[len - 1] {
        return output[len - 1];
    }

    for i in 1..len {
        if value <= input[i] {
            let (x0, x1) = (input[i - 1], input[i]);
            let (y0, y1) = (output[i - 1], output[i]);
            if x1 == x0 {
                return y1;
            }
            return y0 + (value - x0) / (x1 - x0) * (y1 - y0);
        }
    }

    output[len - 1]
}

/// Bar height for a metering value: [-60, 0] dB onto [5, 50], clamped.
pub fn bar_height(db: f32) -> f32 {
    interpolate(db, &BAR_DB_RANGE, &BAR_HEIGHT_RANGE)
}

/// Whether bar `index` of `len` lies behind the playback position.
pub fn bar_is_played(progress: f64, index: usize, len: usize) -> bool {
    len > 0 && progress > index as f64 / len as f64
}

/// Size offset of the record-button pulse for the live input level.
///
/// Silent input (below -60 dB) keeps the pulse at rest; a full-scale level
/// grows it by 30 units.
pub fn pulse_size(level_db: f32) -> f32 {
    interpolate(level_db, &[-160.0, -60.0, 0.0], &[0.0, 0.0, 30.0])
}

/// Opacity of the record-button pulse for the live input level.
pub fn pulse_opacity(level_db: f32) -> f32 {
    interpolate(level_db, &[-160.0, -60.0, -10.0], &[0.7, 0.3, 0.7])
}

/// Formats milliseconds as `m:ss`.
pub fn format_millis(millis: u64) -> String {
    let minutes = millis / (1000 * 60);
    let seconds = (millis % (1000 * 60)) / 1000;
    format!("{minutes}:{seconds:02}")
}
