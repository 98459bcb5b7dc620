//! Interactive terminal UI for the memo session.
//!
//! Shows the memo list with a waveform and playback progress per item, a
//! live level sparkline while recording, and a footer with the record
//! indicator.

use crate::waveform::{self, bar_height, bar_is_played, format_millis, BAR_HEIGHT_RANGE};
use anyhow::Result;
use crossterm::{
    event::{self, Event, KeyCode, KeyEvent, KeyModifiers},
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    prelude::*,
    widgets::{Block, Borders, HighlightSpacing, List, ListItem, ListState, Padding, Paragraph, Sparkline},
};
use std::io::{self, Stdout};
use std::time::{Duration, Instant};

const BG: Color = Color::Rgb(0, 0, 0);
const FG: Color = Color::Rgb(255, 255, 255);
const MUTED_FG: Color = Color::Rgb(100, 100, 100);
const PLAYED_FG: Color = Color::Rgb(206, 224, 220);
const UNPLAYED_FG: Color = Color::Rgb(70, 80, 82);
const HIGHLIGHT_BG: Color = Color::Rgb(20, 20, 20);
const NOTICE_BG: Color = Color::Rgb(255, 0, 0);

const LIVE_HEIGHT: u16 = 5;
const NOTICE_TTL: Duration = Duration::from_secs(4);
const BAR_GLYPHS: [char; 8] = ['▁', '▂', '▃', '▄', '▅', '▆', '▇', '█'];

/// User input during the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCommand {
    /// No key or an unbound key
    Continue,
    /// Start or stop recording (Space or 'r')
    ToggleRecording,
    /// Play/pause the selected memo (Enter or 'p')
    TogglePlayback,
    /// Quit (Escape, 'q' or Ctrl+C)
    Quit,
}

/// Display data for one memo row.
#[derive(Debug, Clone, PartialEq)]
pub struct MemoRow {
    pub title: String,
    /// Downsampled metering in dB
    pub bars: Vec<f32>,
    pub progress: f64,
    pub is_playing: bool,
    pub position_millis: u64,
    pub duration_millis: u64,
}

/// Everything one frame needs.
#[derive(Debug, Clone, Default)]
pub struct SessionView {
    pub rows: Vec<MemoRow>,
    pub is_recording: bool,
    /// Length of the current recording as reported by the engine
    pub recording_millis: u64,
    pub level_db: f32,
    pub live_metering: Vec<f32>,
}

/// Terminal UI for the memo session.
pub struct MemoTui {
    terminal: Terminal<CrosstermBackend<Stdout>>,
    list_state: ListState,
    notice: Option<(String, Instant)>,
}

impl MemoTui {
    /// Creates the TUI and enters alternate screen mode.
    ///
    /// # Errors
    /// - If terminal cannot be initialized
    /// - If raw mode cannot be enabled
    pub fn new() -> Result<Self> {
        enable_raw_mode()?;
        let mut stdout = io::stdout();
        execute!(stdout, EnterAlternateScreen)?;

        let backend = CrosstermBackend::new(stdout);
        let terminal = Terminal::new(backend)?;

        Ok(Self {
            terminal,
            list_state: ListState::default(),
            notice: None,
        })
    }

    /// Index of the selected memo, if any.
    pub fn selected(&self) -> Option<usize> {
        self.list_state.selected()
    }

    /// Moves the selection to the newest memo.
    pub fn select_first(&mut self) {
        self.list_state.select(Some(0));
    }

    /// Shows a message in the footer for a few seconds.
    pub fn notify(&mut self, message: impl Into<String>) {
        self.notice = Some((message.into(), Instant::now()));
    }

    /// Processes pending input.
    ///
    /// Selection keys are handled here; everything else is returned.
    ///
    /// # Errors
    /// - If event polling fails
    pub fn handle_input(&mut self, memo_count: usize) -> Result<SessionCommand> {
        if event::poll(Duration::from_millis(50))? {
            if let Event::Key(key) = event::read()? {
                return Ok(self.handle_key(key, memo_count));
            }
        }
        Ok(SessionCommand::Continue)
    }

    fn handle_key(&mut self, key: KeyEvent, memo_count: usize) -> SessionCommand {
        match key.code {
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                tracing::debug!("Ctrl+C pressed: quitting");
                SessionCommand::Quit
            }
            KeyCode::Char('q') | KeyCode::Esc => {
                tracing::debug!("Escape or 'q' pressed: quitting");
                SessionCommand::Quit
            }
            KeyCode::Char(' ') | KeyCode::Char('r') => SessionCommand::ToggleRecording,
            KeyCode::Enter | KeyCode::Char('p') => SessionCommand::TogglePlayback,
            KeyCode::Up | KeyCode::Char('k') => {
                if memo_count > 0 {
                    self.list_state.select_previous();
                }
                SessionCommand::Continue
            }
            KeyCode::Down | KeyCode::Char('j') => {
                if memo_count > 0 {
                    let next = self.list_state.selected().map_or(0, |i| i + 1);
                    self.list_state.select(Some(next.min(memo_count - 1)));
                }
                SessionCommand::Continue
            }
            _ => SessionCommand::Continue,
        }
    }

    /// Renders one frame.
    ///
    /// # Errors
    /// - If terminal rendering fails
    pub fn draw(&mut self, view: &SessionView) -> Result<()> {
        if self
            .notice
            .as_ref()
            .is_some_and(|(_, shown)| shown.elapsed() >= NOTICE_TTL)
        {
            self.notice = None;
        }
        let notice = self.notice.as_ref().map(|(message, _)| message.clone());
        let list_state = &mut self.list_state;

        self.terminal.draw(|frame| {
            let area = frame.area();

            let padding_block = Block::default()
                .padding(Padding::horizontal(1))
                .style(Style::default().fg(FG).bg(BG));
            frame.render_widget(&padding_block, area);
            let inner_area = padding_block.inner(area);

            let live_height = if view.is_recording { LIVE_HEIGHT } else { 0 };
            let [list_area, live_area, footer_area] = Layout::vertical([
                Constraint::Min(0),
                Constraint::Length(live_height),
                Constraint::Length(1),
            ])
            .areas(inner_area);

            // Rows are rebuilt every frame so progress tracks the controllers
            let bar_width = list_area.width.saturating_sub(24) as usize;
            let items: Vec<ListItem> = view
                .rows
                .iter()
                .map(|row| ListItem::new(memo_line(row, bar_width)))
                .collect();

            let list = List::new(items)
                .block(
                    Block::default()
                        .title(" Memos ")
                        .borders(Borders::ALL),
                )
                .highlight_style(Style::default().bg(HIGHLIGHT_BG))
                .highlight_symbol("> ")
                .highlight_spacing(HighlightSpacing::Always);

            frame.render_stateful_widget(list, list_area, list_state);

            if view.is_recording {
                let data = live_sparkline_data(&view.live_metering, live_area.width as usize);
                let sparkline = Sparkline::default()
                    .data(&data)
                    .max(BAR_HEIGHT_RANGE[1] as u64)
                    .style(Style::default().bg(BG).fg(PLAYED_FG));
                frame.render_widget(sparkline, live_area);
            }

            let footer = match &notice {
                Some(message) => Paragraph::new(message.as_str())
                    .style(Style::default().fg(FG).bg(NOTICE_BG)),
                None => Paragraph::new(footer_line(view)).style(Style::default().fg(MUTED_FG)),
            };
            frame.render_widget(footer, footer_area);
        })?;

        Ok(())
    }

    /// Cleans up terminal state and exits alternate screen mode.
    ///
    /// # Errors
    /// - If terminal mode cannot be disabled
    pub fn cleanup(&mut self) -> Result<()> {
        disable_raw_mode()?;
        execute!(self.terminal.backend_mut(), LeaveAlternateScreen)?;
        self.terminal.show_cursor()?;
        Ok(())
    }
}

impl Drop for MemoTui {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}

/// Block glyph for a bar height in layout units.
pub fn bar_glyph(height: f32) -> char {
    let [min, max] = BAR_HEIGHT_RANGE;
    let fraction = ((height - min) / (max - min)).clamp(0.0, 1.0);
    let index = (fraction * (BAR_GLYPHS.len() - 1) as f32).round() as usize;
    BAR_GLYPHS[index]
}

/// Waveform spans for a memo, played bars highlighted.
///
/// Bars are resampled to at most `width` cells; a narrow terminal shows fewer
/// bars rather than wrapping.
pub fn waveform_spans(bars: &[f32], progress: f64, width: usize) -> Vec<Span<'static>> {
    let cells = if bars.len() > width {
        waveform::downsample(bars, width)
    } else {
        bars.to_vec()
    };

    cells
        .iter()
        .enumerate()
        .map(|(index, db)| {
            let colour = if bar_is_played(progress, index, cells.len()) {
                PLAYED_FG
            } else {
                UNPLAYED_FG
            };
            Span::styled(bar_glyph(bar_height(*db)).to_string(), Style::default().fg(colour))
        })
        .collect()
}

fn memo_line(row: &MemoRow, bar_width: usize) -> Line<'static> {
    let icon = if row.is_playing { "⏸ " } else { "▶ " };
    let mut spans = vec![
        Span::styled(icon, Style::default().fg(FG)),
        Span::styled(format!("{} ", row.title), Style::default().fg(MUTED_FG)),
    ];
    spans.extend(waveform_spans(&row.bars, row.progress, bar_width));
    spans.push(Span::styled(
        format!(
            " {} / {}",
            format_millis(row.position_millis),
            format_millis(row.duration_millis)
        ),
        Style::default().fg(FG),
    ));
    Line::from(spans)
}

/// Most recent `width` live levels as sparkline heights.
pub fn live_sparkline_data(metering: &[f32], width: usize) -> Vec<u64> {
    let start = metering.len().saturating_sub(width);
    metering[start..]
        .iter()
        .map(|db| bar_height(*db).round() as u64)
        .collect()
}

/// Record indicator: a dot whose trail and brightness follow the input level.
pub fn record_indicator(level_db: f32) -> Span<'static> {
    let trail = (waveform::pulse_size(level_db) / 10.0).round() as usize;
    let red = (120.0 + 135.0 * waveform::pulse_opacity(level_db)).clamp(0.0, 255.0) as u8;
    Span::styled(
        format!("●{} ", "•".repeat(trail)),
        Style::default().fg(Color::Rgb(red, 0, 0)),
    )
}

fn footer_line(view: &SessionView) -> Line<'static> {
    let status = if view.is_recording {
        vec![
            record_indicator(view.level_db),
            Span::styled(
                format_millis(view.recording_millis),
                Style::default().fg(FG),
            ),
        ]
    } else {
        vec![Span::styled("○ idle", Style::default().fg(MUTED_FG))]
    };

    let mut spans = status;
    spans.push(Span::raw("   space record, ↵ play, ↑↓ select, esc/q quit"));
    Line::from(spans)
}
