//! Recording feature for vmemo.
//!
//! A single session drives capture from the input device through to a
//! stored memo.

pub mod session;

pub use session::{RecordingSession, RecordingState};
