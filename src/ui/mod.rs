//! Terminal UI components.

pub mod error;
pub mod session;

pub use error::ErrorScreen;
pub use session::{MemoRow, MemoTui, SessionCommand, SessionView};
