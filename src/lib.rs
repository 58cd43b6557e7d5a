//! # Serial Terminal
//!
//! An interactive serial port terminal with heuristic baud rate detection.
//!
//! ## Features
//!
//! - **Single Connection Lifecycle**: one port at a time, modelled as an
//!   explicit `Disconnected` / `Scanning` / `Connected` state machine.
//! - **Async Serial Communication**: non-blocking reads and writes using the
//!   Tokio runtime and `tokio-serial`.
//! - **Auto-Baud Detection**: listens at a fixed list of candidate rates and
//!   picks the first one whose output reads as text.
//! - **Line Endings**: none, `\n`, `\r` or `\r\n` appended to sent lines.
//! - **Preferences**: last port, baud rate, line ending and auto-detect flag
//!   saved to a small JSON file.
//!
//! ## Architecture
//!
//! - [`serial`]: connection lifecycle, baud probe, encoding and the display sink
//! - [`console`]: user actions, scrollback and the command language
//! - [`settings`]: current selection and persisted preferences
//! - [`error`]: custom error types for the application

pub mod console;
pub mod error;
pub mod serial;
pub mod settings;

/// Re-exports for convenience
pub mod prelude {
    pub use crate::console::{Command, Terminal, TerminalEvent};
    pub use crate::error::*;
    pub use crate::serial::{Connection, ConnectionState, LineEnding, NativeBackend};
    pub use crate::settings::Preferences;
}
