//! # Error Module
//!
//! This module provides custom error types for the `serial_terminal` application.
//! It uses the `thiserror` crate for ergonomic error handling.

use thiserror::Error;

/// Result type alias for `serial_terminal` operations.
pub type Result<T> = std::result::Result<T, TerminalError>;

/// Failure to bring a connection up.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// No usable port is selected or enumerated.
    #[error("No valid port selected")]
    NoPort,

    /// The driver refused to open the port (missing, busy, permission denied).
    #[error("Failed to open serial port '{port}': {reason}")]
    Open { port: String, reason: String },

    /// A connection or scan is already in progress.
    #[error("Serial port is busy: {0}")]
    Busy(String),
}

impl ConnectionError {
    /// Creates a new port open error.
    #[must_use]
    pub fn open(port: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Open {
            port: port.into(),
            reason: reason.into(),
        }
    }

    /// Creates a new busy error.
    #[must_use]
    pub fn busy(msg: impl Into<String>) -> Self {
        Self::Busy(msg.into())
    }
}

/// Failure to transmit on an open connection.
#[derive(Debug, Error)]
pub enum SendError {
    /// The underlying write or flush failed.
    #[error("Failed to write to serial port: {0}")]
    Write(#[from] std::io::Error),
}

/// Fault that ends the background reader.
#[derive(Debug, Error)]
pub enum ReadFault {
    /// The read itself failed.
    #[error("{0}")]
    Io(#[from] std::io::Error),

    /// The device side closed the stream.
    #[error("port closed by device")]
    Closed,
}

/// Why a single auto-baud candidate was rejected. Never surfaced to the user.
#[derive(Debug, Error)]
pub enum ProbeCandidateFailure {
    #[error("open failed: {0}")]
    Open(#[from] tokio_serial::Error),

    #[error("read failed: {0}")]
    Read(#[from] std::io::Error),
}

/// Preferences file errors.
#[derive(Debug, Error)]
pub enum PreferencesError {
    #[error("Failed to access preferences file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed preferences file: {0}")]
    Format(#[from] serde_json::Error),
}

/// Main error type for the `serial_terminal` application.
#[derive(Debug, Error)]
pub enum TerminalError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Send(#[from] SendError),

    #[error(transparent)]
    Preferences(#[from] PreferencesError),

    /// Console I/O error.
    #[error("Console I/O error: {0}")]
    Console(#[from] std::io::Error),

    /// Invalid command or argument.
    #[error("Invalid command: {0}")]
    InvalidCommand(String),
}

impl TerminalError {
    /// Creates a new invalid command error.
    #[must_use]
    pub fn invalid_command(msg: impl Into<String>) -> Self {
        Self::InvalidCommand(msg.into())
    }
}
