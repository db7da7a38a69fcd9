//! Error types for table I/O operations

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TableError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot interpret '{string}' as a {direction} extended filename: {reason}")]
    Classification {
        string: String,
        direction: &'static str,
        reason: String,
    },

    #[error("Failed to open '{string}': {reason}")]
    Open { string: String, reason: String },

    #[error("Format error: {0}")]
    Format(String),

    #[error("Type mismatch: expected {expected}, found {found}")]
    TypeMismatch { expected: String, found: String },

    #[error("Ordering violation: {0}")]
    OrderingViolation(String),

    #[error("Command '{command}' exited with status {status}")]
    ProcessExit { command: String, status: i32 },

    #[error("Invalid specifier '{string}': {reason}")]
    Specifier { string: String, reason: String },

    #[error("No value for key '{0}' in table")]
    MissingKey(String),
}

pub type Result<T> = std::result::Result<T, TableError>;
