//! Error types for the Z80 shell machine.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while setting up or running a machine session.
#[derive(Error, Debug)]
pub enum EmuError {
    #[error("Filesystem image too large (limit {limit} bytes)")]
    ImageTooLarge { limit: usize },

    #[error("Kernel image too large: {0} bytes")]
    KernelTooLarge(usize),

    #[error("Block device capacity {requested} exceeds maximum of {max} bytes")]
    CapacityTooLarge { requested: usize, max: usize },

    #[error("Offset {offset} out of bounds (capacity {capacity})")]
    OutOfBounds { offset: usize, capacity: usize },

    #[error("Can't setup terminal: {0}")]
    TerminalSetup(String),

    #[error("Packer error: {0}")]
    Packer(String),

    #[error("Invalid CFS image at offset {offset}: {reason}")]
    CfsFormat { offset: usize, reason: String },

    #[error("File too big: {} ({size} bytes)", .path.display())]
    FileTooBig { path: PathBuf, size: u64 },

    #[error("Filename too long: {0}")]
    NameTooLong(String),

    #[error("Invalid file pattern: {0}")]
    Pattern(#[from] glob::PatternError),

    #[error("Unsupported file type: {}", .0.display())]
    UnsupportedFileType(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for machine operations.
pub type EmuResult<T> = Result<T, EmuError>;
