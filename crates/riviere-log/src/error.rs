use std::io;

use riviere_collector::CollectorError;

/// Errors produced by the log buffer.
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    /// The underlying collector rejected the operation, usually because the
    /// buffer was already flushed.
    #[error("collector error: {0}")]
    Collector(#[from] CollectorError),

    /// Writing the output file failed.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The buffer configuration is unusable.
    #[error("invalid log configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias used throughout the log crate.
pub type Result<T> = std::result::Result<T, LogError>;
