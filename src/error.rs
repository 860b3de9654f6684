//! Error types for the reel-dl library.

use thiserror::Error;

/// Errors that can occur while orchestrating the extraction engine.
#[derive(Error, Debug)]
pub enum Error {
    /// Raw failure reported by the extraction engine process (could not be
    /// spawned, exited non-zero, or produced unreadable output).
    #[error("{0}")]
    Engine(String),

    /// Invalid configuration value.
    #[error("invalid config: {0}")]
    Config(String),

    /// Metadata lookup failed. Carries the engine's message verbatim.
    #[error("Failed to fetch info: {0}")]
    InfoFetch(String),

    /// Download failed. Carries the engine's message verbatim.
    #[error("Download failed: {0}")]
    Download(String),

    /// The engine reported success but no output file carries the job's
    /// identifier. Adapter/engine contract mismatch, not a user error.
    #[error("File not found after download")]
    OutputMissing,

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A specialized `Result` type for reel-dl operations.
pub type Result<T> = std::result::Result<T, Error>;
