//! Error types for Marginalia.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarginaliaError {
    /// The completion capability failed, or returned something that is not
    /// the JSON shape the caller asked for.
    #[error("Generation error: {0}")]
    Generation(String),

    #[error("Memory error: {0}")]
    Memory(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Pipeline error: {0}")]
    Pipeline(String),

    #[error("Generation already running for document {0}")]
    AlreadyRunning(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, MarginaliaError>;
