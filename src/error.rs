use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EvoError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Out of memory: {0}")]
    OutOfMemory(String),

    #[error("Genome is empty")]
    GenomeEmpty,

    #[error("Genome too large: requested {requested} bytes, capacity {capacity}")]
    GenomeTooLarge { requested: usize, capacity: usize },

    #[error("Invalid genome: {0}")]
    GenomeInvalid(String),

    #[error("Range {offset}..{end} out of bounds for length {len}")]
    OutOfBounds { offset: usize, end: usize, len: usize },

    #[error("Population is empty")]
    PopulationEmpty,

    #[error("Population is full (capacity {0})")]
    PopulationFull(usize),

    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },

    #[error("Population statistics are stale; call update_stats first")]
    StaleStats,

    #[error("Unknown context: {0}")]
    UnknownContext(String),

    #[error("Unknown parameter: {0}")]
    UnknownParameter(String),

    #[error("Configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Configuration parse error: {0}")]
    ConfigParse(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("File not found: {}", .0.display())]
    FileNotFound(PathBuf),

    #[error("Failed to read {}: {reason}", .path.display())]
    FileRead { path: PathBuf, reason: String },

    #[error("Failed to write {}: {reason}", .path.display())]
    FileWrite { path: PathBuf, reason: String },

    #[error("Corrupt data: {0}")]
    Corrupt(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serde error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Encode(String),
}

impl From<bincode::error::EncodeError> for EvoError {
    fn from(err: bincode::error::EncodeError) -> Self {
        EvoError::Encode(err.to_string())
    }
}

impl From<bincode::error::DecodeError> for EvoError {
    fn from(err: bincode::error::DecodeError) -> Self {
        EvoError::Corrupt(err.to_string())
    }
}

impl EvoError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        EvoError::InvalidArgument(msg.into())
    }
}

pub type Result<T> = std::result::Result<T, EvoError>;
