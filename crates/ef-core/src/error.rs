//! Error types shared across the engine

use thiserror::Error;

/// Coarse error taxonomy exposed at the API boundary.
///
/// Hot-path audio methods never return these; construction and
/// resource-loading paths do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Generic runtime error (missing resource, invalid state).
    Failure,
    /// Allocation failed.
    OutOfMemory,
    /// Construction preconditions unmet.
    Initialization,
}

/// Core error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// Invalid audio settings at construction
    #[error("invalid audio settings: {0}")]
    InvalidAudioSettings(String),

    /// Buffer shape mismatch
    #[error("buffer shape mismatch: expected {expected} channels, got {got}")]
    ChannelCountMismatch { expected: usize, got: usize },

    /// Buffer length mismatch
    #[error("buffer length mismatch: expected {expected} samples, got {got}")]
    FrameSizeMismatch { expected: usize, got: usize },

    /// Serialized payload is malformed
    #[error("malformed serialized payload: {0}")]
    MalformedPayload(String),

    /// Serialized payload has a newer major version than this reader
    #[error("unsupported payload version: {got} (max supported: {supported})")]
    UnsupportedVersion { got: u32, supported: u32 },

    /// Serialized payload failed its checksum
    #[error("payload checksum mismatch")]
    ChecksumMismatch,

    /// Allocation failed
    #[error("allocation failed while reserving {0} bytes")]
    OutOfMemory(usize),
}

impl CoreError {
    /// Map onto the coarse API taxonomy.
    pub fn status(&self) -> Status {
        match self {
            CoreError::InvalidAudioSettings(_) => Status::Initialization,
            CoreError::OutOfMemory(_) => Status::OutOfMemory,
            _ => Status::Failure,
        }
    }
}

/// Result type for core operations
pub type CoreResult<T> = Result<T, CoreError>;
