//! Error taxonomy for the NANG index.
//!
//! Every fallible operation returns a [`NangError`] whose [`ErrorKind`] tells
//! the dispatch layer what went wrong without parsing the message. Nothing is
//! retried internally: all operations are local and deterministic.

use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, NangError>;

/// Errors produced by index construction, search and (de)serialization
#[derive(Error, Debug)]
pub enum NangError {
    /// Read, query or serialize before the index was built or loaded
    #[error("index not initialized: build or load it first")]
    UninitializedIndex,

    /// The index type does not support the requested operation
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Missing or invalid build/search/serialize parameter
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Corrupt, truncated or incompatible blob or slice set
    #[error("deserialization error: {0}")]
    Deserialization(String),

    /// Zero rows or zero dimensions handed to the builder
    #[error("degenerate input: {rows} rows of dimension {dim}")]
    DegenerateInput {
        /// Number of rows supplied
        rows: usize,
        /// Vector dimension supplied
        dim: usize,
    },

    /// Vector data does not match the expected dimension
    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch {
        /// Dimension the index or data layout requires
        expected: usize,
        /// Dimension (or flat length) actually supplied
        actual: usize,
    },

    /// Filesystem failure while persisting or reading a binary set
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Fieldless classification of [`NangError`], stable across releases
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// See [`NangError::UninitializedIndex`]
    UninitializedIndex,
    /// See [`NangError::UnsupportedOperation`]
    UnsupportedOperation,
    /// See [`NangError::Configuration`]
    Configuration,
    /// See [`NangError::Deserialization`]
    Deserialization,
    /// See [`NangError::DegenerateInput`]
    DegenerateInput,
    /// See [`NangError::DimensionMismatch`]
    DimensionMismatch,
    /// See [`NangError::Io`]
    Io,
}

impl NangError {
    /// Classify this error
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UninitializedIndex => ErrorKind::UninitializedIndex,
            Self::UnsupportedOperation(_) => ErrorKind::UnsupportedOperation,
            Self::Configuration(_) => ErrorKind::Configuration,
            Self::Deserialization(_) => ErrorKind::Deserialization,
            Self::DegenerateInput { .. } => ErrorKind::DegenerateInput,
            Self::DimensionMismatch { .. } => ErrorKind::DimensionMismatch,
            Self::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    pub(crate) fn corrupt(msg: impl Into<String>) -> Self {
        Self::Deserialization(msg.into())
    }
}
