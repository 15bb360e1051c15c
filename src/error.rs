//! Error types for gliner-infer.

use std::path::PathBuf;
use thiserror::Error;

/// Result type for gliner-infer operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for gliner-infer operations.
///
/// Shape and alignment errors are contract violations between the caller
/// (or an upstream collaborator) and this crate. None of them are retried.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum Error {
    /// A batch with no examples was handed to the padding engine.
    #[error("Batch cannot be empty")]
    EmptyBatch,

    /// A feature key had no values to pad.
    #[error("No values to pad for key '{key}'")]
    EmptyFeature {
        /// Feature key.
        key: String,
    },

    /// An example is missing a key declared by the batch schema.
    #[error("Example {index} is missing key '{key}'")]
    MissingFeature {
        /// Feature key.
        key: String,
        /// Index of the offending example.
        index: usize,
    },

    /// A tensor rank the padding engine has no rule for.
    #[error("Unsupported amount of dimensions for key '{key}': rank {rank}")]
    UnsupportedRank {
        /// Feature key.
        key: String,
        /// Observed rank.
        rank: usize,
    },

    /// A value whose type disagrees with the kind declared for its key.
    #[error("Unsupported data type for key '{key}': expected {expected}, found {found}")]
    FeatureMismatch {
        /// Feature key.
        key: String,
        /// Declared feature kind.
        expected: &'static str,
        /// Kind of the value actually supplied.
        found: &'static str,
    },

    /// A decoded token index falls outside the offset map of its text.
    #[error(
        "Token index {token_index} out of range for text {text_index} ({num_tokens} tokens)"
    )]
    Alignment {
        /// Index of the text within the batch.
        text_index: usize,
        /// Offending token index.
        token_index: usize,
        /// Number of tokens in the offset map.
        num_tokens: usize,
    },

    /// An expected checkpoint file does not exist.
    #[error("Missing artifact: {}", .0.display())]
    MissingArtifact(PathBuf),

    /// Model retrieval error (downloading from HuggingFace).
    #[error("Retrieval error: {0}")]
    Retrieval(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Parse error.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Tokenizer failure.
    #[error("Tokenizer error: {0}")]
    Tokenizer(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Candle tensor error.
    #[error("Candle error: {0}")]
    Candle(#[from] candle_core::Error),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create an invalid input error.
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Error::InvalidInput(msg.into())
    }

    /// Create a parse error.
    pub fn parse(msg: impl Into<String>) -> Self {
        Error::Parse(msg.into())
    }

    /// Create a retrieval error.
    pub fn retrieval(msg: impl Into<String>) -> Self {
        Error::Retrieval(msg.into())
    }

    /// Create a tokenizer error.
    pub fn tokenizer(msg: impl std::fmt::Display) -> Self {
        Error::Tokenizer(msg.to_string())
    }

    /// Whether this error is a shape or configuration error raised while
    /// building a batch.
    #[must_use]
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            Error::EmptyBatch
                | Error::EmptyFeature { .. }
                | Error::MissingFeature { .. }
                | Error::UnsupportedRank { .. }
                | Error::FeatureMismatch { .. }
        )
    }
}
