//! Custom error types for the decoder.
//!
//! This module provides a centralized error handling system using the `thiserror` crate
//! to define structured, typed errors with clear messages and proper error conversion.
//!
//! Two classes of failure are fatal by contract: configuration errors raised while
//! the decoder is being set up, and consistency errors that reveal a malformed
//! search network. An exhausted search space is *not* an error; the engine reports
//! it as an empty result.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Primary error type for the decoder, covering all possible error cases.
#[derive(Debug, Error)]
pub enum DecoderError {
    /// Invalid option values or references to unknown models.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A lexicon or grammar transducer could not be loaded.
    #[error("Failed to load network from {path:?}: {reason}")]
    NetworkLoad { path: PathBuf, reason: String },

    /// Malformed line in a text model file.
    #[error("Parse error in {path:?} at line {line}: {message}")]
    Parse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    /// Word-end events and output labels disagree along a traceback.
    #[error("Search network consistency error: {0}")]
    Consistency(String),

    /// An operation was called in the wrong engine state.
    #[error("Invalid decoder state: {0}")]
    InvalidState(String),

    /// Errors from the underlying IO system.
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl DecoderError {
    /// Whether the error must halt the run rather than just the current segment.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DecoderError::Configuration(_)
                | DecoderError::NetworkLoad { .. }
                | DecoderError::Parse { .. }
                | DecoderError::Consistency(_)
        )
    }
}

/// Convenience type alias for Results with DecoderError.
pub type Result<T> = std::result::Result<T, DecoderError>;
