//! Error types for the processor module of the Feed Engine Pipeline.
//! A processor error means the event itself is malformed, so it is never
//! retried.
use feed_engine_shared::types::{CategoryError, ParseEnumError};
use thiserror::Error;

/// Represents errors that can occur while classifying an event.
#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("Missing field: {0}")]
    MissingField(String),
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: String, reason: String },
    #[error("Category error: {0}")]
    Category(#[from] CategoryError),
    #[error("Invalid value: {0}")]
    InvalidValue(#[from] ParseEnumError),
}

impl ProcessorError {
    pub fn missing(field: impl Into<String>) -> Self {
        Self::MissingField(field.into())
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidField {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
