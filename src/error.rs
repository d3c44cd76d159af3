//! Error handling and custom error types
//!
//! Provides unified error handling across the application using thiserror.

use crate::settings::ValidationError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid settings: {}", join_errors(.0))]
    InvalidSettings(Vec<ValidationError>),

    #[error("Upload already in progress for media record {0}")]
    Busy(u64),

    #[error("Invariant violation: {0}")]
    Invariant(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

pub type Result<T> = std::result::Result<T, Error>;
