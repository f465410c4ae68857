//! Error handling and custom error types
//!
//! Internal failures are carried by [`Error`]; every variant maps onto the
//! caller-facing [`ErrorKind`] taxonomy through [`Error::kind`].

use crate::models::ErrorKind;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid request: {0}")]
    BadRequest(String),

    #[error("Method not allowed: {0}")]
    MethodNotAllowed(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Upstream request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Upstream provider error: {0}")]
    Upstream(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Classify this error for the caller.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::BadRequest(_) => ErrorKind::BadRequest,
            Error::MethodNotAllowed(_) => ErrorKind::MethodNotAllowed,
            Error::Configuration(_) => ErrorKind::Configuration,
            Error::Timeout(_) | Error::Upstream(_) => ErrorKind::Upstream,
            Error::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
