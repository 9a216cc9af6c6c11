//! Application-level errors

use domain::DomainError;
use thiserror::Error;
use tonic::Status;

use crate::codec::CodecError;

/// Errors that can occur in the application layer
#[derive(Debug, Error)]
pub enum ApplicationError {
    /// Domain-level error
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// Payload could not be wrapped or unwrapped
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Caller supplied a malformed subscription or fault configuration
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Controller stream failed before the session was established
    #[error("Controller disconnected: {0}")]
    ControllerDisconnected(String),
}

impl ApplicationError {
    /// Create an invalid argument error
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }
}

impl From<ApplicationError> for Status {
    fn from(err: ApplicationError) -> Self {
        match err {
            ApplicationError::InvalidArgument(msg) => Self::invalid_argument(msg),
            ApplicationError::Domain(e) => Self::invalid_argument(e.to_string()),
            ApplicationError::Codec(e) => Self::internal(e.to_string()),
            ApplicationError::ControllerDisconnected(msg) => Self::cancelled(msg),
        }
    }
}
