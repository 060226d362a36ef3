//! Error types for the request dispatcher

use archivelink_core::{CoreError, FailureCause};
use thiserror::Error;

use crate::provider::StorageError;

/// Result type for dispatcher operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Message returned to clients for every unexpected failure
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Errors that can occur while dispatching a command
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Malformed request, unknown command or unsupported method
    #[error("{message}")]
    Protocol { status: u16, message: String },

    /// Signed URL did not verify
    #[error("Verification failed: {cause}: {message}")]
    Verification { cause: FailureCause, message: String },

    /// Certificate provider failure
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Anything else; never shown to the client
    #[error("Internal error: {0}")]
    Internal(String),
}

impl DispatchError {
    /// Protocol error with the default 400 status
    pub fn protocol(message: impl Into<String>) -> Self {
        DispatchError::Protocol {
            status: 400,
            message: message.into(),
        }
    }

    pub fn verification(cause: FailureCause, message: impl Into<String>) -> Self {
        DispatchError::Verification {
            cause,
            message: message.into(),
        }
    }

    /// HTTP status this error maps to
    pub fn status(&self) -> u16 {
        match self {
            DispatchError::Protocol { status, .. } => *status,
            DispatchError::Verification {
                cause: FailureCause::PermissionDenied,
                ..
            } => 403,
            DispatchError::Verification { .. } => 401,
            DispatchError::Storage(_) | DispatchError::Internal(_) => 500,
        }
    }

    /// Message safe to return to the client
    pub fn client_message(&self) -> String {
        match self {
            DispatchError::Protocol { message, .. } => message.clone(),
            DispatchError::Verification { cause, .. } => {
                format!("Signature verification failed: {}", cause)
            }
            DispatchError::Storage(_) | DispatchError::Internal(_) => {
                INTERNAL_ERROR_MESSAGE.to_string()
            }
        }
    }
}

impl From<CoreError> for DispatchError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Protocol { status, message } => DispatchError::Protocol { status, message },
            CoreError::VerificationFailed { cause, message } => {
                DispatchError::Verification { cause, message }
            }
            CoreError::Encoding(msg) => {
                DispatchError::protocol(format!("Invalid parameter encoding: {}", msg))
            }
            CoreError::Cose(msg) | CoreError::Crypto(msg) => {
                DispatchError::verification(FailureCause::MalformedSignature, msg)
            }
            other => DispatchError::Internal(other.to_string()),
        }
    }
}
