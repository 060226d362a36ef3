//! Error types for the ArchiveLink core

use thiserror::Error;

/// Result type alias using CoreError
pub type Result<T> = std::result::Result<T, CoreError>;

/// Why a signature verification attempt failed
///
/// Callers outside the HTTP boundary should treat every cause as the same
/// failure; the cause only selects the status code and the log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCause {
    /// The signed payload could not be decoded or its signature is wrong
    MalformedSignature,
    /// No certificate in the payload matches the trusted certificate
    NoMatchingCertificate,
    /// The matched certificate lacks the required permission
    PermissionDenied,
    /// The trusted certificate for the repository is disabled
    CertificateDisabled,
    /// The signed URL carries an expiration in the past
    Expired,
    /// A signature is required but the request carries none
    SignatureMissing,
}

impl std::fmt::Display for FailureCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureCause::MalformedSignature => write!(f, "malformed signature"),
            FailureCause::NoMatchingCertificate => write!(f, "no matching certificate"),
            FailureCause::PermissionDenied => write!(f, "permission denied"),
            FailureCause::CertificateDisabled => write!(f, "certificate disabled"),
            FailureCause::Expired => write!(f, "signature expired"),
            FailureCause::SignatureMissing => write!(f, "signature required"),
        }
    }
}

/// Errors that can occur while resolving or authorizing a command
#[derive(Error, Debug)]
pub enum CoreError {
    /// Malformed request, unknown command or HTTP method mismatch
    #[error("{message}")]
    Protocol { status: u16, message: String },

    /// Signature verification failed
    #[error("Verification failed: {cause}: {message}")]
    VerificationFailed { cause: FailureCause, message: String },

    /// Verification was attempted before the signed data was set
    #[error("Verifier not configured: {0}")]
    NotConfigured(String),

    /// A caller passed an unusable argument
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Percent or base64 decoding failed
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// COSE encoding/decoding error
    #[error("COSE error: {0}")]
    Cose(String),

    /// Cryptographic error
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl CoreError {
    /// Protocol error with the default 400 status
    pub fn protocol(message: impl Into<String>) -> Self {
        CoreError::Protocol {
            status: 400,
            message: message.into(),
        }
    }

    /// Verification failure with a cause and a human-readable detail
    pub fn verification(cause: FailureCause, message: impl Into<String>) -> Self {
        CoreError::VerificationFailed {
            cause,
            message: message.into(),
        }
    }

    /// The failure cause, when this is a verification failure
    pub fn failure_cause(&self) -> Option<FailureCause> {
        match self {
            CoreError::VerificationFailed { cause, .. } => Some(*cause),
            _ => None,
        }
    }
}

impl From<ed25519_dalek::SignatureError> for CoreError {
    fn from(err: ed25519_dalek::SignatureError) -> Self {
        CoreError::Crypto(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::Serialization(err.to_string())
    }
}

impl From<coset::CoseError> for CoreError {
    fn from(err: coset::CoseError) -> Self {
        CoreError::Cose(format!("{:?}", err))
    }
}

impl From<base64::DecodeError> for CoreError {
    fn from(err: base64::DecodeError) -> Self {
        CoreError::Encoding(format!("Invalid base64 encoding: {}", err))
    }
}
