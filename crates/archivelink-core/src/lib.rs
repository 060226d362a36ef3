//! # ArchiveLink Core
//!
//! Protocol model and trust primitives for an ArchiveLink content server
//! gateway.
//!
//! ## Key Concepts
//!
//! - **Operation**: one ArchiveLink command (`get`, `create`, `putCert`, ...)
//!   with a fixed HTTP method and access mode
//! - **Command**: an operation resolved from a raw query string, with its
//!   parameters
//! - **Access policy**: decides from the access mode and the server's
//!   protection level whether a command must carry a signed URL
//! - **Verification session**: checks one signed URL against the trusted
//!   certificate of a repository and the permission the command needs
//!
//! Nothing in this crate performs I/O.

pub mod access;
pub mod certificate;
pub mod command;
pub mod crypto;
pub mod error;
pub mod operation;
pub mod verifier;

pub use access::{needs_signature, parse_permissions};
pub use certificate::{Certificate, TrustedCertificate};
pub use command::{resolve, Command};
pub use crypto::{DetachedSignature, KeyPair};
pub use error::{CoreError, FailureCause, Result};
pub use operation::{AccessMode, HttpMethod, Operation};
pub use verifier::{SessionState, VerificationSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Get the library version
pub fn version() -> &'static str {
    VERSION
}
