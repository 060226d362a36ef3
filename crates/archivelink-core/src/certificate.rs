//! Certificates and trusted certificates
//!
//! A [`Certificate`] binds a subject to an Ed25519 public key. Its canonical
//! encoding is compact JSON with a fixed field order; the thumbprint is the
//! SHA-256 of that encoding and is the certificate's identity everywhere in
//! the gateway.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::access::permission_letters;
use crate::error::{CoreError, Result};

/// A signer certificate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Certificate {
    /// Subject distinguished name (e.g. "CN=ERP, O=Example")
    pub subject: String,

    /// Issuer distinguished name; equal to the subject when self-issued
    pub issuer: String,

    /// Serial number, lowercase hex
    pub serial: String,

    /// Base64-encoded Ed25519 public key (32 bytes)
    pub public_key: String,
}

impl Certificate {
    /// Canonical encoding; the thumbprint is computed over these bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(CoreError::from)
    }

    /// Parse a canonical encoding, rejecting certificates without a usable key
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cert: Certificate = serde_json::from_slice(bytes)?;
        cert.public_key_bytes()?;
        Ok(cert)
    }

    /// Lowercase hex SHA-256 of the canonical encoding
    pub fn thumbprint(&self) -> Result<String> {
        Ok(hex::encode(Sha256::digest(self.to_bytes()?)))
    }

    /// Decoded public key bytes
    pub fn public_key_bytes(&self) -> Result<[u8; 32]> {
        let bytes = STANDARD.decode(&self.public_key)?;
        bytes
            .try_into()
            .map_err(|_| CoreError::Crypto("Invalid public key length".into()))
    }

    /// Same issuer and serial number
    pub fn same_issuer_serial(&self, other: &Certificate) -> bool {
        self.issuer == other.issuer && self.serial.eq_ignore_ascii_case(&other.serial)
    }
}

/// A certificate a repository trusts, with the permissions it may exercise
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustedCertificate {
    /// The trusted certificate
    pub certificate: Certificate,

    /// Permission bitmask (see [`crate::access`])
    pub permissions: u32,

    /// Disabled certificates never verify
    pub enabled: bool,

    /// Thumbprint of `certificate`
    pub fingerprint: String,
}

impl TrustedCertificate {
    /// Trust a certificate with the given permissions (enabled)
    pub fn new(certificate: Certificate, permissions: u32) -> Result<Self> {
        let fingerprint = certificate.thumbprint()?;
        Ok(Self {
            certificate,
            permissions,
            enabled: true,
            fingerprint,
        })
    }

    /// Same certificate with a different enabled flag
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// True if any of `required` bits are granted
    pub fn permits(&self, required: u32) -> bool {
        self.permissions & required != 0
    }

    /// Permissions as protocol letters, for reports and logs
    pub fn permission_letters(&self) -> String {
        permission_letters(self.permissions)
    }
}
