//! Certificate provider abstraction
//!
//! Supplies the trusted certificate of each repository (contRep) together
//! with the permission bitmask it may exercise. The in-memory store is the
//! default; data is lost on restart.

use async_trait::async_trait;
use archivelink_core::TrustedCertificate;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::RwLock;
use tracing::info;

/// Error type for provider operations
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Storage backend error: {0}")]
    Backend(String),
}

/// Source of trusted certificates, keyed by repository
///
/// Implementations must be thread-safe and support concurrent lookups.
#[async_trait]
pub trait CertificateProvider: Send + Sync + Debug {
    /// Trusted certificate of a repository, if one is configured
    async fn lookup(&self, repository: &str) -> Result<Option<TrustedCertificate>, StorageError>;

    /// Store (or replace) the trusted certificate of a repository
    async fn register(
        &self,
        repository: &str,
        certificate: TrustedCertificate,
    ) -> Result<(), StorageError>;

    /// Remove a repository's certificate; returns whether one existed
    async fn unregister(&self, repository: &str) -> Result<bool, StorageError>;

    /// Configured repositories, sorted
    async fn list(&self) -> Result<Vec<String>, StorageError>;
}

/// In-memory certificate store
#[derive(Debug, Default)]
pub struct MemoryCertificateStore {
    certificates: RwLock<HashMap<String, TrustedCertificate>>,
}

impl MemoryCertificateStore {
    pub fn new() -> Self {
        info!("Using in-memory certificate store (data will not persist across restarts)");
        Self::default()
    }
}

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("certificate store lock poisoned".to_string())
}

#[async_trait]
impl CertificateProvider for MemoryCertificateStore {
    async fn lookup(&self, repository: &str) -> Result<Option<TrustedCertificate>, StorageError> {
        let certificates = self.certificates.read().map_err(poisoned)?;
        Ok(certificates.get(repository).cloned())
    }

    async fn register(
        &self,
        repository: &str,
        certificate: TrustedCertificate,
    ) -> Result<(), StorageError> {
        info!(
            repository = %repository,
            fingerprint = %certificate.fingerprint,
            permissions = %certificate.permission_letters(),
            "Registered trusted certificate"
        );
        let mut certificates = self.certificates.write().map_err(poisoned)?;
        certificates.insert(repository.to_string(), certificate);
        Ok(())
    }

    async fn unregister(&self, repository: &str) -> Result<bool, StorageError> {
        let mut certificates = self.certificates.write().map_err(poisoned)?;
        let removed = certificates.remove(repository).is_some();
        if removed {
            info!(repository = %repository, "Unregistered trusted certificate");
        }
        Ok(removed)
    }

    async fn list(&self) -> Result<Vec<String>, StorageError> {
        let certificates = self.certificates.read().map_err(poisoned)?;
        let mut repositories: Vec<String> = certificates.keys().cloned().collect();
        repositories.sort();
        Ok(repositories)
    }
}
