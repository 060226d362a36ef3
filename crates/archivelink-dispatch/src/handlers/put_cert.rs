//! putCert handler
//!
//! Stores the certificate sent in the request body for `contRep`.
//!
//! An unsigned registration is parked disabled with the default permissions
//! and never replaces an enabled certificate; an administrator enables it
//! through the trust file. When the protection level covers admin mode the
//! request is signed by the current trusted certificate, and that signer may
//! enable the new certificate and pick its `permissions` (integer or letters).

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

use archivelink_core::{
    access::{permission_letters, PROTECTION_RCUD},
    parse_permissions, Certificate, Command, Operation, TrustedCertificate,
};

use crate::dispatcher::OperationHandler;
use crate::error::{DispatchError, Result};
use crate::provider::CertificateProvider;
use crate::types::{CommandResponse, RequestContext};

pub struct PutCertHandler {
    provider: Arc<dyn CertificateProvider>,
}

impl PutCertHandler {
    pub fn new(provider: Arc<dyn CertificateProvider>) -> Self {
        Self { provider }
    }
}

fn stored_reply(repository: &str, trusted: &TrustedCertificate) -> CommandResponse {
    CommandResponse::text(
        200,
        format!(
            "contRep=\"{}\";fingerprint=\"{}\";permissions=\"{}\";enabled=\"{}\";\r\n",
            repository.replace('"', "'"),
            trusted.fingerprint,
            permission_letters(trusted.permissions),
            trusted.enabled,
        ),
    )
}

#[async_trait]
impl OperationHandler for PutCertHandler {
    fn operation(&self) -> Operation {
        Operation::PutCert
    }

    fn description(&self) -> &str {
        "certificate registration"
    }

    async fn handle(
        &self,
        command: &Command,
        context: &RequestContext,
    ) -> Result<CommandResponse> {
        let repository = command
            .decoded("contRep")?
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| DispatchError::protocol("Parameter contRep is required"))?;

        if context.body.is_empty() {
            return Err(DispatchError::protocol("Certificate body is required"));
        }

        let certificate = Certificate::from_bytes(&context.body)
            .map_err(|e| DispatchError::protocol(format!("Invalid certificate: {}", e)))?;

        let requested = command
            .decoded("permissions")?
            .map(|value| parse_permissions(&value))
            .transpose()
            .map_err(|e| DispatchError::protocol(e.to_string()))?;

        let administrator = context.signer.is_some();
        if requested.is_some() && !administrator {
            return Err(DispatchError::Protocol {
                status: 403,
                message: "permissions can only be set by a signed putCert".into(),
            });
        }

        let trusted = TrustedCertificate::new(
            certificate,
            requested.unwrap_or(PROTECTION_RCUD),
        )?
        .with_enabled(administrator);
        let fingerprint = trusted.fingerprint.clone();

        if let Some(previous) = self.provider.lookup(&repository).await? {
            if previous.fingerprint == fingerprint && !administrator {
                info!(repository = %repository, "Certificate already registered");
                return Ok(stored_reply(&repository, &previous));
            }
            if previous.enabled && !administrator {
                warn!(
                    repository = %repository,
                    previous = %previous.fingerprint,
                    fingerprint = %fingerprint,
                    "SECURITY: Unsigned putCert tried to replace an enabled certificate"
                );
                return Err(DispatchError::Protocol {
                    status: 403,
                    message: format!(
                        "Repository '{}' already has an enabled certificate",
                        repository
                    ),
                });
            }
            if previous.fingerprint != fingerprint {
                warn!(
                    repository = %repository,
                    previous = %previous.fingerprint,
                    fingerprint = %fingerprint,
                    enabled = trusted.enabled,
                    "SECURITY: Replacing trusted certificate"
                );
            }
        }

        self.provider.register(&repository, trusted.clone()).await?;

        info!(
            repository = %repository,
            fingerprint = %fingerprint,
            enabled = trusted.enabled,
            "Certificate stored via putCert"
        );

        Ok(stored_reply(&repository, &trusted))
    }
}
