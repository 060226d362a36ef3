//! Signed URL authorization
//!
//! Connects the access policy, the certificate provider and the verifier:
//! decides whether a command needs a signature, and if so checks it with a
//! fresh [`VerificationSession`].

use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::{DateTime, NaiveDateTime, Utc};
use std::sync::Arc;
use tracing::{debug, warn};

use archivelink_core::{
    command::SIGNATURE_PARAM, needs_signature, Certificate, Command, FailureCause,
    VerificationSession,
};

use crate::error::{DispatchError, Result};
use crate::provider::CertificateProvider;

/// Parameter naming the access modes a signed URL grants
pub const ACCESS_MODE_PARAM: &str = "accessMode";

/// Parameter carrying the signature expiry
pub const EXPIRATION_PARAM: &str = "expiration";

const EXPIRATION_FORMAT: &str = "%Y%m%d%H%M%S";

/// Result of a successful authorization
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Authorization {
    /// The protection level does not cover this command
    NotRequired,
    /// A signature was required and verified
    Verified { signer: Option<Certificate> },
}

impl Authorization {
    pub fn signer(&self) -> Option<&Certificate> {
        match self {
            Authorization::NotRequired => None,
            Authorization::Verified { signer } => signer.as_ref(),
        }
    }
}

/// Checks signed URLs against the repository's trusted certificate
#[derive(Debug, Clone)]
pub struct Authorizer {
    provider: Arc<dyn CertificateProvider>,
    protection_level: u32,
    allow_certificate_fallback: bool,
}

impl Authorizer {
    pub fn new(
        provider: Arc<dyn CertificateProvider>,
        protection_level: u32,
        allow_certificate_fallback: bool,
    ) -> Self {
        Self {
            provider,
            protection_level,
            allow_certificate_fallback,
        }
    }

    pub fn protection_level(&self) -> u32 {
        self.protection_level
    }

    /// Authorize a command as of now
    pub async fn authorize(&self, command: &Command) -> Result<Authorization> {
        self.authorize_at(command, Utc::now()).await
    }

    /// Authorize a command as of `now`
    pub async fn authorize_at(
        &self,
        command: &Command,
        now: DateTime<Utc>,
    ) -> Result<Authorization> {
        let mode = command.access_mode();
        if !needs_signature(mode, self.protection_level) {
            return Ok(Authorization::NotRequired);
        }

        let repository = command
            .decoded("contRep")?
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                DispatchError::verification(
                    FailureCause::SignatureMissing,
                    "signed command without contRep",
                )
            })?;
        let sec_key = command.decoded(SIGNATURE_PARAM)?.ok_or_else(|| {
            DispatchError::verification(
                FailureCause::SignatureMissing,
                format!("command '{}' requires a signed URL", command.operation()),
            )
        })?;

        check_signed_prefix(command)?;
        check_expiration(command, now)?;
        check_granted_mode(command)?;

        let signed_data = STANDARD.decode(sec_key.trim()).map_err(|e| {
            DispatchError::verification(
                FailureCause::MalformedSignature,
                format!("secKey is not base64: {}", e),
            )
        })?;
        if signed_data.is_empty() {
            return Err(DispatchError::verification(
                FailureCause::SignatureMissing,
                "empty secKey",
            ));
        }

        let Some(trusted) = self.provider.lookup(&repository).await? else {
            warn!(
                repository = %repository,
                operation = %command.operation(),
                "SECURITY: Signed command for repository without trusted certificate"
            );
            return Err(DispatchError::verification(
                FailureCause::NoMatchingCertificate,
                format!("no trusted certificate for repository '{}'", repository),
            ));
        };

        let mut session =
            VerificationSession::new().with_certificate_fallback(self.allow_certificate_fallback);
        session.set_certificate(Some(trusted));
        session.set_signed_data(&signed_data)?;
        session.set_required_permission(mode.permission_bit());
        session.verify_against(&command.signed_message()?)?;

        debug!(
            repository = %repository,
            operation = %command.operation(),
            "Signed URL authorized"
        );

        Ok(Authorization::Verified {
            signer: session.certificate(-1).cloned(),
        })
    }
}

/// Reject parameters appended after `secKey`
///
/// They are outside the signed message, yet the last occurrence of a name
/// wins, so they would override signed values.
fn check_signed_prefix(command: &Command) -> Result<()> {
    let unsigned = command.unsigned_parameters();
    if unsigned.is_empty() {
        return Ok(());
    }

    warn!(
        operation = %command.operation(),
        parameters = ?unsigned,
        "SECURITY: Parameters after secKey rejected"
    );
    Err(DispatchError::verification(
        FailureCause::MalformedSignature,
        format!("parameters after secKey are not signed: {}", unsigned.join(", ")),
    ))
}

/// Reject signatures whose `expiration` lies in the past
fn check_expiration(command: &Command, now: DateTime<Utc>) -> Result<()> {
    let Some(raw) = command.decoded(EXPIRATION_PARAM)? else {
        return Ok(());
    };

    let expires = NaiveDateTime::parse_from_str(raw.trim(), EXPIRATION_FORMAT)
        .map_err(|_| DispatchError::protocol(format!("Invalid expiration '{}'", raw)))?
        .and_utc();

    if expires < now {
        return Err(DispatchError::verification(
            FailureCause::Expired,
            format!("signature expired at {}", expires.format("%Y-%m-%d %H:%M:%S UTC")),
        ));
    }
    Ok(())
}

/// The signed `accessMode` must name the mode of the command being run
fn check_granted_mode(command: &Command) -> Result<()> {
    let Some(code) = command.access_mode().code() else {
        return Ok(());
    };

    let granted = command.decoded(ACCESS_MODE_PARAM)?.unwrap_or_default();
    if granted.chars().any(|c| c.eq_ignore_ascii_case(&code)) {
        return Ok(());
    }

    Err(DispatchError::verification(
        FailureCause::PermissionDenied,
        format!(
            "signed access mode '{}' does not grant '{}' for command '{}'",
            granted,
            code,
            command.operation()
        ),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::MemoryCertificateStore;
    use archivelink_core::{
        access::{PERMISSION_READ, PROTECTION_RCUD},
        resolve, HttpMethod, KeyPair, TrustedCertificate,
    };
    use chrono::TimeZone;

    fn signed(kp: &KeyPair, method: HttpMethod, query: &str) -> Command {
        let message = resolve(method, query, "UTF-8").unwrap().signed_message().unwrap();
        let full = format!("{}&secKey={}", query, kp.sec_key(&message).unwrap());
        resolve(method, &full, "UTF-8").unwrap()
    }

    async fn authorizer_trusting(kp: &KeyPair, permissions: u32) -> Authorizer {
        let store = MemoryCertificateStore::new();
        let trusted = TrustedCertificate::new(kp.certificate().clone(), permissions).unwrap();
        store.register("K1", trusted).await.unwrap();
        Authorizer::new(Arc::new(store), PROTECTION_RCUD, true)
    }

    fn noon_2024() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_unprotected_mode_skips_verification() {
        let authorizer = Authorizer::new(Arc::new(MemoryCertificateStore::new()), 0, true);
        let command = resolve(HttpMethod::Get, "get&contRep=K1&docId=1", "UTF-8").unwrap();
        assert_eq!(
            authorizer.authorize(&command).await.unwrap(),
            Authorization::NotRequired
        );
    }

    #[tokio::test]
    async fn test_missing_signature() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command =
            resolve(HttpMethod::Get, "get&contRep=K1&docId=1&accessMode=r", "UTF-8").unwrap();

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert_eq!(err.status(), 401);
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::SignatureMissing, .. }
        ));
    }

    #[tokio::test]
    async fn test_valid_signature() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PERMISSION_READ).await;
        let command = signed(
            &kp,
            HttpMethod::Get,
            "get&contRep=K1&docId=1&accessMode=r&authId=ERP&expiration=20240601130000",
        );

        let authorization = authorizer.authorize_at(&command, noon_2024()).await.unwrap();
        assert_eq!(authorization.signer(), Some(kp.certificate()));
    }

    #[tokio::test]
    async fn test_expired_signature() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command = signed(
            &kp,
            HttpMethod::Get,
            "get&contRep=K1&docId=1&accessMode=r&expiration=20240601110000",
        );

        let err = authorizer.authorize_at(&command, noon_2024()).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::Expired, .. }
        ));
        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn test_unparseable_expiration() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command = signed(
            &kp,
            HttpMethod::Get,
            "get&contRep=K1&docId=1&accessMode=r&expiration=tomorrow",
        );

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert!(matches!(err, DispatchError::Protocol { status: 400, .. }));
    }

    #[tokio::test]
    async fn test_read_signature_cannot_be_replayed_for_delete() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;

        // Same parameter values, so the same signed message
        let read = signed(&kp, HttpMethod::Get, "get&contRep=K1&docId=1&accessMode=r");
        let replayed = format!("delete&{}", read.canonical_query(&["get"]));
        let command = resolve(HttpMethod::Delete, &replayed, "UTF-8").unwrap();

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn test_insufficient_certificate_permission() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PERMISSION_READ).await;
        let command = signed(&kp, HttpMethod::Delete, "delete&contRep=K1&docId=1&accessMode=d");

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::PermissionDenied, .. }
        ));
        assert_eq!(err.status(), 403);
    }

    #[tokio::test]
    async fn test_disabled_certificate() {
        let kp = KeyPair::generate("CN=ERP");
        let store = MemoryCertificateStore::new();
        let trusted = TrustedCertificate::new(kp.certificate().clone(), PROTECTION_RCUD)
            .unwrap()
            .with_enabled(false);
        store.register("K1", trusted).await.unwrap();
        let authorizer = Authorizer::new(Arc::new(store), PROTECTION_RCUD, true);

        let command = signed(&kp, HttpMethod::Get, "get&contRep=K1&docId=1&accessMode=r");
        let err = authorizer.authorize(&command).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::CertificateDisabled, .. }
        ));
    }

    #[tokio::test]
    async fn test_garbage_sec_key() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command = resolve(
            HttpMethod::Get,
            "get&contRep=K1&docId=1&accessMode=r&secKey=%%%not-base64",
            "UTF-8",
        )
        .unwrap();

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert_eq!(err.status(), 401);
    }

    fn appended(command: &Command, suffix: &str) -> Command {
        let query = format!("{}&{}", command.query(), suffix);
        resolve(command.method(), &query, "UTF-8").unwrap()
    }

    fn assert_malformed(err: DispatchError) {
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::MalformedSignature, .. }
        ));
        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn test_appended_expiration_cannot_revive_signature() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command = signed(
            &kp,
            HttpMethod::Get,
            "get&contRep=K1&docId=1&accessMode=r&expiration=20240601110000",
        );

        let revived = appended(&command, "expiration=29991231235959");
        let err = authorizer.authorize_at(&revived, noon_2024()).await.unwrap_err();
        assert_malformed(err);
    }

    #[tokio::test]
    async fn test_appended_access_mode_cannot_grant_delete() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let read = signed(&kp, HttpMethod::Get, "get&contRep=K1&docId=1&accessMode=r");

        let replayed = format!("delete&{}&accessMode=d", read.canonical_query(&["get"]));
        let command = resolve(HttpMethod::Delete, &replayed, "UTF-8").unwrap();
        assert_eq!(command.param("accessMode"), Some("d"));

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert_malformed(err);
    }

    #[tokio::test]
    async fn test_appended_document_id_rejected() {
        let kp = KeyPair::generate("CN=ERP");
        let authorizer = authorizer_trusting(&kp, PROTECTION_RCUD).await;
        let command = signed(&kp, HttpMethod::Get, "get&contRep=K1&docId=1&accessMode=r");
        assert!(authorizer.authorize(&command).await.is_ok());

        let swapped = appended(&command, "docId=999");
        let err = authorizer.authorize(&swapped).await.unwrap_err();
        assert_malformed(err);
    }

    #[tokio::test]
    async fn test_repository_without_certificate_rejects_any_signer() {
        let store = Arc::new(MemoryCertificateStore::new());
        let authorizer = Authorizer::new(store, PROTECTION_RCUD, false);
        let kp = KeyPair::generate("CN=Anyone");
        let command = signed(&kp, HttpMethod::Delete, "delete&contRep=K1&docId=1&accessMode=d");

        let err = authorizer.authorize(&command).await.unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::NoMatchingCertificate, .. }
        ));
        assert_eq!(err.status(), 401);
    }

    #[tokio::test]
    async fn test_encoded_repository_uses_decoded_name() {
        let owner = KeyPair::generate("CN=ERP");
        let intruder = KeyPair::generate("CN=Intruder");
        let authorizer = authorizer_trusting(&owner, PROTECTION_RCUD).await;

        let query = "delete&contRep=K%31&docId=1&accessMode=d";
        let err = authorizer
            .authorize(&signed(&intruder, HttpMethod::Delete, query))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DispatchError::Verification { cause: FailureCause::NoMatchingCertificate, .. }
        ));

        let authorization = authorizer
            .authorize(&signed(&owner, HttpMethod::Delete, query))
            .await
            .unwrap();
        assert_eq!(authorization.signer(), Some(owner.certificate()));
    }
}
