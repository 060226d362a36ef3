//! Signature verification for signed URLs
//!
//! A [`VerificationSession`] holds the state of exactly one verification
//! attempt: the trusted certificate for the repository, the signed data from
//! the URL, the permission the command needs, and the certificates pulled out
//! of the signed data. Sessions are never reused; create one per request.
//!
//! Verification order:
//! 1. Decode the signed data as a detached signature and check it over the
//!    original message with the signer certificate's key.
//! 2. If that fails, and the fallback is allowed, treat the signed data as a
//!    raw certificate that must have the trusted certificate's thumbprint.
//! 3. With a trusted certificate, the signer must be that certificate
//!    (same thumbprint, or same issuer and serial with the same key).
//! 4. With a required permission, the trusted certificate must grant it.

use tracing::{debug, warn};

use crate::certificate::{Certificate, TrustedCertificate};
use crate::crypto::DetachedSignature;
use crate::error::{CoreError, FailureCause, Result};

/// Lifecycle of a verification session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unconfigured,
    Configured,
    Verified,
    Failed,
}

/// State of one signature verification attempt
#[derive(Debug)]
pub struct VerificationSession {
    trusted: Option<TrustedCertificate>,
    signed_data: Option<Vec<u8>>,
    required_permission: Option<u32>,
    certificates: Vec<Certificate>,
    signer: Option<usize>,
    matched: Option<usize>,
    allow_certificate_fallback: bool,
    state: SessionState,
}

impl Default for VerificationSession {
    fn default() -> Self {
        Self::new()
    }
}

impl VerificationSession {
    pub fn new() -> Self {
        Self {
            trusted: None,
            signed_data: None,
            required_permission: None,
            certificates: Vec::new(),
            signer: None,
            matched: None,
            allow_certificate_fallback: true,
            state: SessionState::Unconfigured,
        }
    }

    /// Enable or disable the raw-certificate fallback (enabled by default)
    pub fn with_certificate_fallback(mut self, allow: bool) -> Self {
        self.allow_certificate_fallback = allow;
        self
    }

    /// Set the trusted certificate, or withhold it with `None`
    ///
    /// Without a trusted certificate the signature must still be
    /// structurally valid, but no certificate match or permission check
    /// takes place.
    pub fn set_certificate(&mut self, certificate: Option<TrustedCertificate>) {
        self.trusted = certificate;
        self.mark_configured();
    }

    /// Set the signed data taken from the request
    pub fn set_signed_data(&mut self, data: &[u8]) -> Result<()> {
        if data.is_empty() {
            return Err(CoreError::InvalidArgument("signed data must not be empty".into()));
        }
        self.signed_data = Some(data.to_vec());
        self.mark_configured();
        Ok(())
    }

    /// Set the permission bits the command requires (0 clears the requirement)
    pub fn set_required_permission(&mut self, permission: u32) {
        self.required_permission = (permission != 0).then_some(permission);
        self.mark_configured();
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// The trusted certificate this session checks against
    pub fn trusted_certificate(&self) -> Option<&TrustedCertificate> {
        self.trusted.as_ref()
    }

    /// Certificate held by the session
    ///
    /// A negative index returns the matched certificate, else the signer,
    /// else the first certificate held. A non-negative index addresses the
    /// extracted collection directly. Returns `None` when nothing is held
    /// or the index is out of range.
    pub fn certificate(&self, index: isize) -> Option<&Certificate> {
        if index < 0 {
            let default = self.matched.or(self.signer).unwrap_or(0);
            return self.certificates.get(default);
        }
        self.certificates.get(index as usize)
    }

    /// Number of certificates currently held
    pub fn certificate_count(&self) -> usize {
        self.certificates.len()
    }

    /// Verify the signed data against the original message
    pub fn verify_against(&mut self, original: &[u8]) -> Result<()> {
        if matches!(self.state, SessionState::Verified | SessionState::Failed) {
            return Err(CoreError::NotConfigured(
                "verification session already used; create a new session".into(),
            ));
        }

        let signed = self
            .signed_data
            .clone()
            .ok_or_else(|| CoreError::NotConfigured("signed data was never set".into()))?;

        match self.attempt(&signed, original) {
            Ok(()) => {
                self.state = SessionState::Verified;
                debug!(
                    certificates = self.certificates.len(),
                    trusted = self.trusted.is_some(),
                    "Signature verified"
                );
                Ok(())
            }
            Err(err) => {
                self.state = SessionState::Failed;
                warn!(error = %err, "SECURITY: Signature verification failed");
                Err(err)
            }
        }
    }

    fn attempt(&mut self, signed: &[u8], original: &[u8]) -> Result<()> {
        if let Some(trusted) = &self.trusted {
            if !trusted.enabled {
                return Err(CoreError::verification(
                    FailureCause::CertificateDisabled,
                    format!("trusted certificate {} is disabled", trusted.fingerprint),
                ));
            }
        }

        if let Err(primary) = self.verify_detached(signed, original) {
            debug!(error = %primary, "Detached signature rejected, trying raw certificate");
            self.verify_raw_certificate(signed, primary)?;
        }

        self.match_trusted()?;
        self.enforce_permission()
    }

    fn verify_detached(&mut self, signed: &[u8], original: &[u8]) -> Result<()> {
        let signature = DetachedSignature::from_bytes(signed).map_err(malformed)?;

        let mut certificates = signature.certificates().map_err(malformed)?;
        if certificates.is_empty() {
            match &self.trusted {
                Some(trusted) => certificates.push(trusted.certificate.clone()),
                None => {
                    return Err(CoreError::verification(
                        FailureCause::MalformedSignature,
                        "signature carries no signer certificate",
                    ))
                }
            }
        }
        self.certificates = certificates;

        let signer = match signature.kid() {
            Some(kid) => self.position_by_thumbprint(&kid).ok_or_else(|| {
                CoreError::verification(
                    FailureCause::MalformedSignature,
                    format!("signer certificate {} not found in signature", kid),
                )
            })?,
            None => 0,
        };
        self.signer = Some(signer);

        signature
            .verify(original, &self.certificates[signer])
            .map_err(malformed)
    }

    fn verify_raw_certificate(&mut self, signed: &[u8], primary: CoreError) -> Result<()> {
        if !self.allow_certificate_fallback {
            return Err(primary);
        }

        self.certificates.clear();
        self.signer = None;

        let raw = Certificate::from_bytes(signed).map_err(|_| primary)?;

        let trusted = self.trusted.as_ref().ok_or_else(|| {
            CoreError::verification(
                FailureCause::NoMatchingCertificate,
                "raw certificate cannot be accepted without a trusted certificate",
            )
        })?;

        let thumbprint = raw.thumbprint()?;
        if thumbprint != trusted.fingerprint {
            return Err(CoreError::verification(
                FailureCause::NoMatchingCertificate,
                format!(
                    "raw certificate {} does not match trusted certificate {}",
                    thumbprint, trusted.fingerprint
                ),
            ));
        }

        self.certificates.push(raw);
        self.signer = Some(0);
        Ok(())
    }

    fn match_trusted(&mut self) -> Result<()> {
        let Some(trusted) = &self.trusted else {
            return Ok(());
        };

        let matched = self.certificates.iter().position(|cert| {
            let same_thumbprint = cert
                .thumbprint()
                .map(|t| t == trusted.fingerprint)
                .unwrap_or(false);
            same_thumbprint
                || (cert.same_issuer_serial(&trusted.certificate)
                    && cert.public_key == trusted.certificate.public_key)
        });

        match matched {
            Some(index) if Some(index) == self.signer => {
                self.matched = Some(index);
                Ok(())
            }
            Some(_) => Err(CoreError::verification(
                FailureCause::NoMatchingCertificate,
                "trusted certificate is present but did not produce the signature",
            )),
            None => Err(CoreError::verification(
                FailureCause::NoMatchingCertificate,
                format!("no certificate matches trusted certificate {}", trusted.fingerprint),
            )),
        }
    }

    fn enforce_permission(&self) -> Result<()> {
        let (Some(required), Some(trusted), Some(_)) =
            (self.required_permission, &self.trusted, self.matched)
        else {
            return Ok(());
        };

        if trusted.permits(required) {
            Ok(())
        } else {
            Err(CoreError::verification(
                FailureCause::PermissionDenied,
                format!(
                    "certificate permissions '{}' do not include required permission {}",
                    trusted.permission_letters(),
                    required
                ),
            ))
        }
    }

    fn position_by_thumbprint(&self, thumbprint: &str) -> Option<usize> {
        self.certificates
            .iter()
            .position(|cert| cert.thumbprint().map(|t| t == thumbprint).unwrap_or(false))
    }

    fn mark_configured(&mut self) {
        if self.state == SessionState::Unconfigured {
            self.state = SessionState::Configured;
        }
    }
}

fn malformed(err: CoreError) -> CoreError {
    match err {
        CoreError::VerificationFailed { .. } => err,
        other => CoreError::verification(FailureCause::MalformedSignature, other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::access::{PERMISSION_DELETE, PERMISSION_READ, PROTECTION_RCUD};
    use crate::crypto::KeyPair;

    fn trusted(kp: &KeyPair, permissions: u32) -> TrustedCertificate {
        TrustedCertificate::new(kp.certificate().clone(), permissions).unwrap()
    }

    fn session(
        trusted: Option<TrustedCertificate>,
        signed: &[u8],
        required: u32,
    ) -> VerificationSession {
        let mut session = VerificationSession::new();
        session.set_certificate(trusted);
        session.set_signed_data(signed).unwrap();
        session.set_required_permission(required);
        session
    }

    fn cause(err: CoreError) -> FailureCause {
        err.failure_cause().expect("expected a verification failure")
    }

    #[test]
    fn test_verify_before_signed_data_is_not_configured() {
        let mut session = VerificationSession::new();
        assert_eq!(session.state(), SessionState::Unconfigured);
        assert!(matches!(
            session.verify_against(b"data"),
            Err(CoreError::NotConfigured(_))
        ));
    }

    #[test]
    fn test_empty_signed_data_rejected() {
        let mut session = VerificationSession::new();
        assert!(matches!(
            session.set_signed_data(&[]),
            Err(CoreError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_valid_signature_with_permission() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"K14711").unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        s.verify_against(b"K14711").unwrap();

        assert_eq!(s.state(), SessionState::Verified);
        let cert = s.certificate(-1).unwrap();
        assert_eq!(
            cert.thumbprint().unwrap(),
            kp.certificate().thumbprint().unwrap()
        );
    }

    #[test]
    fn test_tampered_data_fails() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"K14711").unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        let err = s.verify_against(b"K14712").unwrap_err();
        assert_eq!(cause(err), FailureCause::MalformedSignature);
        assert_eq!(s.state(), SessionState::Failed);
    }

    #[test]
    fn test_zero_permissions_denied() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"K14711").unwrap();

        let mut s = session(Some(trusted(&kp, 0)), &signed, PERMISSION_READ);
        let err = s.verify_against(b"K14711").unwrap_err();
        assert_eq!(cause(err), FailureCause::PermissionDenied);
    }

    #[test]
    fn test_missing_permission_bit_denied() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"x").unwrap();

        let mut s = session(Some(trusted(&kp, PERMISSION_READ)), &signed, PERMISSION_DELETE);
        let err = s.verify_against(b"x").unwrap_err();
        assert!(err.to_string().contains("permission denied"));
    }

    #[test]
    fn test_untrusted_signer_fails() {
        let trusted_kp = KeyPair::generate("CN=trusted");
        let attacker = KeyPair::generate("CN=attacker");
        let signed = attacker.sign_detached(b"data").unwrap();

        let mut s = session(Some(trusted(&trusted_kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        let err = s.verify_against(b"data").unwrap_err();
        assert_eq!(cause(err), FailureCause::NoMatchingCertificate);
    }

    #[test]
    fn test_trusted_certificate_smuggled_into_chain_fails() {
        let trusted_kp = KeyPair::generate("CN=trusted");
        let attacker = KeyPair::generate("CN=attacker");
        let chain = vec![attacker.certificate().clone(), trusted_kp.certificate().clone()];
        let signed = attacker.sign_detached_with_chain(b"data", &chain).unwrap();

        let mut s = session(Some(trusted(&trusted_kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        let err = s.verify_against(b"data").unwrap_err();
        assert_eq!(cause(err), FailureCause::NoMatchingCertificate);
        assert_eq!(s.certificate_count(), 2);
    }

    #[test]
    fn test_withheld_certificate_still_requires_valid_signature() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"data").unwrap();

        let mut ok = session(None, &signed, PERMISSION_READ);
        assert!(ok.verify_against(b"data").is_ok());

        let mut bad = session(None, &signed, PERMISSION_READ);
        assert!(bad.verify_against(b"other").is_err());
    }

    #[test]
    fn test_signature_without_chain_uses_trusted_certificate() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached_with_chain(b"data", &[]).unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        s.verify_against(b"data").unwrap();
        assert_eq!(s.certificate_count(), 1);
    }

    #[test]
    fn test_issuer_serial_match_with_same_key() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"data").unwrap();

        // Same key, issuer and serial; different subject spelling changes the thumbprint
        let mut reissued = kp.certificate().clone();
        reissued.subject = "CN=ERP, O=Example".into();
        let trusted_cert = TrustedCertificate::new(reissued, PROTECTION_RCUD).unwrap();

        let mut s = session(Some(trusted_cert), &signed, PERMISSION_READ);
        assert!(s.verify_against(b"data").is_ok());
    }

    #[test]
    fn test_raw_certificate_fallback_matches_thumbprint() {
        let kp = KeyPair::generate("CN=ERP");
        let raw = kp.certificate().to_bytes().unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &raw, PERMISSION_READ);
        s.verify_against(b"anything").unwrap();
        assert_eq!(s.certificate(-1), Some(kp.certificate()));
    }

    #[test]
    fn test_raw_certificate_fallback_rejects_other_certificate() {
        let kp = KeyPair::generate("CN=ERP");
        let other = KeyPair::generate("CN=other");
        let raw = other.certificate().to_bytes().unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &raw, PERMISSION_READ);
        let err = s.verify_against(b"anything").unwrap_err();
        assert_eq!(cause(err), FailureCause::NoMatchingCertificate);
    }

    #[test]
    fn test_raw_certificate_fallback_can_be_disabled() {
        let kp = KeyPair::generate("CN=ERP");
        let raw = kp.certificate().to_bytes().unwrap();

        let mut s = VerificationSession::new().with_certificate_fallback(false);
        s.set_certificate(Some(trusted(&kp, PROTECTION_RCUD)));
        s.set_signed_data(&raw).unwrap();
        let err = s.verify_against(b"anything").unwrap_err();
        assert_eq!(cause(err), FailureCause::MalformedSignature);
    }

    #[test]
    fn test_raw_certificate_without_trusted_fails() {
        let kp = KeyPair::generate("CN=ERP");
        let raw = kp.certificate().to_bytes().unwrap();

        let mut s = session(None, &raw, 0);
        assert!(s.verify_against(b"anything").is_err());
    }

    #[test]
    fn test_garbage_fails_as_malformed() {
        let kp = KeyPair::generate("CN=ERP");
        let mut s = session(
            Some(trusted(&kp, PROTECTION_RCUD)),
            b"\x00\x01garbage",
            PERMISSION_READ,
        );
        let err = s.verify_against(b"data").unwrap_err();
        assert_eq!(cause(err), FailureCause::MalformedSignature);
    }

    #[test]
    fn test_disabled_certificate_fails() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"data").unwrap();
        let disabled = trusted(&kp, PROTECTION_RCUD).with_enabled(false);

        let mut s = session(Some(disabled), &signed, PERMISSION_READ);
        let err = s.verify_against(b"data").unwrap_err();
        assert_eq!(cause(err), FailureCause::CertificateDisabled);
    }

    #[test]
    fn test_certificate_index_out_of_range() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"data").unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        assert!(s.certificate(-1).is_none());
        s.verify_against(b"data").unwrap();

        assert_eq!(s.certificate_count(), 1);
        assert!(s.certificate(0).is_some());
        assert!(s.certificate(99).is_none());
    }

    #[test]
    fn test_session_cannot_be_reused() {
        let kp = KeyPair::generate("CN=ERP");
        let signed = kp.sign_detached(b"data").unwrap();

        let mut s = session(Some(trusted(&kp, PROTECTION_RCUD)), &signed, PERMISSION_READ);
        s.verify_against(b"data").unwrap();
        assert!(matches!(
            s.verify_against(b"data"),
            Err(CoreError::NotConfigured(_))
        ));
    }
}
