//! Detached signatures for signed URLs
//!
//! A signed URL carries a COSE_Sign1 structure with a detached payload: the
//! signed message is rebuilt by the receiver from the URL itself. The signer
//! certificate (optionally followed by further certificates) travels in the
//! unprotected `x5chain` header, and the protected `kid` holds the signer's
//! thumbprint.
//!
//! Key types:
//! - `KeyPair`: Ed25519 signing key plus the certificate describing it
//! - `DetachedSignature`: a decoded COSE_Sign1 awaiting verification

use base64::{engine::general_purpose::STANDARD, Engine};
use coset::{
    cbor::value::Value, iana, CborSerializable, CoseSign1, CoseSign1Builder, HeaderBuilder,
    Label,
};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use percent_encoding::{utf8_percent_encode, NON_ALPHANUMERIC};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::certificate::Certificate;
use crate::error::{CoreError, Result};

/// COSE algorithm identifier for EdDSA (Ed25519)
const EDDSA_ALG: iana::Algorithm = iana::Algorithm::EdDSA;

/// COSE header label for an X.509-style certificate chain
const X5CHAIN_LABEL: i64 = 33;

/// Ed25519 key pair bound to a certificate
#[derive(Clone)]
pub struct KeyPair {
    certificate: Certificate,
    signing_key: SigningKey,
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyPair")
            .field("subject", &self.certificate.subject)
            .field("serial", &self.certificate.serial)
            .field("signing_key", &"[redacted]")
            .finish()
    }
}

impl KeyPair {
    /// Generate a new random key pair with a self-issued certificate
    pub fn generate(subject: impl Into<String>) -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let mut serial = [0u8; 16];
        OsRng.fill_bytes(&mut serial);
        let subject = subject.into();
        Self::from_signing_key(subject.clone(), subject, hex::encode(serial), signing_key)
    }

    /// Create a key pair from an existing signing key
    pub fn from_signing_key(
        subject: impl Into<String>,
        issuer: impl Into<String>,
        serial: impl Into<String>,
        signing_key: SigningKey,
    ) -> Self {
        let certificate = Certificate {
            subject: subject.into(),
            issuer: issuer.into(),
            serial: serial.into(),
            public_key: STANDARD.encode(signing_key.verifying_key().to_bytes()),
        };
        Self {
            certificate,
            signing_key,
        }
    }

    /// Create a key pair from raw secret key bytes
    pub fn from_bytes(
        subject: impl Into<String>,
        serial: impl Into<String>,
        bytes: &[u8; 32],
    ) -> Self {
        let subject = subject.into();
        Self::from_signing_key(subject.clone(), subject, serial, SigningKey::from_bytes(bytes))
    }

    /// The certificate describing this key
    pub fn certificate(&self) -> &Certificate {
        &self.certificate
    }

    /// Get the raw signing key bytes
    pub fn signing_key_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign `data` and embed this key's certificate
    pub fn sign_detached(&self, data: &[u8]) -> Result<Vec<u8>> {
        self.sign_detached_with_chain(data, std::slice::from_ref(&self.certificate))
    }

    /// Sign `data` and embed `chain` (signer first) in the x5chain header
    ///
    /// An empty chain produces a signature without embedded certificates;
    /// the verifier then falls back to the trusted certificate it was given.
    pub fn sign_detached_with_chain(&self, data: &[u8], chain: &[Certificate]) -> Result<Vec<u8>> {
        let protected = HeaderBuilder::new()
            .algorithm(EDDSA_ALG)
            .key_id(self.certificate.thumbprint()?.into_bytes())
            .build();

        let mut unprotected = HeaderBuilder::new();
        if !chain.is_empty() {
            let mut encoded = chain
                .iter()
                .map(|cert| cert.to_bytes().map(Value::Bytes))
                .collect::<Result<Vec<_>>>()?;
            let value = if encoded.len() == 1 {
                encoded.remove(0)
            } else {
                Value::Array(encoded)
            };
            unprotected = unprotected.value(X5CHAIN_LABEL, value);
        }

        let mut cose = CoseSign1Builder::new()
            .protected(protected)
            .unprotected(unprotected.build())
            .build();

        let tbs = cose.tbs_detached_data(data, &[]);
        cose.signature = self.signing_key.sign(&tbs).to_bytes().to_vec();

        cose.to_vec().map_err(CoreError::from)
    }

    /// Sign `data` and encode the result as a `secKey` query value
    pub fn sec_key(&self, data: &[u8]) -> Result<String> {
        let signed = STANDARD.encode(self.sign_detached(data)?);
        Ok(utf8_percent_encode(&signed, NON_ALPHANUMERIC).to_string())
    }
}

/// A decoded detached signature
#[derive(Debug, Clone)]
pub struct DetachedSignature {
    cose: CoseSign1,
}

impl DetachedSignature {
    /// Deserialize from CBOR bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let cose = CoseSign1::from_slice(bytes).map_err(CoreError::from)?;
        if cose.payload.is_some() {
            return Err(CoreError::Cose("Expected a detached payload".into()));
        }
        Ok(Self { cose })
    }

    /// Signer thumbprint from the protected header
    pub fn kid(&self) -> Option<String> {
        let kid = &self.cose.protected.header.key_id;
        if kid.is_empty() {
            None
        } else {
            Some(String::from_utf8_lossy(kid).to_string())
        }
    }

    /// Certificates embedded in the x5chain header, signer first
    pub fn certificates(&self) -> Result<Vec<Certificate>> {
        let chain = self
            .cose
            .unprotected
            .rest
            .iter()
            .chain(self.cose.protected.header.rest.iter())
            .find(|(label, _)| *label == Label::Int(X5CHAIN_LABEL))
            .map(|(_, value)| value);

        match chain {
            None => Ok(Vec::new()),
            Some(Value::Bytes(bytes)) => Ok(vec![Certificate::from_bytes(bytes)?]),
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| match item {
                    Value::Bytes(bytes) => Certificate::from_bytes(bytes),
                    _ => Err(CoreError::Cose("x5chain entry is not a byte string".into())),
                })
                .collect(),
            Some(_) => Err(CoreError::Cose("x5chain has an unexpected type".into())),
        }
    }

    /// Check the signature over `data` with `signer`'s public key
    pub fn verify(&self, data: &[u8], signer: &Certificate) -> Result<()> {
        let verifying_key = VerifyingKey::from_bytes(&signer.public_key_bytes()?)?;

        let tbs = self.cose.tbs_detached_data(data, &[]);

        let signature_bytes: [u8; 64] = self
            .cose
            .signature
            .as_slice()
            .try_into()
            .map_err(|_| CoreError::Crypto("Invalid signature length".into()))?;
        let signature = Signature::from_bytes(&signature_bytes);

        verifying_key
            .verify(&tbs, &signature)
            .map_err(|e| CoreError::Crypto(e.to_string()))
    }
}
