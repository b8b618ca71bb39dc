//! Signature gate for inbound submissions.
//!
//! A submission carries its payload as a base64 string plus a base64
//! HMAC-SHA-256 tag computed over that string (not over the decoded bytes).
//! The gate recomputes the tag with the shared secret and compares in
//! constant time. It runs before anything touches the job store.

use base64::{Engine as _, engine::general_purpose::STANDARD as B64};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Errors raised by the signature gate.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GateError {
    #[error("{0} is required")]
    Blank(&'static str),

    #[error("invalid signature")]
    InvalidSignature,

    #[error("signature is not valid base64: {0}")]
    MalformedSignature(String),

    #[error("signing key rejected: {0}")]
    InvalidKey(String),
}

/// Verifies submission tags against a shared HMAC secret.
#[derive(Clone)]
pub struct SignatureGate {
    secret: Vec<u8>,
}

impl std::fmt::Debug for SignatureGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignatureGate").finish_non_exhaustive()
    }
}

impl SignatureGate {
    /// Create a gate keyed with `secret`.
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    fn mac(&self) -> Result<HmacSha256, GateError> {
        HmacSha256::new_from_slice(&self.secret).map_err(|e| GateError::InvalidKey(e.to_string()))
    }

    /// Compute the base64 tag for `data`.
    pub fn sign(&self, data: &str) -> Result<String, GateError> {
        let mut mac = self.mac()?;
        mac.update(data.as_bytes());
        Ok(B64.encode(mac.finalize().into_bytes()))
    }

    /// Admit `data` only if `signature` is its tag under this gate's secret.
    pub fn verify(&self, data: &str, signature: &str) -> Result<(), GateError> {
        if data.trim().is_empty() {
            return Err(GateError::Blank("data"));
        }
        if signature.trim().is_empty() {
            return Err(GateError::Blank("signature"));
        }

        let tag = B64
            .decode(signature)
            .map_err(|e| GateError::MalformedSignature(e.to_string()))?;

        let mut mac = self.mac()?;
        mac.update(data.as_bytes());
        // verify_slice compares in constant time
        mac.verify_slice(&tag).map_err(|_| {
            tracing::warn!("Rejected submission with mismatched signature");
            GateError::InvalidSignature
        })
    }
}
