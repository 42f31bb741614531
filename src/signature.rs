//! Detached RSASSA-PKCS1-v1_5 / SHA-256 signatures over raw document bytes.
//!
//! Signing is deterministic: the same key and payload always give the same
//! signature. Verification never panics and never reports success for a
//! malformed input; every rejection is a [`VerificationError`].

use rsa::pkcs1v15::{Signature, VerifyingKey};
use rsa::signature::Verifier;
use sha2::Sha256;

use crate::cert::Certificate;
use crate::error::{CodecError, Result, SegError, VerificationError};
use crate::key::{KeyPair, PublicKey};

/// Signs the full `payload` with `key`.
pub fn sign(key: &KeyPair, payload: &[u8]) -> Result<Vec<u8>> {
    key.sign_data(payload)
}

/// Verifies `signature` over `payload` against `public_key`.
pub fn verify(
    public_key: &PublicKey,
    payload: &[u8],
    signature: &[u8],
) -> std::result::Result<(), VerificationError> {
    let expected = public_key.size();
    if signature.len() != expected {
        return Err(VerificationError::MalformedSignature(format!(
            "expected {expected} bytes, got {}",
            signature.len()
        )));
    }
    let signature = Signature::try_from(signature)
        .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?;

    let verifying_key: VerifyingKey<Sha256> = VerifyingKey::new(public_key.as_rsa().clone());
    verifying_key
        .verify(payload, &signature)
        .map_err(|_| VerificationError::SignatureMismatch)
}

/// Verifies against the key embedded in `certificate`.
///
/// A certificate whose key is not RSA yields
/// [`VerificationError::UnsupportedKeyType`].
pub fn verify_with_certificate(
    certificate: &Certificate,
    payload: &[u8],
    signature: &[u8],
) -> std::result::Result<(), VerificationError> {
    let public_key = certificate.public_key().map_err(|e| match e {
        SegError::Codec(CodecError::WrongKeyType(detail)) => {
            VerificationError::UnsupportedKeyType(detail)
        }
        other => VerificationError::UnsupportedKeyType(other.to_string()),
    })?;
    verify(&public_key, payload, signature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signature_verifies_for_same_payload() {
        let key = KeyPair::generate().unwrap();
        let payload = b"<doc>hello</doc>";
        let signature = sign(&key, payload).unwrap();
        assert_eq!(signature.len(), 256);
        assert_eq!(verify(&key.public_key(), payload, &signature), Ok(()));
    }

    #[test]
    fn signing_is_deterministic() {
        let key = KeyPair::generate().unwrap();
        assert_eq!(sign(&key, b"abc").unwrap(), sign(&key, b"abc").unwrap());
    }

    #[test]
    fn different_payload_is_a_mismatch() {
        let key = KeyPair::generate().unwrap();
        let signature = sign(&key, b"original").unwrap();
        assert_eq!(
            verify(&key.public_key(), b"originaL", &signature),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn empty_payload_is_signable() {
        let key = KeyPair::generate().unwrap();
        let signature = sign(&key, b"").unwrap();
        assert!(verify(&key.public_key(), b"", &signature).is_ok());
        assert!(verify(&key.public_key(), b"x", &signature).is_err());
    }

    #[test]
    fn wrong_key_is_a_mismatch() {
        let key = KeyPair::generate().unwrap();
        let other = KeyPair::generate().unwrap();
        let signature = sign(&key, b"payload").unwrap();
        assert_eq!(
            verify(&other.public_key(), b"payload", &signature),
            Err(VerificationError::SignatureMismatch)
        );
    }

    #[test]
    fn truncated_signature_is_malformed() {
        let key = KeyPair::generate().unwrap();
        let mut signature = sign(&key, b"payload").unwrap();
        signature.truncate(100);
        assert!(matches!(
            verify(&key.public_key(), b"payload", &signature),
            Err(VerificationError::MalformedSignature(_))
        ));
        assert!(matches!(
            verify(&key.public_key(), b"payload", &[]),
            Err(VerificationError::MalformedSignature(_))
        ));
    }
}
