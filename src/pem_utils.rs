//! Textual PEM envelopes for certificates and private keys.

use der::{Decode, Encode};
use pkcs8::pkcs5::pbes2;
use pkcs8::{EncryptedPrivateKeyInfo, PrivateKeyInfo};
use rand::RngCore;

use crate::cert::Certificate;
use crate::error::{CodecError, Result, SegError};
use crate::key::KeyPair;

pub const CERTIFICATE_LABEL: &str = "CERTIFICATE";
pub const RSA_PRIVATE_KEY_LABEL: &str = "RSA PRIVATE KEY";
pub const PRIVATE_KEY_LABEL: &str = "PRIVATE KEY";
pub const ENCRYPTED_PRIVATE_KEY_LABEL: &str = "ENCRYPTED PRIVATE KEY";

const PBKDF2_ITERATIONS: u32 = 100_000;

/// How private keys are written to disk.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum KeyStoragePolicy {
    /// PKCS#1 `RSA PRIVATE KEY`, no password.
    #[default]
    Unencrypted,
    /// PKCS#8 `ENCRYPTED PRIVATE KEY` (PBES2, PBKDF2-SHA256, AES-256-CBC).
    Encrypted { passphrase: String },
}

impl KeyStoragePolicy {
    pub fn from_passphrase(passphrase: Option<String>) -> Self {
        match passphrase {
            Some(passphrase) => KeyStoragePolicy::Encrypted { passphrase },
            None => KeyStoragePolicy::Unencrypted,
        }
    }
}

/// Convert DER‑encoded data into a PEM‑encoded string with the provided label.
pub fn der_to_pem(der: &[u8], label: &str) -> String {
    let pem = pem::Pem::new(label, der);
    pem::encode_config(&pem, pem::EncodeConfig::new().set_line_ending(pem::LineEnding::LF))
}

/// Convert a PEM‑encoded string to DER‑encoded bytes, requiring `label`.
pub fn pem_to_der(pem_str: &str, label: &str) -> Result<Vec<u8>> {
    let (found, der) = parse_pem(pem_str)?;
    if found != label {
        return Err(CodecError::UnexpectedLabel {
            expected: label.to_string(),
            found,
        }
        .into());
    }
    Ok(der)
}

fn parse_pem(pem_str: &str) -> Result<(String, Vec<u8>)> {
    let pem = pem::parse(pem_str)?;
    Ok((pem.tag().to_string(), pem.contents().to_vec()))
}

pub fn encode_certificate(cert: &Certificate) -> Result<String> {
    Ok(der_to_pem(&cert.to_der()?, CERTIFICATE_LABEL))
}

pub fn decode_certificate(pem_str: &str) -> Result<Certificate> {
    let der = pem_to_der(pem_str, CERTIFICATE_LABEL)?;
    Certificate::from_der(&der)
}

/// Encodes `key` according to `policy`.
pub fn encode_private_key(key: &KeyPair, policy: &KeyStoragePolicy) -> Result<String> {
    match policy {
        KeyStoragePolicy::Unencrypted => Ok(der_to_pem(&key.to_pkcs1_der()?, RSA_PRIVATE_KEY_LABEL)),
        KeyStoragePolicy::Encrypted { passphrase } => {
            let der = encrypt_pkcs8(&key.to_pkcs8_der()?, passphrase)?;
            Ok(der_to_pem(&der, ENCRYPTED_PRIVATE_KEY_LABEL))
        }
    }
}

/// Decodes a private key in any of the supported envelopes.
///
/// `RSA PRIVATE KEY` and `PRIVATE KEY` are accepted under either policy; an
/// `ENCRYPTED PRIVATE KEY` needs [`KeyStoragePolicy::Encrypted`].
pub fn decode_private_key(pem_str: &str, policy: &KeyStoragePolicy) -> Result<KeyPair> {
    let (label, der) = parse_pem(pem_str)?;
    match (label.as_str(), policy) {
        (RSA_PRIVATE_KEY_LABEL, _) => KeyPair::import_from_pkcs1_der(&der),
        (PRIVATE_KEY_LABEL, _) => KeyPair::import_from_pkcs8_der(&der),
        (ENCRYPTED_PRIVATE_KEY_LABEL, KeyStoragePolicy::Encrypted { passphrase }) => {
            let plain = decrypt_pkcs8(&der, passphrase)?;
            KeyPair::import_from_pkcs8_der(&plain)
        }
        (ENCRYPTED_PRIVATE_KEY_LABEL, KeyStoragePolicy::Unencrypted) => Err(SegError::InvalidInput(
            "private key is encrypted but no passphrase was configured".to_string(),
        )),
        (other, _) => Err(CodecError::UnexpectedLabel {
            expected: format!("{RSA_PRIVATE_KEY_LABEL}, {PRIVATE_KEY_LABEL} or {ENCRYPTED_PRIVATE_KEY_LABEL}"),
            found: other.to_string(),
        }
        .into()),
    }
}

fn encrypt_pkcs8(der: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let mut salt = [0u8; 16];
    let mut iv = [0u8; 16];
    let mut rng = rand::rng();
    rng.fill_bytes(&mut salt);
    rng.fill_bytes(&mut iv);

    let params = pbes2::Parameters::pbkdf2_sha256_aes256cbc(PBKDF2_ITERATIONS, &salt, &iv)
        .map_err(|e| SegError::EncodingError(e.to_string()))?;
    let info = PrivateKeyInfo::from_der(der)?;
    let encrypted = info
        .encrypt_with_params(params, passphrase.as_bytes())
        .map_err(|e| SegError::EncodingError(e.to_string()))?;
    Ok(encrypted.as_bytes().to_vec())
}

fn decrypt_pkcs8(der: &[u8], passphrase: &str) -> Result<Vec<u8>> {
    let info = EncryptedPrivateKeyInfo::from_der(der)?;
    let document = info
        .decrypt(passphrase.as_bytes())
        .map_err(|e| CodecError::MalformedDer(format!("cannot decrypt private key: {e}")))?;
    // Re-encode through the typed structure so trailing garbage is rejected.
    let plain = PrivateKeyInfo::from_der(document.as_bytes())?;
    Ok(plain.to_der()?)
}
