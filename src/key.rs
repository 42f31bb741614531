use std::fmt;

use rsa::pkcs1::{DecodeRsaPrivateKey, EncodeRsaPrivateKey};
use rsa::pkcs1v15::SigningKey as RsaSigningKey;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey};
use rsa::signature::{SignatureEncoding, Signer};
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::error::{CodecError, Result, SegError};

/// Modulus size used for every key this crate generates.
pub const RSA_KEY_BITS: usize = 2048;

/// An RSA key pair owned by a single certificate subject.
///
/// The private half is never printed: `Debug` only shows the modulus size.
#[derive(Clone)]
pub struct KeyPair {
    private: Box<RsaPrivateKey>,
    public: RsaPublicKey,
}

impl KeyPair {
    /// Generate a key pair with the crate's fixed modulus size and e = 65537.
    pub fn generate() -> Result<Self> {
        Self::generate_rsa(RSA_KEY_BITS)
    }

    /// Generate an RSA key pair with the specified number of bits.
    pub fn generate_rsa(bits: usize) -> Result<Self> {
        let mut rng = rand_core::OsRng;
        let private = RsaPrivateKey::new(&mut rng, bits)
            .map_err(|e| SegError::KeyGenerationError(e.to_string()))?;
        Ok(Self::from_private(private))
    }

    fn from_private(private: RsaPrivateKey) -> Self {
        let public = RsaPublicKey::from(&private);
        KeyPair {
            private: Box::new(private),
            public,
        }
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey {
            inner: self.public.clone(),
        }
    }

    /// SubjectPublicKeyInfo for embedding into a certificate.
    pub fn as_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        self.public_key().to_spki()
    }

    /// RSASSA-PKCS1-v1_5 with SHA-256 over `data`.
    pub fn sign_data(&self, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key: RsaSigningKey<Sha256> = RsaSigningKey::new(self.private.as_ref().clone());
        let signature = signing_key
            .try_sign(data)
            .map_err(|e| SegError::RsaError(e.to_string()))?;
        Ok(signature.to_vec())
    }

    /// PKCS#1 `RSAPrivateKey` DER.
    pub fn to_pkcs1_der(&self) -> Result<Vec<u8>> {
        let document = self
            .private
            .to_pkcs1_der()
            .map_err(|e| SegError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    /// PKCS#8 `PrivateKeyInfo` DER.
    pub fn to_pkcs8_der(&self) -> Result<Vec<u8>> {
        let document = self
            .private
            .to_pkcs8_der()
            .map_err(|e| SegError::EncodingError(e.to_string()))?;
        Ok(document.as_bytes().to_vec())
    }

    pub fn import_from_pkcs1_der(der: &[u8]) -> Result<Self> {
        let private = RsaPrivateKey::from_pkcs1_der(der)?;
        Ok(Self::from_private(private))
    }

    /// Imports a PKCS#8 key, rejecting anything but `rsaEncryption`.
    pub fn import_from_pkcs8_der(der: &[u8]) -> Result<Self> {
        let info = pkcs8::PrivateKeyInfo::try_from(der)?;
        if info.algorithm.oid != const_oid::db::rfc5912::RSA_ENCRYPTION {
            return Err(CodecError::WrongKeyType(format!(
                "expected rsaEncryption, found {}",
                info.algorithm.oid
            ))
            .into());
        }
        let private = RsaPrivateKey::from_pkcs8_der(der)?;
        Ok(Self::from_private(private))
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &"rsa")
            .field("bits", &(self.public.size() * 8))
            .finish_non_exhaustive()
    }
}

/// The public half of a [`KeyPair`], or a key extracted from a certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PublicKey {
    inner: RsaPublicKey,
}

impl PublicKey {
    pub fn from_key_pair(key_pair: &KeyPair) -> Self {
        key_pair.public_key()
    }

    /// Extracts the RSA key from a certificate's SubjectPublicKeyInfo.
    ///
    /// # Errors
    /// `CodecError::WrongKeyType` when the key is not `rsaEncryption`.
    pub fn from_x509spki(spki: &SubjectPublicKeyInfoOwned) -> Result<Self> {
        if spki.algorithm.oid != const_oid::db::rfc5912::RSA_ENCRYPTION {
            return Err(CodecError::WrongKeyType(format!(
                "expected rsaEncryption, found {}",
                spki.algorithm.oid
            ))
            .into());
        }
        let der = der::Encode::to_der(spki)?;
        let inner = RsaPublicKey::from_public_key_der(&der)?;
        Ok(Self { inner })
    }

    pub fn to_spki(&self) -> Result<SubjectPublicKeyInfoOwned> {
        Ok(SubjectPublicKeyInfoOwned::from_key(self.inner.clone())?)
    }

    pub fn as_rsa(&self) -> &RsaPublicKey {
        &self.inner
    }

    /// Modulus length in bytes, which is also the signature length.
    pub fn size(&self) -> usize {
        self.inner.size()
    }
}
