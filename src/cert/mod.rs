pub mod extensions;
pub mod params;

use der::asn1::Any;
use der::{Decode, Encode, EncodePem};
use extensions::{BasicConstraints, SanEntry, SubjectAltName, ToAndFromX509Extension};
use params::{CertificationRequestInfo, DistinguishedName, Validity};
use time::OffsetDateTime;
use x509_cert::certificate::CertificateInner;

use crate::error::{Result, SegError, VerificationError};
use crate::issuer::Issuer;
use crate::key::{KeyPair, PublicKey};
use crate::signature;
use crate::tbs_certificate::from_x509_time;

/// Signature algorithms this crate emits and accepts on certificates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SignatureAlgorithm {
    /// RSASSA-PKCS1-v1_5 with SHA-256 (`sha256WithRSAEncryption`).
    Sha256WithRSA,
}

impl SignatureAlgorithm {
    pub fn oid(&self) -> const_oid::ObjectIdentifier {
        match self {
            SignatureAlgorithm::Sha256WithRSA => const_oid::db::rfc5912::SHA_256_WITH_RSA_ENCRYPTION,
        }
    }
}

impl From<SignatureAlgorithm> for x509_cert::spki::AlgorithmIdentifierOwned {
    /// Converts a `SignatureAlgorithm` into an `AlgorithmIdentifierOwned`.
    ///
    /// RSA PKCS#1 identifiers carry an explicit NULL parameter (RFC 4055).
    fn from(value: SignatureAlgorithm) -> Self {
        x509_cert::spki::AlgorithmIdentifierOwned {
            oid: value.oid(),
            parameters: Some(Any::null()),
        }
    }
}

/// Represents an X.509 certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Certificate {
    /// The inner representation of the certificate.
    pub inner: CertificateInner,
}

impl Certificate {
    /// Encodes the certificate into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        self.inner
            .to_der()
            .map_err(|e| SegError::EncodingError(e.to_string()))
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String> {
        self.inner
            .to_pem(pkcs8::LineEnding::LF)
            .map_err(|e| SegError::EncodingError(e.to_string()))
    }

    pub fn from_der(der: &[u8]) -> Result<Self> {
        let inner = CertificateInner::from_der(der)?;
        Ok(Self { inner })
    }

    pub fn from_pem(pem: &str) -> Result<Self> {
        crate::pem_utils::decode_certificate(pem)
    }

    pub fn subject(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.subject)
    }

    pub fn issuer(&self) -> Result<DistinguishedName> {
        DistinguishedName::from_x509_name(&self.inner.tbs_certificate.issuer)
    }

    /// True when the encoded issuer and subject names are identical.
    pub fn is_self_issued(&self) -> bool {
        self.inner.tbs_certificate.issuer == self.inner.tbs_certificate.subject
    }

    pub fn serial_number(&self) -> Vec<u8> {
        self.inner
            .tbs_certificate
            .serial_number
            .as_bytes()
            .to_vec()
    }

    pub fn validity(&self) -> Validity {
        let validity = &self.inner.tbs_certificate.validity;
        Validity {
            not_before: from_x509_time(&validity.not_before),
            not_after: from_x509_time(&validity.not_after),
        }
    }

    pub fn is_valid_at(&self, at: OffsetDateTime) -> bool {
        self.validity().contains(at)
    }

    pub fn public_key(&self) -> Result<PublicKey> {
        PublicKey::from_x509spki(&self.inner.tbs_certificate.subject_public_key_info)
    }

    pub fn signature_algorithm(&self) -> const_oid::ObjectIdentifier {
        self.inner.signature_algorithm.oid
    }

    /// Finds and decodes the first extension of type `E`.
    pub fn extension<E: ToAndFromX509Extension>(&self) -> Result<Option<E>> {
        self.inner
            .tbs_certificate
            .extensions
            .iter()
            .flatten()
            .find(|ext| ext.extn_id == E::OID)
            .map(|ext| E::from_x509_extension_value(ext.extn_value.as_bytes()))
            .transpose()
    }

    /// `isCA` from basic constraints; absent constraints mean "not a CA".
    pub fn is_ca(&self) -> bool {
        self.basic_constraints().is_ca
    }

    pub fn path_len_constraint(&self) -> Option<u8> {
        self.basic_constraints().max_path_length
    }

    fn basic_constraints(&self) -> BasicConstraints {
        self.extension::<BasicConstraints>()
            .ok()
            .flatten()
            .unwrap_or_default()
    }

    pub fn subject_alt_names(&self) -> Result<Vec<SanEntry>> {
        Ok(self
            .extension::<SubjectAltName>()?
            .map(|san| san.names)
            .unwrap_or_default())
    }

    /// Checks that this certificate was signed by the holder of `issuer_key`.
    pub fn verify_signed_by(&self, issuer_key: &PublicKey) -> std::result::Result<(), VerificationError> {
        if self.inner.signature_algorithm.oid != SignatureAlgorithm::Sha256WithRSA.oid() {
            return Err(VerificationError::UnsupportedKeyType(format!(
                "certificate signature algorithm {}",
                self.inner.signature_algorithm.oid
            )));
        }
        let tbs = self
            .inner
            .tbs_certificate
            .to_der()
            .map_err(|e| VerificationError::MalformedSignature(e.to_string()))?;
        let signature = self.inner.signature.as_bytes().ok_or_else(|| {
            VerificationError::MalformedSignature("signature has unused bits".to_string())
        })?;
        signature::verify(issuer_key, &tbs, signature)
    }

    /// Creates a new self-signed certificate valid for `validity`.
    pub fn new_self_signed(
        cert_info: &CertificationRequestInfo,
        key: &KeyPair,
        validity: Validity,
    ) -> Result<Self> {
        // For self-signed certificates, the issuer is the same as the subject
        let self_issuer = SelfIssuer {
            name: cert_info.subject.as_x509_name()?,
            key,
        };
        self_issuer.issue(cert_info, validity)
    }
}

// Helper struct for self-signed certificates
struct SelfIssuer<'a> {
    name: x509_cert::name::Name,
    key: &'a KeyPair,
}

impl Issuer for SelfIssuer<'_> {
    fn issuer_name(&self) -> x509_cert::name::Name {
        self.name.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        self.key
    }

    fn may_issue(&self) -> bool {
        true
    }

    fn not_after(&self) -> Option<OffsetDateTime> {
        None
    }
}

/// A certificate together with the private key it certifies.
#[derive(Debug, Clone)]
pub struct CertificateWithPrivateKey {
    pub cert: Certificate,
    pub key: KeyPair,
}

impl Issuer for CertificateWithPrivateKey {
    fn issuer_name(&self) -> x509_cert::name::Name {
        // The name of the issuer is the subject of the certificate
        self.cert.inner.tbs_certificate.subject.clone()
    }

    fn signing_key(&self) -> &KeyPair {
        &self.key
    }

    fn may_issue(&self) -> bool {
        self.cert.is_ca()
    }

    fn not_after(&self) -> Option<OffsetDateTime> {
        Some(self.cert.validity().not_after)
    }
}
