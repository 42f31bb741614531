use der::Encode;
use der::flagset::FlagSet;
use sha1::Sha1;
use time::OffsetDateTime;
use tracing::{debug, info, warn};
use x509_cert::certificate::CertificateInner;
use x509_cert::spki::SubjectPublicKeyInfoOwned;

use crate::cert::extensions::{
    AuthorityKeyIdentifier, BasicConstraints, ExtendedKeyUsage, ExtendedKeyUsageOption, KeyUsage,
    KeyUsages, SubjectAltName, SubjectKeyIdentifier,
};
use crate::cert::params::{CertificationRequestInfo, DistinguishedName, ExtensionParam, Validity};
use crate::cert::{Certificate, CertificateWithPrivateKey, SignatureAlgorithm};
use crate::error::{Result, SegError};
use crate::key::{KeyPair, PublicKey};
use crate::tbs_certificate::{TbsCertificate, random_serial_number};

/// Default lifetime of a root certificate.
pub const ROOT_VALIDITY_DAYS: i64 = 3650;
/// Default lifetime of a leaf certificate (the CA/Browser Forum 825-day cap).
pub const LEAF_VALIDITY_DAYS: i64 = 825;

/// Represents an entity capable of issuing certificates.
///
/// This trait provides methods to retrieve issuer details and issue certificates.
pub trait Issuer {
    /// The issuer's encoded subject name, copied into issued certificates.
    fn issuer_name(&self) -> x509_cert::name::Name;

    /// Returns the signing key of the issuer.
    fn signing_key(&self) -> &KeyPair;

    /// Whether this issuer is allowed to sign other certificates.
    fn may_issue(&self) -> bool;

    /// End of the issuer's own validity, if it has one yet.
    fn not_after(&self) -> Option<OffsetDateTime>;

    /// Issues a certificate based on the provided certification request information.
    ///
    /// The leaf's validity is not clamped to the issuer's; a leaf that outlives
    /// its issuer is issued as requested and logged at `warn`.
    ///
    /// # Errors
    /// `CertificateError` if the issuer is not a CA, or any encoding error.
    fn issue(&self, cert_request: &CertificationRequestInfo, validity: Validity) -> Result<Certificate> {
        if !self.may_issue() {
            return Err(SegError::CertificateError(
                "issuer certificate is not a CA".to_string(),
            ));
        }
        if let Some(issuer_not_after) = self.not_after() {
            if validity.not_after > issuer_not_after {
                warn!(
                    subject = %cert_request.subject,
                    leaf_not_after = %validity.not_after,
                    %issuer_not_after,
                    "certificate outlives its issuer"
                );
            }
        }

        let signature_algo = SignatureAlgorithm::Sha256WithRSA;

        let issuer_spki = self.signing_key().as_spki()?;
        let subject_spki = cert_request.subject_public_key.to_spki()?;

        let basic_constraints = BasicConstraints {
            is_ca: cert_request.is_ca,
            max_path_length: cert_request.max_path_length,
        };
        let subject_key_id = SubjectKeyIdentifier(key_identifier(&subject_spki));
        let authority_key_id = AuthorityKeyIdentifier {
            key_identifier: key_identifier(&issuer_spki),
        };

        let mut extensions: Vec<ExtensionParam> = vec![
            ExtensionParam::from_extension(basic_constraints, true)?,
            ExtensionParam::from_extension(subject_key_id, false)?,
            ExtensionParam::from_extension(authority_key_id, false)?,
        ];

        let mut key_usage_flags: FlagSet<KeyUsages> = FlagSet::empty();

        if cert_request.is_ca {
            key_usage_flags |= KeyUsages::KeyCertSign;
            key_usage_flags |= KeyUsages::CRLSign;
        }

        for usage in &cert_request.usages {
            match usage {
                ExtendedKeyUsageOption::ClientAuth | ExtendedKeyUsageOption::ServerAuth => {
                    key_usage_flags |= KeyUsages::DigitalSignature;
                    key_usage_flags |= KeyUsages::KeyEncipherment;
                }
            }
        }

        if !key_usage_flags.is_empty() {
            extensions.push(ExtensionParam::from_extension(KeyUsage(key_usage_flags), true)?);
        }

        if !cert_request.usages.is_empty() {
            let extended_key_usage = ExtendedKeyUsage {
                usage: cert_request.usages.clone(),
            };
            extensions.push(ExtensionParam::from_extension(extended_key_usage, false)?);
        }

        if !cert_request.subject_alt_names.is_empty() {
            let san = SubjectAltName {
                names: cert_request.subject_alt_names.clone(),
            };
            extensions.push(ExtensionParam::from_extension(san, false)?);
        }

        let combined_extensions = cert_request
            .extensions
            .iter()
            .cloned()
            .chain(extensions)
            .collect();

        let tbs_cert = TbsCertificate {
            serial_number: random_serial_number(),
            signature_algorithm: signature_algo.clone(),
            issuer: self.issuer_name(),
            validity,
            subject: cert_request.subject.as_x509_name()?,
            subject_public_key: cert_request.subject_public_key.clone(),
            extensions: combined_extensions,
        };

        let tbs_cert_inner = tbs_cert.to_tbs_certificate_inner()?;
        let signature = self.signing_key().sign_data(&tbs_cert_inner.to_der()?)?;

        let cert_inner = CertificateInner {
            tbs_certificate: tbs_cert_inner,
            signature_algorithm: signature_algo.into(),
            signature: der::asn1::BitString::from_bytes(&signature)?,
        };

        Ok(Certificate { inner: cert_inner })
    }
}

/// SHA-1 over the subjectPublicKey bits (RFC 5280 §4.2.1.2, method 1).
fn key_identifier(spki: &SubjectPublicKeyInfoOwned) -> Vec<u8> {
    <Sha1 as sha1::Digest>::digest(spki.subject_public_key.raw_bytes()).to_vec()
}

/// Generates a fresh key and a self-signed CA certificate for `name`,
/// valid from now for `validity_days`, with no path length limit.
pub fn issue_root(name: &DistinguishedName, validity_days: i64) -> Result<CertificateWithPrivateKey> {
    debug!(subject = %name, "generating root key");
    let key = KeyPair::generate()?;
    let cert_info = CertificationRequestInfo::builder()
        .subject(name.clone())
        .subject_public_key(PublicKey::from_key_pair(&key))
        .is_ca(true)
        .build();

    let cert = Certificate::new_self_signed(&cert_info, &key, Validity::for_days(validity_days)?)?;
    info!(subject = %name, validity_days, "issued root certificate");
    Ok(CertificateWithPrivateKey { cert, key })
}

/// Generates a fresh key and a leaf certificate for `common_name` in
/// `organization`, signed by `issuer`.
///
/// Every entry of `subject_alt_names` is classified as an IP address or a DNS
/// name and attached, in order, as a non-critical SAN extension. No SAN
/// extension is emitted when the list is empty.
pub fn issue_leaf<I: Issuer, S: AsRef<str>>(
    common_name: &str,
    organization: &str,
    issuer: &I,
    subject_alt_names: &[S],
    validity_days: i64,
) -> Result<CertificateWithPrivateKey> {
    let subject = DistinguishedName::new(common_name, organization);
    debug!(%subject, "generating leaf key");
    let key = KeyPair::generate()?;

    let cert_info = CertificationRequestInfo::builder()
        .subject(subject.clone())
        .subject_public_key(PublicKey::from_key_pair(&key))
        .usages(vec![
            ExtendedKeyUsageOption::ServerAuth,
            ExtendedKeyUsageOption::ClientAuth,
        ])
        .subject_alt_names(SubjectAltName::from_raw(subject_alt_names).names)
        .build();

    let cert = issuer.issue(&cert_info, Validity::for_days(validity_days)?)?;
    info!(
        %subject,
        san_count = subject_alt_names.len(),
        validity_days,
        "issued leaf certificate"
    );
    Ok(CertificateWithPrivateKey { cert, key })
}
