use std::time::SystemTime;

use der::asn1::{GeneralizedTime, OctetString, UtcTime};
use rand::RngCore;
use x509_cert::Version;
use x509_cert::certificate::TbsCertificateInner;
use x509_cert::serial_number::SerialNumber;

use crate::cert::SignatureAlgorithm;
use crate::cert::params::{ExtensionParam, Validity};
use crate::error::{Result, SegError};
use crate::key::PublicKey;

/// Number of random octets in a generated serial number.
pub const SERIAL_NUMBER_LEN: usize = 16;

/// Represents the "To Be Signed" (TBS) portion of an X.509 certificate.
///
/// # Fields
/// * `serial_number` - The unique identifier for the certificate.
/// * `signature_algorithm` - The algorithm used to sign the certificate.
/// * `issuer` - The encoded name of the certificate issuer.
/// * `validity` - The certificate's validity period.
/// * `subject` - The encoded name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `extensions` - Additional X.509 extensions for the certificate.
pub struct TbsCertificate {
    pub serial_number: Vec<u8>,
    pub signature_algorithm: SignatureAlgorithm,
    /// Copied verbatim from the issuer's subject so chain building can
    /// compare the encoded bytes.
    pub issuer: x509_cert::name::Name,
    pub validity: Validity,
    pub subject: x509_cert::name::Name,
    pub subject_public_key: PublicKey,
    pub extensions: Vec<ExtensionParam>,
}

/// A positive serial number with `8 * SERIAL_NUMBER_LEN - 2` bits of entropy.
///
/// The top bit is cleared so the INTEGER stays positive without a padding
/// octet, and the low bit of the first byte is set so that byte is never zero
/// and the length is stable.
pub fn random_serial_number() -> Vec<u8> {
    let mut serial = vec![0u8; SERIAL_NUMBER_LEN];
    rand::rng().fill_bytes(&mut serial);
    serial[0] = (serial[0] & 0x7f) | 0x01;
    serial
}

impl TbsCertificate {
    /// Converts the `TbsCertificate` into a `TbsCertificateInner` for DER encoding.
    pub fn to_tbs_certificate_inner(&self) -> Result<TbsCertificateInner> {
        if self.validity.not_before > self.validity.not_after {
            return Err(SegError::CertificateError(
                "notBefore is after notAfter".to_string(),
            ));
        }

        let algorithm_id: x509_cert::spki::AlgorithmIdentifierOwned =
            self.signature_algorithm.clone().into();

        let extensions = self
            .extensions
            .iter()
            .map(|ext| {
                Ok(x509_cert::ext::Extension {
                    extn_id: ext.oid,
                    critical: ext.critical,
                    extn_value: OctetString::new(ext.value.clone())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let validity = x509_cert::time::Validity {
            not_before: to_x509_time(self.validity.not_before)?,
            not_after: to_x509_time(self.validity.not_after)?,
        };

        let serial_number = SerialNumber::new(self.serial_number.as_slice())?;

        Ok(TbsCertificateInner {
            version: Version::V3,
            serial_number,
            signature: algorithm_id,
            issuer: self.issuer.clone(),
            validity,
            subject: self.subject.clone(),
            subject_public_key_info: self.subject_public_key.to_spki()?,
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: (!extensions.is_empty()).then_some(extensions),
        })
    }

    /// Encodes the `TbsCertificate` into DER format.
    pub fn to_der(&self) -> Result<Vec<u8>> {
        Ok(der::Encode::to_der(&self.to_tbs_certificate_inner()?)?)
    }
}

/// UTCTime through 2049, GeneralizedTime afterwards.
fn to_x509_time(at: time::OffsetDateTime) -> Result<x509_cert::time::Time> {
    let date_time = der::DateTime::from_system_time(SystemTime::from(at))
        .map_err(|e| SegError::CertificateError(format!("time {at} is not encodable: {e}")))?;
    if date_time.year() < 2050 {
        Ok(x509_cert::time::Time::UtcTime(UtcTime::from_date_time(date_time)?))
    } else {
        Ok(x509_cert::time::Time::GeneralTime(
            GeneralizedTime::from_date_time(date_time),
        ))
    }
}

pub(crate) fn from_x509_time(at: &x509_cert::time::Time) -> time::OffsetDateTime {
    time::OffsetDateTime::from(at.to_system_time())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serial_numbers_are_positive_and_distinct() {
        let a = random_serial_number();
        let b = random_serial_number();
        assert_eq!(a.len(), SERIAL_NUMBER_LEN);
        for serial in [&a, &b] {
            assert_eq!(serial[0] & 0x80, 0);
            assert_eq!(serial[0] & 0x01, 0x01);
        }
        assert_ne!(a, b);
        let encoded: SerialNumber = SerialNumber::new(&a).unwrap();
        assert_eq!(encoded.as_bytes(), a.as_slice());
    }

    #[test]
    fn near_dates_use_utc_time() {
        let at = time::macros::datetime!(2049-12-31 23:59:59 UTC);
        assert!(matches!(
            to_x509_time(at).unwrap(),
            x509_cert::time::Time::UtcTime(_)
        ));
    }

    #[test]
    fn far_future_uses_generalized_time() {
        let at = time::macros::datetime!(2051-01-01 00:00 UTC);
        assert!(matches!(
            to_x509_time(at).unwrap(),
            x509_cert::time::Time::GeneralTime(_)
        ));
        assert_eq!(from_x509_time(&to_x509_time(at).unwrap()), at);
    }
}
