use std::fmt;

use bon::Builder;
use const_oid::ObjectIdentifier;
use const_oid::db::rfc4519::{COMMON_NAME, COUNTRY_NAME, ORGANIZATION_NAME};
use der::asn1::{Any, PrintableStringRef, SetOfVec};
use der::Tag;
use time::Duration;
use time::OffsetDateTime;
use x509_cert::attr::AttributeTypeAndValue;
use x509_cert::name::{RdnSequence, RelativeDistinguishedName};

use super::extensions::{ExtendedKeyUsageOption, SanEntry, ToAndFromX509Extension};
use crate::error::{Result, SegError};
use crate::key::PublicKey;

/// Country used when a name does not specify one.
pub const DEFAULT_COUNTRY: &str = "BD";
/// Organization used when a name does not specify one.
pub const DEFAULT_ORGANIZATION: &str = "Government";

/// Parameters for building an X.509 certificate.
///
/// # Fields
/// * `subject` - The distinguished name of the certificate subject.
/// * `subject_public_key` - The public key of the certificate subject.
/// * `usages` - A list of extended key usage options.
/// * `is_ca` - Indicates if the certificate is a CA.
/// * `max_path_length` - Path length constraint; only meaningful when `is_ca`.
/// * `subject_alt_names` - Alternative names, in order.
/// * `extensions` - Additional X.509 extensions.
#[derive(Clone, Debug, Builder)]
pub struct CertificationRequestInfo {
    pub subject: DistinguishedName,
    pub subject_public_key: PublicKey,
    #[builder(default)]
    pub usages: Vec<ExtendedKeyUsageOption>,
    #[builder(default)]
    pub is_ca: bool,
    pub max_path_length: Option<u8>,
    #[builder(default)]
    pub subject_alt_names: Vec<SanEntry>,
    #[builder(default)]
    pub extensions: Vec<ExtensionParam>,
}

/// Subject or issuer name: country, organization and common name, encoded
/// as three RDNs in that order.
///
/// ```
/// use segkit::cert::params::DistinguishedName;
///
/// let name = DistinguishedName::builder().common_name("SEG-Sender").organization("Ministry1").build();
/// assert_eq!(name.country, "BD");
/// assert_eq!(name.to_string(), "C=BD, O=Ministry1, CN=SEG-Sender");
/// ```
#[derive(Clone, Debug, Builder, Default, PartialEq, Eq)]
pub struct DistinguishedName {
    #[builder(into, default = String::from(DEFAULT_COUNTRY))]
    pub country: String,
    #[builder(into, default = String::from(DEFAULT_ORGANIZATION))]
    pub organization: String,
    #[builder(into)]
    pub common_name: String,
}

impl DistinguishedName {
    /// Builds a name with the default country.
    pub fn new(common_name: impl Into<String>, organization: impl Into<String>) -> Self {
        Self {
            country: DEFAULT_COUNTRY.to_string(),
            organization: organization.into(),
            common_name: common_name.into(),
        }
    }

    /// Converts the distinguished name to an X.509-compatible format.
    ///
    /// The country is a PrintableString and must be two letters; organization
    /// and common name are UTF8Strings.
    pub fn as_x509_name(&self) -> Result<x509_cert::name::Name> {
        if self.country.len() != 2 || !self.country.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(SegError::InvalidInput(format!(
                "country must be a two-letter code, got {:?}",
                self.country
            )));
        }
        PrintableStringRef::new(&self.country)?;

        Ok(RdnSequence(vec![
            rdn(COUNTRY_NAME, Tag::PrintableString, &self.country)?,
            rdn(ORGANIZATION_NAME, Tag::Utf8String, &self.organization)?,
            rdn(COMMON_NAME, Tag::Utf8String, &self.common_name)?,
        ]))
    }

    /// Reads country, organization and common name back out of an X.509 name.
    /// Attributes this type does not model are ignored.
    pub fn from_x509_name(x509dn: &x509_cert::name::Name) -> Result<Self> {
        let mut name = DistinguishedName::default();
        for rdn in x509dn.0.iter() {
            for attr in rdn.0.iter() {
                let slot = match attr.oid {
                    COUNTRY_NAME => &mut name.country,
                    ORGANIZATION_NAME => &mut name.organization,
                    COMMON_NAME => &mut name.common_name,
                    _ => continue,
                };
                *slot = std::str::from_utf8(attr.value.value())
                    .map_err(|e| SegError::DecodingError(format!("name attribute {}: {e}", attr.oid)))?
                    .to_string();
            }
        }
        Ok(name)
    }
}

fn rdn(oid: ObjectIdentifier, tag: Tag, value: &str) -> Result<RelativeDistinguishedName> {
    let attribute = AttributeTypeAndValue {
        oid,
        value: Any::new(tag, value.as_bytes())?,
    };
    Ok(RelativeDistinguishedName(SetOfVec::try_from(vec![attribute])?))
}

impl fmt::Display for DistinguishedName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "C={}, O={}, CN={}",
            self.country, self.organization, self.common_name
        )
    }
}

/// Certificate validity period.
///
/// This struct represents the `notBefore` and `notAfter` fields in a certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Validity {
    pub not_before: OffsetDateTime,
    pub not_after: OffsetDateTime,
}

impl Validity {
    /// Creates a validity period starting now for the given number of days.
    ///
    /// Fails with `InvalidInput` when the end date is not representable.
    pub fn for_days(days: i64) -> Result<Self> {
        let now = OffsetDateTime::now_utc();
        let not_after = days
            .checked_mul(86_400)
            .and_then(|secs| now.checked_add(Duration::seconds(secs)))
            .ok_or_else(|| {
                SegError::InvalidInput(format!("validity of {days} days is out of range"))
            })?;
        Ok(Self {
            not_before: now,
            not_after,
        })
    }

    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.not_before <= at && at <= self.not_after
    }
}

/// Represents an X.509 extension.
///
/// # Fields
/// * `oid` - The object identifier of the extension.
/// * `critical` - Indicates if the extension is critical.
/// * `value` - The DER-encoded value of the extension.
#[derive(Clone, Debug)]
pub struct ExtensionParam {
    pub oid: ObjectIdentifier,
    pub critical: bool,
    /// DER-encoded extension value
    pub value: Vec<u8>,
}

impl ExtensionParam {
    /// Creates an `ExtensionParam` from a specific extension.
    pub fn from_extension<E: ToAndFromX509Extension>(extension: E, critical: bool) -> Result<Self> {
        let value = extension.to_x509_extension_value()?;
        Ok(Self {
            oid: E::OID,
            critical,
            value,
        })
    }

    /// Decodes an `ExtensionParam` into a specific extension.
    pub fn to_extension<E: ToAndFromX509Extension>(&self) -> Result<E> {
        E::from_x509_extension_value(&self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use der::Encode;

    #[test]
    fn name_round_trips_through_x509() {
        let name = DistinguishedName::new("RootCA", "GovRootCA");
        let x509 = name.as_x509_name().unwrap();
        assert_eq!(x509.0.len(), 3);
        assert_eq!(DistinguishedName::from_x509_name(&x509).unwrap(), name);
    }

    #[test]
    fn rdn_order_is_country_organization_common_name() {
        let x509 = DistinguishedName::new("SEG-Receiver", "Ministry2")
            .as_x509_name()
            .unwrap();
        let oids: Vec<_> = x509.0.iter().map(|rdn| rdn.0.as_slice()[0].oid).collect();
        assert_eq!(oids, vec![COUNTRY_NAME, ORGANIZATION_NAME, COMMON_NAME]);
        assert!(x509.to_der().is_ok());
    }

    #[test]
    fn country_must_be_two_letters() {
        let name = DistinguishedName::builder()
            .common_name("x")
            .country("Bangladesh")
            .build();
        assert!(matches!(name.as_x509_name(), Err(SegError::InvalidInput(_))));
    }

    #[test]
    fn validity_contains_its_bounds() {
        let validity = Validity::for_days(1).unwrap();
        assert!(validity.contains(validity.not_before));
        assert!(validity.contains(validity.not_after));
        assert!(!validity.contains(validity.not_after + Duration::seconds(1)));
    }

    #[test]
    fn validity_past_year_9999_is_invalid_input() {
        assert!(matches!(
            Validity::for_days(5_000_000),
            Err(SegError::InvalidInput(_))
        ));
        assert!(Validity::for_days(i64::MAX).is_err());
    }
}
