//! Provisioning and exchange settings.
//!
//! Both structures deserialize from TOML with every field optional; the
//! defaults reproduce the two-ministry demo layout under `./certs`.

use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use bon::Builder;
use serde::Deserialize;

use crate::cert::params::{DEFAULT_COUNTRY, DistinguishedName, Validity};
use crate::error::{Result, SegError};
use crate::issuer::{LEAF_VALIDITY_DAYS, ROOT_VALIDITY_DAYS};
use crate::pem_utils::KeyStoragePolicy;

pub const ROOT_ARTIFACT_NAME: &str = "rootCA";
pub const SENDER_ARTIFACT_NAME: &str = "seg_sender";
pub const RECEIVER_ARTIFACT_NAME: &str = "seg_receiver";

/// One provisioning run: a root plus the identities it signs.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct ProvisioningConfig {
    #[serde(default = "default_cert_dir")]
    #[builder(default = default_cert_dir())]
    pub output_dir: PathBuf,
    /// Replace an existing output directory instead of failing.
    #[serde(default)]
    #[builder(default)]
    pub overwrite: bool,
    #[serde(default)]
    #[builder(default)]
    pub root: RootConfig,
    #[serde(default = "default_identities")]
    #[builder(default = default_identities())]
    pub identities: Vec<IdentityConfig>,
    /// Encrypt private keys at rest with this passphrase.
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Builder)]
pub struct RootConfig {
    #[serde(default = "default_root_artifact")]
    #[builder(into, default = default_root_artifact())]
    pub artifact_name: String,
    #[serde(default = "default_root_common_name")]
    #[builder(into, default = default_root_common_name())]
    pub common_name: String,
    #[serde(default = "default_root_organization")]
    #[builder(into, default = default_root_organization())]
    pub organization: String,
    #[serde(default = "default_country")]
    #[builder(into, default = default_country())]
    pub country: String,
    #[serde(default = "default_root_validity_days")]
    #[builder(default = default_root_validity_days())]
    pub validity_days: i64,
}

/// A leaf identity issued under the root.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct IdentityConfig {
    /// File stem of `<name>.pem` / `<name>.key`.
    #[builder(into)]
    pub artifact_name: String,
    #[builder(into)]
    pub common_name: String,
    #[builder(into)]
    pub organization: String,
    #[serde(default)]
    #[builder(default)]
    pub subject_alt_names: Vec<String>,
    #[serde(default = "default_leaf_validity_days")]
    #[builder(default = default_leaf_validity_days())]
    pub validity_days: i64,
}

/// Settings shared by the sending and receiving side of an exchange.
#[derive(Debug, Clone, Deserialize, Builder)]
pub struct ExchangeConfig {
    #[serde(default = "default_cert_dir")]
    #[builder(default = default_cert_dir())]
    pub cert_dir: PathBuf,
    #[serde(default = "default_listen_addr")]
    #[builder(default = default_listen_addr())]
    pub address: SocketAddr,
    /// Name the sender expects in the receiver's certificate.
    #[serde(default = "default_server_name")]
    #[builder(into, default = default_server_name())]
    pub server_name: String,
    #[serde(default = "default_root_artifact")]
    #[builder(into, default = default_root_artifact())]
    pub trust_anchor: String,
    #[serde(default = "default_sender_artifact")]
    #[builder(into, default = default_sender_artifact())]
    pub sender_identity: String,
    #[serde(default = "default_receiver_artifact")]
    #[builder(into, default = default_receiver_artifact())]
    pub receiver_identity: String,
    #[serde(default = "default_document_part")]
    #[builder(into, default = default_document_part())]
    pub document_part: String,
    #[serde(default = "default_document_content_type")]
    #[builder(into, default = default_document_content_type())]
    pub document_content_type: String,
    #[serde(default = "default_signature_part")]
    #[builder(into, default = default_signature_part())]
    pub signature_part: String,
    #[serde(default = "default_signature_content_type")]
    #[builder(into, default = default_signature_content_type())]
    pub signature_content_type: String,
    /// Upper bound on a single request part.
    #[serde(default = "default_max_part_bytes")]
    #[builder(default = default_max_part_bytes())]
    pub max_part_bytes: u32,
    /// Where the receiver writes accepted documents.
    #[serde(default = "default_received_document")]
    #[builder(default = default_received_document())]
    pub received_document: PathBuf,
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for RootConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl ProvisioningConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SegError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn key_storage_policy(&self) -> KeyStoragePolicy {
        KeyStoragePolicy::from_passphrase(self.key_passphrase.clone())
    }

    /// Rejects configurations that would produce clashing or unusable artifacts.
    pub fn validate(&self) -> Result<()> {
        let mut names = vec![self.root.artifact_name.as_str()];
        for identity in &self.identities {
            if names.contains(&identity.artifact_name.as_str()) {
                return Err(SegError::Config(format!(
                    "artifact name {:?} is used twice",
                    identity.artifact_name
                )));
            }
            names.push(&identity.artifact_name);
        }
        for name in names {
            if name.is_empty() || name.contains(['/', '\\']) || name.starts_with('.') {
                return Err(SegError::Config(format!("invalid artifact name {name:?}")));
            }
        }
        let days = std::iter::once(self.root.validity_days)
            .chain(self.identities.iter().map(|i| i.validity_days));
        for validity_days in days {
            if validity_days <= 0 {
                return Err(SegError::Config(format!(
                    "validity must be positive, got {validity_days} days"
                )));
            }
            if Validity::for_days(validity_days).is_err() {
                return Err(SegError::Config(format!(
                    "validity of {validity_days} days ends past the last encodable date"
                )));
            }
        }
        Ok(())
    }
}

impl RootConfig {
    pub fn distinguished_name(&self) -> DistinguishedName {
        DistinguishedName::builder()
            .country(self.country.clone())
            .organization(self.organization.clone())
            .common_name(self.common_name.clone())
            .build()
    }
}

impl ExchangeConfig {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .map_err(|e| SegError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&text)
    }

    pub fn key_storage_policy(&self) -> KeyStoragePolicy {
        KeyStoragePolicy::from_passphrase(self.key_passphrase.clone())
    }
}

fn default_cert_dir() -> PathBuf {
    PathBuf::from("certs")
}

fn default_root_artifact() -> String {
    ROOT_ARTIFACT_NAME.to_string()
}

fn default_sender_artifact() -> String {
    SENDER_ARTIFACT_NAME.to_string()
}

fn default_receiver_artifact() -> String {
    RECEIVER_ARTIFACT_NAME.to_string()
}

fn default_root_common_name() -> String {
    "RootCA".to_string()
}

fn default_root_organization() -> String {
    "GovRootCA".to_string()
}

fn default_country() -> String {
    DEFAULT_COUNTRY.to_string()
}

fn default_root_validity_days() -> i64 {
    ROOT_VALIDITY_DAYS
}

fn default_leaf_validity_days() -> i64 {
    LEAF_VALIDITY_DAYS
}

fn default_identities() -> Vec<IdentityConfig> {
    vec![
        IdentityConfig::builder()
            .artifact_name(SENDER_ARTIFACT_NAME)
            .common_name("SEG-Sender")
            .organization("Ministry1")
            .subject_alt_names(vec!["localhost".to_string()])
            .build(),
        IdentityConfig::builder()
            .artifact_name(RECEIVER_ARTIFACT_NAME)
            .common_name("SEG-Receiver")
            .organization("Ministry2")
            .subject_alt_names(vec!["127.0.0.1".to_string(), "localhost".to_string()])
            .build(),
    ]
}

fn default_listen_addr() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8443))
}

fn default_server_name() -> String {
    "127.0.0.1".to_string()
}

fn default_document_part() -> String {
    "xml_file".to_string()
}

fn default_document_content_type() -> String {
    "application/xml".to_string()
}

fn default_signature_part() -> String {
    "signature".to_string()
}

fn default_signature_content_type() -> String {
    "application/octet-stream".to_string()
}

fn default_max_part_bytes() -> u32 {
    16 * 1024 * 1024
}

fn default_received_document() -> PathBuf {
    PathBuf::from("received_document.xml")
}
