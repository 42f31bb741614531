//! Directory of PEM artifacts: `<dir>/<name>.pem` for certificates and
//! `<dir>/<name>.key` for private keys.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::cert::{Certificate, CertificateWithPrivateKey};
use crate::channel::{TrustAnchor, TrustContext};
use crate::error::{Result, SegError};
use crate::key::KeyPair;
use crate::pem_utils::{self, KeyStoragePolicy};

pub const CERTIFICATE_EXTENSION: &str = "pem";
pub const KEY_EXTENSION: &str = "key";

#[derive(Debug, Clone)]
pub struct CertStore {
    dir: PathBuf,
}

impl CertStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn certificate_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{CERTIFICATE_EXTENSION}"))
    }

    pub fn key_path(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.{KEY_EXTENSION}"))
    }

    /// Writes both artifacts of an identity, creating the directory if needed.
    ///
    /// On unix the key file is restricted to the owner.
    pub fn write_identity(
        &self,
        name: &str,
        identity: &CertificateWithPrivateKey,
        policy: &KeyStoragePolicy,
    ) -> Result<()> {
        fs::create_dir_all(&self.dir)?;

        let cert_path = self.certificate_path(name);
        fs::write(&cert_path, pem_utils::encode_certificate(&identity.cert)?)?;

        let key_path = self.key_path(name);
        fs::write(&key_path, pem_utils::encode_private_key(&identity.key, policy)?)?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&key_path, fs::Permissions::from_mode(0o600))?;
        }

        debug!(cert = %cert_path.display(), key = %key_path.display(), "wrote identity");
        Ok(())
    }

    pub fn load_certificate(&self, name: &str) -> Result<Certificate> {
        let path = self.certificate_path(name);
        let text = read_artifact(&path)?;
        pem_utils::decode_certificate(&text)
    }

    pub fn load_key(&self, name: &str, policy: &KeyStoragePolicy) -> Result<KeyPair> {
        let path = self.key_path(name);
        let text = read_artifact(&path)?;
        pem_utils::decode_private_key(&text, policy)
    }

    pub fn load_identity(
        &self,
        name: &str,
        policy: &KeyStoragePolicy,
    ) -> Result<CertificateWithPrivateKey> {
        Ok(CertificateWithPrivateKey {
            cert: self.load_certificate(name)?,
            key: self.load_key(name, policy)?,
        })
    }

    /// Loads `identity` and the `anchor` root into a ready-to-use trust context.
    pub fn load_trust_context(
        &self,
        identity: &str,
        anchor: &str,
        policy: &KeyStoragePolicy,
    ) -> Result<TrustContext> {
        let anchor = TrustAnchor::new(self.load_certificate(anchor)?)?;
        let identity = self.load_identity(identity, policy)?;
        TrustContext::new(identity.cert, identity.key, anchor)
    }
}

fn read_artifact(path: &Path) -> Result<String> {
    fs::read_to_string(path).map_err(|e| SegError::Io(format!("{}: {e}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::params::DistinguishedName;
    use crate::issuer::{LEAF_VALIDITY_DAYS, ROOT_VALIDITY_DAYS, issue_leaf, issue_root};

    #[test]
    fn identity_round_trips_through_directory() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path().join("certs"));
        let root =
            issue_root(&DistinguishedName::new("RootCA", "GovRootCA"), ROOT_VALIDITY_DAYS).unwrap();

        store
            .write_identity("rootCA", &root, &KeyStoragePolicy::Unencrypted)
            .unwrap();

        assert!(store.certificate_path("rootCA").ends_with("certs/rootCA.pem"));
        assert_eq!(store.load_certificate("rootCA").unwrap(), root.cert);
        let key = store
            .load_key("rootCA", &KeyStoragePolicy::Unencrypted)
            .unwrap();
        assert_eq!(key.public_key(), root.key.public_key());
    }

    #[cfg(unix)]
    #[test]
    fn key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        let root = issue_root(&DistinguishedName::new("RootCA", "GovRootCA"), 1).unwrap();
        store
            .write_identity("rootCA", &root, &KeyStoragePolicy::Unencrypted)
            .unwrap();
        let mode = fs::metadata(store.key_path("rootCA")).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn missing_artifact_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        assert!(matches!(store.load_certificate("nope"), Err(SegError::Io(_))));
    }

    #[test]
    fn trust_context_loads_leaf_and_anchor() {
        let dir = tempfile::tempdir().unwrap();
        let store = CertStore::new(dir.path());
        let policy = KeyStoragePolicy::Encrypted {
            passphrase: "pw".to_string(),
        };
        let root = issue_root(&DistinguishedName::new("RootCA", "GovRootCA"), 30).unwrap();
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], LEAF_VALIDITY_DAYS)
            .unwrap();
        store.write_identity("rootCA", &root, &policy).unwrap();
        store.write_identity("seg_sender", &leaf, &policy).unwrap();

        let context = store
            .load_trust_context("seg_sender", "rootCA", &policy)
            .unwrap();
        assert_eq!(context.identity(), &leaf.cert);
        assert_eq!(context.anchor().certificate(), &root.cert);
    }
}
