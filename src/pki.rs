//! One-shot provisioning of a root and its leaf identities.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cert::CertificateWithPrivateKey;
use crate::config::ProvisioningConfig;
use crate::error::{Result, SegError};
use crate::issuer::{issue_leaf, issue_root};
use crate::store::CertStore;

/// Everything produced by one [`provision`] run.
#[derive(Debug)]
pub struct ProvisionedSet {
    pub root: CertificateWithPrivateKey,
    /// Leaf identities keyed by artifact name, in configuration order.
    pub identities: Vec<(String, CertificateWithPrivateKey)>,
    pub store: CertStore,
}

impl ProvisionedSet {
    pub fn identity(&self, name: &str) -> Option<&CertificateWithPrivateKey> {
        self.identities
            .iter()
            .find(|(artifact, _)| artifact == name)
            .map(|(_, identity)| identity)
    }
}

/// Issues the root and every configured identity and persists them.
///
/// All artifacts are written into a staging directory next to
/// `config.output_dir` and moved into place only once every file is on disk;
/// a failed run leaves the output directory untouched. An existing output
/// directory is replaced only when `config.overwrite` is set.
pub fn provision(config: &ProvisioningConfig) -> Result<ProvisionedSet> {
    config.validate()?;

    let target = config.output_dir.as_path();
    if target.exists() && !config.overwrite {
        return Err(SegError::Provisioning(format!(
            "{} already exists; set overwrite to replace it",
            target.display()
        )));
    }

    let root = issue_root(&config.root.distinguished_name(), config.root.validity_days)?;
    let identities = config
        .identities
        .iter()
        .map(|identity| {
            let issued = issue_leaf(
                &identity.common_name,
                &identity.organization,
                &root,
                &identity.subject_alt_names,
                identity.validity_days,
            )?;
            Ok((identity.artifact_name.clone(), issued))
        })
        .collect::<Result<Vec<_>>>()?;

    let parent = staging_parent(target)?;
    let staging = tempfile::Builder::new()
        .prefix(".segkit-staging-")
        .tempdir_in(&parent)?;
    let policy = config.key_storage_policy();
    let staged = CertStore::new(staging.path());
    staged.write_identity(&config.root.artifact_name, &root, &policy)?;
    for (name, identity) in &identities {
        staged.write_identity(name, identity, &policy)?;
    }

    let replaced = target.exists();
    if replaced {
        warn!(dir = %target.display(), "replacing existing output directory");
        fs::remove_dir_all(target)?;
    }
    move_into_place(staging.keep(), target, replaced)?;

    info!(
        dir = %target.display(),
        identities = identities.len(),
        "provisioned trust material"
    );
    Ok(ProvisionedSet {
        root,
        identities,
        store: CertStore::new(target),
    })
}

/// Renames the staged directory onto `target`.
///
/// Once an old directory has been removed the staged copy is the only set of
/// artifacts left, so a failed rename keeps it and reports where it is.
fn move_into_place(staged: PathBuf, target: &Path, replaced: bool) -> Result<()> {
    let Err(e) = fs::rename(&staged, target) else {
        return Ok(());
    };
    if replaced {
        return Err(SegError::Provisioning(format!(
            "removed {} but could not move the new artifacts into place ({e}); they remain in {}",
            target.display(),
            staged.display()
        )));
    }
    let _ = fs::remove_dir_all(&staged);
    Err(SegError::Provisioning(format!(
        "cannot move artifacts into {}: {e}",
        target.display()
    )))
}

fn staging_parent(target: &Path) -> Result<PathBuf> {
    let parent = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&parent)?;
    Ok(parent)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{IdentityConfig, RootConfig};
    use crate::pem_utils::KeyStoragePolicy;

    fn small_config(output_dir: &Path) -> ProvisioningConfig {
        ProvisioningConfig::builder()
            .output_dir(output_dir.to_path_buf())
            .root(RootConfig::builder().validity_days(10).build())
            .identities(vec![
                IdentityConfig::builder()
                    .artifact_name("node")
                    .common_name("Node")
                    .organization("Lab")
                    .subject_alt_names(vec!["localhost".to_string()])
                    .validity_days(5)
                    .build(),
            ])
            .build()
    }

    #[test]
    fn writes_root_and_identity_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("certs");
        let set = provision(&small_config(&out)).unwrap();

        for file in ["rootCA.pem", "rootCA.key", "node.pem", "node.key"] {
            assert!(out.join(file).is_file(), "{file} missing");
        }
        let loaded = set.store.load_certificate("node").unwrap();
        assert_eq!(&loaded, &set.identity("node").unwrap().cert);
        assert!(loaded.verify_signed_by(&set.root.key.public_key()).is_ok());
        assert!(
            set.store
                .load_key("rootCA", &KeyStoragePolicy::Unencrypted)
                .is_ok()
        );
    }

    #[test]
    fn existing_directory_is_kept_without_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("certs");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("marker"), b"keep").unwrap();

        let err = provision(&small_config(&out)).unwrap_err();
        assert!(matches!(err, SegError::Provisioning(_)));
        assert_eq!(fs::read(out.join("marker")).unwrap(), b"keep");
        assert!(!out.join("rootCA.pem").exists());
    }

    #[test]
    fn overwrite_replaces_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("certs");
        fs::create_dir_all(&out).unwrap();
        fs::write(out.join("marker"), b"stale").unwrap();

        let mut config = small_config(&out);
        config.overwrite = true;
        provision(&config).unwrap();
        assert!(!out.join("marker").exists());
        assert!(out.join("rootCA.pem").is_file());
    }

    #[test]
    fn no_staging_directories_are_left_behind() {
        let dir = tempfile::tempdir().unwrap();
        provision(&small_config(&dir.path().join("certs"))).unwrap();
        let leftovers: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().starts_with(".segkit-staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected_before_issuance() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(&dir.path().join("certs"));
        config.identities[0].artifact_name = "rootCA".to_string();
        assert!(matches!(provision(&config), Err(SegError::Config(_))));
        assert!(!dir.path().join("certs").exists());
    }

    #[test]
    fn failed_swap_after_removal_keeps_staged_artifacts() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        fs::write(staged.join("rootCA.pem"), b"new").unwrap();
        // A non-empty directory cannot be the target of a rename.
        let target = dir.path().join("certs");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("blocker"), b"x").unwrap();

        let message = match move_into_place(staged.clone(), &target, true) {
            Err(SegError::Provisioning(message)) => message,
            other => panic!("unexpected result {other:?}"),
        };
        assert!(message.contains(&staged.display().to_string()));
        assert_eq!(fs::read(staged.join("rootCA.pem")).unwrap(), b"new");
    }

    #[test]
    fn failed_swap_without_removal_cleans_up() {
        let dir = tempfile::tempdir().unwrap();
        let staged = dir.path().join("staged");
        fs::create_dir_all(&staged).unwrap();
        let target = dir.path().join("certs");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("blocker"), b"x").unwrap();

        assert!(move_into_place(staged.clone(), &target, false).is_err());
        assert!(!staged.exists());
    }

    #[test]
    fn out_of_range_validity_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config(&dir.path().join("certs"));
        config.root.validity_days = 5_000_000;
        assert!(provision(&config).is_err());
        assert!(!dir.path().join("certs").exists());
    }
}
