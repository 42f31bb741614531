#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use segkit::cert::CertificateWithPrivateKey;
use segkit::cert::extensions::{ExtendedKeyUsageOption, SanEntry};
use segkit::cert::params::{CertificationRequestInfo, DistinguishedName, Validity};
use segkit::channel::{TrustAnchor, TrustContext};
use segkit::error::{Result, SegError};
use segkit::exchange::DocumentSink;
use segkit::issuer::{Issuer, LEAF_VALIDITY_DAYS, ROOT_VALIDITY_DAYS, issue_leaf, issue_root};
use segkit::key::{KeyPair, PublicKey};
use time::{Duration, OffsetDateTime};

/// Root plus the two demo identities.
pub struct Pki {
    pub root: CertificateWithPrivateKey,
    pub sender: CertificateWithPrivateKey,
    pub receiver: CertificateWithPrivateKey,
}

pub fn generate_root(common_name: &str) -> CertificateWithPrivateKey {
    issue_root(
        &DistinguishedName::new(common_name, "GovRootCA"),
        ROOT_VALIDITY_DAYS,
    )
    .unwrap()
}

pub fn generate_pki() -> Pki {
    let root = generate_root("RootCA");
    let sender =
        issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], LEAF_VALIDITY_DAYS).unwrap();
    let receiver = issue_leaf(
        "SEG-Receiver",
        "Ministry2",
        &root,
        &["127.0.0.1", "localhost"],
        LEAF_VALIDITY_DAYS,
    )
    .unwrap();
    Pki {
        root,
        sender,
        receiver,
    }
}

/// A leaf signed by `issuer` whose validity ended yesterday.
pub fn generate_expired_leaf(issuer: &CertificateWithPrivateKey) -> CertificateWithPrivateKey {
    let key = KeyPair::generate().unwrap();
    let info = CertificationRequestInfo::builder()
        .subject(DistinguishedName::new("SEG-Sender", "Ministry1"))
        .subject_public_key(PublicKey::from_key_pair(&key))
        .usages(vec![
            ExtendedKeyUsageOption::ServerAuth,
            ExtendedKeyUsageOption::ClientAuth,
        ])
        .subject_alt_names(vec![SanEntry::classify("localhost")])
        .build();
    let now = OffsetDateTime::now_utc();
    let validity = Validity {
        not_before: now - Duration::days(30),
        not_after: now - Duration::days(1),
    };
    let cert = issuer.issue(&info, validity).unwrap();
    CertificateWithPrivateKey { cert, key }
}

pub fn trust_context(
    identity: &CertificateWithPrivateKey,
    anchor: &CertificateWithPrivateKey,
) -> Arc<TrustContext> {
    let anchor = TrustAnchor::new(anchor.cert.clone()).unwrap();
    Arc::new(TrustContext::new(identity.cert.clone(), identity.key.clone(), anchor).unwrap())
}

/// Keeps accepted documents in memory.
#[derive(Default)]
pub struct MemorySink {
    documents: Mutex<Vec<Vec<u8>>>,
}

impl MemorySink {
    pub fn documents(&self) -> Vec<Vec<u8>> {
        self.documents.lock().unwrap().clone()
    }
}

impl DocumentSink for MemorySink {
    fn store(&self, document: &[u8]) -> Result<()> {
        self.documents.lock().unwrap().push(document.to_vec());
        Ok(())
    }
}

/// Refuses every document.
pub struct FailingSink;

impl DocumentSink for FailingSink {
    fn store(&self, _document: &[u8]) -> Result<()> {
        Err(SegError::Io("disk full".to_string()))
    }
}
