//! # segkit - Private PKI and Signed Document Exchange
//!
//! segkit provisions a small private PKI (one root, a handful of leaf
//! identities) and uses it to move a document from a sender to a receiver over
//! a mutually-authenticated TLS session, with a detached RSA signature that
//! proves integrity and origin independently of the transport.
//!
//! ## Building Blocks
//!
//! - **Keys**: RSA 2048, e = 65537
//! - **Certificates**: X.509 v3, `sha256WithRSAEncryption`, basic constraints,
//!   key usage, extended key usage, key identifiers and subject alternative names
//! - **Signatures**: RSASSA-PKCS1-v1_5 over SHA-256, deterministic
//! - **Channel**: TLS 1.2/1.3 via rustls with mandatory client authentication
//!   and a depth-1 check against a single trust anchor
//!
//! ## Quick Start
//!
//! ### Issuing a Root and a Leaf
//!
//! ```rust,no_run
//! use segkit::cert::params::DistinguishedName;
//! use segkit::issuer::{issue_leaf, issue_root};
//!
//! # fn main() -> Result<(), segkit::error::SegError> {
//! let root = issue_root(&DistinguishedName::new("RootCA", "GovRootCA"), 3650)?;
//! let sender = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 825)?;
//!
//! assert!(sender.cert.verify_signed_by(&root.key.public_key()).is_ok());
//! println!("{}", sender.cert.to_pem()?);
//! # Ok(())
//! # }
//! ```
//!
//! ### Signing and Verifying a Document
//!
//! ```rust,no_run
//! use segkit::cert::params::DistinguishedName;
//! use segkit::issuer::{issue_leaf, issue_root};
//! use segkit::signature;
//!
//! # fn main() -> Result<(), segkit::error::SegError> {
//! # let root = issue_root(&DistinguishedName::new("RootCA", "GovRootCA"), 3650)?;
//! # let sender = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 825)?;
//! let document = b"<doc>42</doc>";
//! let sig = signature::sign(&sender.key, document)?;
//! signature::verify_with_certificate(&sender.cert, document, &sig)?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Provisioning to Disk
//!
//! ```rust,no_run
//! use segkit::config::ProvisioningConfig;
//!
//! # fn main() -> Result<(), segkit::error::SegError> {
//! // certs/rootCA.{pem,key}, certs/seg_sender.{pem,key}, certs/seg_receiver.{pem,key}
//! let set = segkit::pki::provision(&ProvisioningConfig::default())?;
//! println!("issued {} identities", set.identities.len());
//! # Ok(())
//! # }
//! ```
//!
//! ## Error Handling
//!
//! Every fallible operation returns [`error::SegError`]. Transport rejections
//! and signature rejections are separate variants:
//!
//! ```rust
//! use segkit::error::{SegError, VerificationError};
//!
//! fn describe(err: &SegError) -> &'static str {
//!     match err {
//!         SegError::ChannelAuthFailure(_) => "peer not trusted",
//!         SegError::Verification(VerificationError::SignatureMismatch) => "document altered",
//!         SegError::Verification(_) => "signature unusable",
//!         _ => "other",
//!     }
//! }
//! # assert_eq!(describe(&SegError::ChannelAuthFailure(String::new())), "peer not trusted");
//! ```
//!
//! ## Module Organization
//!
//! - [`key`]: RSA key generation, import and export
//! - [`cert`]: Certificate encoding, decoding and inspection
//! - [`issuer`]: Root and leaf issuance
//! - [`tbs_certificate`]: Low-level certificate structure assembly
//! - [`pem_utils`]: PEM envelopes and key storage policies
//! - [`signature`]: Detached document signatures
//! - [`channel`]: Trust anchor, trust context and mutual-TLS sessions
//! - [`exchange`]: Sender and receiver of signed documents
//! - [`store`]: On-disk certificate and key layout
//! - [`pki`]: Atomic provisioning runs
//! - [`config`]: TOML-backed settings
//! - [`error`]: Error types

pub mod cert;
pub mod channel;
pub mod config;
pub mod error;
pub mod exchange;
pub mod issuer;
pub mod key;
pub mod pem_utils;
pub mod pki;
pub mod signature;
pub mod store;
pub mod tbs_certificate;
