//! use segkit::error::SegError;

use thiserror::Error;

/// Represents errors that can occur while provisioning trust material or
/// exchanging signed documents.
///
/// Transport-level rejections ([`SegError::ChannelAuthFailure`]) and
/// application-level rejections ([`SegError::Verification`]) are distinct
/// variants and never collapse into one another.
#[derive(Debug, Error, Clone)]
pub enum SegError {
    /// Error during data encoding.
    #[error("Failed to encode data: {0}")]
    EncodingError(String),

    /// Error during data decoding.
    #[error("Failed to decode data: {0}")]
    DecodingError(String),

    /// Error due to invalid input.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during key generation. Fatal for a provisioning run.
    #[error("Key generation error: {0}")]
    KeyGenerationError(String),

    /// Error related to certificate operations.
    #[error("Certificate error: {0}")]
    CertificateError(String),

    /// Error from RSA operations.
    #[error("RSA error: {0}")]
    RsaError(String),

    /// Malformed or mismatched PEM/DER material.
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// The peer did not present a certificate that chains to the trust anchor.
    #[error("Channel authentication failed: {0}")]
    ChannelAuthFailure(String),

    /// Transport error after (or unrelated to) peer authentication.
    #[error("Channel error: {0}")]
    Channel(String),

    /// A detached signature did not verify.
    #[error(transparent)]
    Verification(#[from] VerificationError),

    /// Filesystem or socket error.
    #[error("I/O error: {0}")]
    Io(String),

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A provisioning run could not be completed.
    #[error("Provisioning error: {0}")]
    Provisioning(String),
}

/// Failures of the PEM/DER codec.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The text is not a well-formed PEM envelope.
    #[error("malformed PEM envelope: {0}")]
    MalformedEnvelope(String),

    /// The envelope carries a different label than the one required.
    #[error("unexpected PEM label: expected {expected}, found {found}")]
    UnexpectedLabel { expected: String, found: String },

    /// The DER body could not be decoded as the requested structure.
    #[error("malformed DER body: {0}")]
    MalformedDer(String),

    /// The key is valid but not an RSA key.
    #[error("wrong key type: {0}")]
    WrongKeyType(String),

    /// The key or certificate uses an algorithm this crate does not handle.
    #[error("unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

/// Reasons a detached signature was rejected.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum VerificationError {
    /// The signature is well-formed but does not match the payload.
    #[error("signature does not match payload")]
    SignatureMismatch,

    /// The signature bytes cannot be a signature for this key.
    #[error("malformed signature: {0}")]
    MalformedSignature(String),

    /// The verifying key is not an RSA key.
    #[error("unsupported key type: {0}")]
    UnsupportedKeyType(String),
}

pub type Result<T> = std::result::Result<T, SegError>;

impl From<der::Error> for SegError {
    /// Converts a `der::Error` into a `SegError`.
    fn from(err: der::Error) -> Self {
        SegError::DecodingError(err.to_string())
    }
}

impl From<rsa::Error> for SegError {
    fn from(err: rsa::Error) -> Self {
        SegError::RsaError(err.to_string())
    }
}

impl From<rsa::pkcs1::Error> for SegError {
    fn from(err: rsa::pkcs1::Error) -> Self {
        SegError::Codec(CodecError::MalformedDer(err.to_string()))
    }
}

impl From<pkcs8::Error> for SegError {
    fn from(err: pkcs8::Error) -> Self {
        SegError::Codec(CodecError::MalformedDer(err.to_string()))
    }
}

impl From<pkcs8::spki::Error> for SegError {
    fn from(err: pkcs8::spki::Error) -> Self {
        SegError::Codec(CodecError::MalformedDer(err.to_string()))
    }
}

impl From<pem::PemError> for SegError {
    fn from(err: pem::PemError) -> Self {
        SegError::Codec(CodecError::MalformedEnvelope(err.to_string()))
    }
}

impl From<std::io::Error> for SegError {
    fn from(err: std::io::Error) -> Self {
        SegError::Io(err.to_string())
    }
}

impl From<rustls::Error> for SegError {
    fn from(err: rustls::Error) -> Self {
        SegError::Channel(err.to_string())
    }
}

impl From<toml::de::Error> for SegError {
    fn from(err: toml::de::Error) -> Self {
        SegError::Config(err.to_string())
    }
}
