//! Mutually-authenticated TLS sessions gated on a single trust anchor.
//!
//! Both ends load a [`TrustContext`] once: their own leaf certificate and key
//! plus the shared root. rustls performs the handshake with mandatory client
//! authentication, and the peer's end-entity certificate is then re-checked
//! against the anchor with a depth-1 validation before a [`Session`] is handed
//! to the caller. Any failure in either step is a
//! [`SegError::ChannelAuthFailure`].

use std::io;
use std::sync::Arc;

use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer, ServerName};
use rustls::server::WebPkiClientVerifier;
use rustls::{ClientConfig, RootCertStore, ServerConfig};
use time::OffsetDateTime;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_rustls::{TlsAcceptor, TlsConnector, client, server};
use tracing::{debug, warn};

use crate::cert::{Certificate, SignatureAlgorithm};
use crate::error::{CodecError, Result, SegError};
use crate::key::{KeyPair, PublicKey};

/// The root certificate every peer must chain to in exactly one hop.
#[derive(Debug, Clone)]
pub struct TrustAnchor {
    cert: Certificate,
    public_key: PublicKey,
}

impl TrustAnchor {
    /// Accepts `cert` as an anchor only if it is a self-signed CA.
    pub fn new(cert: Certificate) -> Result<Self> {
        if cert.signature_algorithm() != SignatureAlgorithm::Sha256WithRSA.oid() {
            return Err(CodecError::UnsupportedAlgorithm(format!(
                "trust anchor signed with {}, expected sha256WithRSAEncryption",
                cert.signature_algorithm()
            ))
            .into());
        }
        if !cert.is_ca() {
            return Err(SegError::CertificateError(
                "trust anchor is not a CA certificate".to_string(),
            ));
        }
        if !cert.is_self_issued() {
            return Err(SegError::CertificateError(
                "trust anchor is not self-issued".to_string(),
            ));
        }
        let public_key = cert.public_key()?;
        cert.verify_signed_by(&public_key).map_err(|e| {
            SegError::CertificateError(format!("trust anchor self-signature: {e}"))
        })?;
        Ok(Self { cert, public_key })
    }

    pub fn certificate(&self) -> &Certificate {
        &self.cert
    }

    /// Depth-1 validation of a peer's end-entity certificate at time `at`.
    pub fn validate_peer(&self, peer: &Certificate, at: OffsetDateTime) -> Result<()> {
        if peer.inner.tbs_certificate.issuer != self.cert.inner.tbs_certificate.subject {
            return Err(SegError::ChannelAuthFailure(format!(
                "peer issuer {} is not the trust anchor",
                describe_issuer(peer)
            )));
        }
        peer.verify_signed_by(&self.public_key).map_err(|e| {
            SegError::ChannelAuthFailure(format!("peer certificate not signed by trust anchor: {e}"))
        })?;
        if !peer.is_valid_at(at) {
            let validity = peer.validity();
            return Err(SegError::ChannelAuthFailure(format!(
                "peer certificate valid from {} to {}, evaluated at {at}",
                validity.not_before, validity.not_after
            )));
        }
        if peer.is_ca() {
            return Err(SegError::ChannelAuthFailure(
                "peer presented a CA certificate".to_string(),
            ));
        }
        Ok(())
    }

    fn root_store(&self) -> Result<RootCertStore> {
        let mut roots = RootCertStore::empty();
        roots.add(CertificateDer::from(self.cert.to_der()?))?;
        Ok(roots)
    }
}

fn describe_issuer(cert: &Certificate) -> String {
    cert.issuer()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<undecodable>".to_string())
}

/// Own identity, own key and the trust anchor, loaded once and shared
/// read-only by every session.
#[derive(Debug, Clone)]
pub struct TrustContext {
    identity: Certificate,
    key: KeyPair,
    anchor: TrustAnchor,
}

impl TrustContext {
    /// Fails if `key` is not the private half of `identity`'s public key.
    ///
    /// The identity is not required to chain to `anchor`; the remote side
    /// decides whether it trusts what is presented.
    pub fn new(identity: Certificate, key: KeyPair, anchor: TrustAnchor) -> Result<Self> {
        if identity.public_key()? != key.public_key() {
            return Err(SegError::InvalidInput(
                "private key does not match identity certificate".to_string(),
            ));
        }
        Ok(Self {
            identity,
            key,
            anchor,
        })
    }

    pub fn identity(&self) -> &Certificate {
        &self.identity
    }

    pub fn key(&self) -> &KeyPair {
        &self.key
    }

    pub fn anchor(&self) -> &TrustAnchor {
        &self.anchor
    }

    fn certificate_chain(&self) -> Result<Vec<CertificateDer<'static>>> {
        Ok(vec![CertificateDer::from(self.identity.to_der()?)])
    }

    fn private_key(&self) -> Result<PrivateKeyDer<'static>> {
        Ok(PrivateKeyDer::Pkcs8(PrivatePkcs8KeyDer::from(
            self.key.to_pkcs8_der()?,
        )))
    }

    /// Server side: presents the identity and requires a client certificate
    /// issued by the anchor.
    pub fn server_config(&self) -> Result<Arc<ServerConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let verifier = WebPkiClientVerifier::builder_with_provider(
            Arc::new(self.anchor.root_store()?),
            provider.clone(),
        )
        .build()
        .map_err(|e| SegError::Channel(format!("client verifier: {e}")))?;

        let config = ServerConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_client_cert_verifier(verifier)
            .with_single_cert(self.certificate_chain()?, self.private_key()?)?;
        Ok(Arc::new(config))
    }

    /// Client side: trusts only the anchor and authenticates with the identity.
    pub fn client_config(&self) -> Result<Arc<ClientConfig>> {
        let provider = Arc::new(rustls::crypto::ring::default_provider());
        let config = ClientConfig::builder_with_provider(provider)
            .with_safe_default_protocol_versions()?
            .with_root_certificates(self.anchor.root_store()?)
            .with_client_auth_cert(self.certificate_chain()?, self.private_key()?)?;
        Ok(Arc::new(config))
    }
}

/// An established, mutually-authenticated session.
#[derive(Debug)]
pub struct Session<S> {
    stream: S,
    peer: Certificate,
}

impl<S> Session<S> {
    /// The peer's validated end-entity certificate.
    pub fn peer(&self) -> &Certificate {
        &self.peer
    }

    pub fn stream_mut(&mut self) -> &mut S {
        &mut self.stream
    }

    pub fn into_inner(self) -> S {
        self.stream
    }
}

/// Accepts inbound sessions on behalf of the server identity.
#[derive(Clone)]
pub struct ChannelAcceptor {
    acceptor: TlsAcceptor,
    context: Arc<TrustContext>,
}

impl ChannelAcceptor {
    pub fn new(context: Arc<TrustContext>) -> Result<Self> {
        let acceptor = TlsAcceptor::from(context.server_config()?);
        Ok(Self { acceptor, context })
    }

    pub fn context(&self) -> &TrustContext {
        &self.context
    }

    /// Runs the server handshake on `io` and validates the client.
    pub async fn accept<IO>(&self, io: IO) -> Result<Session<server::TlsStream<IO>>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self
            .acceptor
            .accept(io)
            .await
            .map_err(map_tls_io_error)
            .inspect_err(log_rejection)?;
        let peer = peer_certificate(stream.get_ref().1.peer_certificates())
            .and_then(|peer| {
                self.context
                    .anchor
                    .validate_peer(&peer, OffsetDateTime::now_utc())?;
                Ok(peer)
            })
            .inspect_err(log_rejection)?;
        debug!(peer = %describe_subject(&peer), "accepted authenticated session");
        Ok(Session { stream, peer })
    }
}

/// Opens outbound sessions to a server identity.
#[derive(Clone)]
pub struct ChannelConnector {
    connector: TlsConnector,
    server_name: ServerName<'static>,
    context: Arc<TrustContext>,
}

impl ChannelConnector {
    /// `server_name` is matched against the server certificate's SANs; it may
    /// be a DNS name or an IP literal.
    pub fn new(context: Arc<TrustContext>, server_name: &str) -> Result<Self> {
        let server_name = ServerName::try_from(server_name.to_string())
            .map_err(|e| SegError::InvalidInput(format!("server name {server_name:?}: {e}")))?;
        let connector = TlsConnector::from(context.client_config()?);
        Ok(Self {
            connector,
            server_name,
            context,
        })
    }

    /// Runs the client handshake on `io` and validates the server.
    pub async fn connect<IO>(&self, io: IO) -> Result<Session<client::TlsStream<IO>>>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let stream = self
            .connector
            .connect(self.server_name.clone(), io)
            .await
            .map_err(map_tls_io_error)
            .inspect_err(log_rejection)?;
        let peer = peer_certificate(stream.get_ref().1.peer_certificates())
            .and_then(|peer| {
                self.context
                    .anchor
                    .validate_peer(&peer, OffsetDateTime::now_utc())?;
                Ok(peer)
            })
            .inspect_err(log_rejection)?;
        debug!(peer = %describe_subject(&peer), "connected authenticated session");
        Ok(Session { stream, peer })
    }
}

fn peer_certificate(chain: Option<&[CertificateDer<'_>]>) -> Result<Certificate> {
    let end_entity = chain
        .and_then(|chain| chain.first())
        .ok_or_else(|| SegError::ChannelAuthFailure("peer presented no certificate".to_string()))?;
    Certificate::from_der(end_entity.as_ref())
        .map_err(|e| SegError::ChannelAuthFailure(format!("peer certificate unreadable: {e}")))
}

fn describe_subject(cert: &Certificate) -> String {
    cert.subject()
        .map(|name| name.to_string())
        .unwrap_or_else(|_| "<undecodable>".to_string())
}

/// TLS-level failures (bad certificate, alerts from the peer) are
/// authentication failures; anything else is a plain transport error.
pub(crate) fn map_tls_io_error(err: io::Error) -> SegError {
    match err
        .get_ref()
        .and_then(|inner| inner.downcast_ref::<rustls::Error>())
    {
        Some(tls) => SegError::ChannelAuthFailure(tls.to_string()),
        None => SegError::Channel(err.to_string()),
    }
}

fn log_rejection(err: &SegError) {
    match err {
        SegError::ChannelAuthFailure(reason) => {
            warn!(channel_auth_failure = true, %reason, "peer rejected");
        }
        other => warn!(error = %other, "channel handshake failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::CertificateWithPrivateKey;
    use crate::cert::params::DistinguishedName;
    use crate::issuer::{issue_leaf, issue_root};
    use time::Duration;

    fn root(cn: &str) -> CertificateWithPrivateKey {
        issue_root(&DistinguishedName::new(cn, "GovRootCA"), 3650).unwrap()
    }

    #[test]
    fn anchor_must_be_ca() {
        let root = root("RootCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 30).unwrap();
        assert!(matches!(
            TrustAnchor::new(leaf.cert),
            Err(SegError::CertificateError(_))
        ));
        assert!(TrustAnchor::new(root.cert).is_ok());
    }

    #[test]
    fn leaf_of_anchor_is_accepted() {
        let root = root("RootCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 30).unwrap();
        let anchor = TrustAnchor::new(root.cert).unwrap();
        assert!(anchor.validate_peer(&leaf.cert, OffsetDateTime::now_utc()).is_ok());
    }

    #[test]
    fn leaf_of_unrelated_root_is_rejected() {
        let trusted = root("RootCA");
        let rogue = root("RogueCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &rogue, &["localhost"], 30).unwrap();
        let anchor = TrustAnchor::new(trusted.cert).unwrap();
        assert!(matches!(
            anchor.validate_peer(&leaf.cert, OffsetDateTime::now_utc()),
            Err(SegError::ChannelAuthFailure(_))
        ));
    }

    #[test]
    fn same_name_different_key_is_rejected() {
        let trusted = root("RootCA");
        let impostor = root("RootCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &impostor, &["localhost"], 30).unwrap();
        let anchor = TrustAnchor::new(trusted.cert).unwrap();
        let err = anchor
            .validate_peer(&leaf.cert, OffsetDateTime::now_utc())
            .unwrap_err();
        assert!(err.to_string().contains("not signed by trust anchor"));
    }

    #[test]
    fn peer_outside_validity_is_rejected() {
        let root = root("RootCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 1).unwrap();
        let anchor = TrustAnchor::new(root.cert).unwrap();
        let later = OffsetDateTime::now_utc() + Duration::days(2);
        assert!(matches!(
            anchor.validate_peer(&leaf.cert, later),
            Err(SegError::ChannelAuthFailure(_))
        ));
    }

    #[test]
    fn context_rejects_mismatched_key() {
        let root = root("RootCA");
        let leaf = issue_leaf("SEG-Sender", "Ministry1", &root, &["localhost"], 30).unwrap();
        let anchor = TrustAnchor::new(root.cert).unwrap();
        assert!(TrustContext::new(leaf.cert, root.key, anchor).is_err());
    }

    #[test]
    fn tls_errors_map_to_auth_failure() {
        let tls = io::Error::new(
            io::ErrorKind::InvalidData,
            rustls::Error::InvalidCertificate(rustls::CertificateError::UnknownIssuer),
        );
        assert!(matches!(
            map_tls_io_error(tls),
            SegError::ChannelAuthFailure(_)
        ));
        let reset = io::Error::from(io::ErrorKind::ConnectionReset);
        assert!(matches!(map_tls_io_error(reset), SegError::Channel(_)));
    }
}
