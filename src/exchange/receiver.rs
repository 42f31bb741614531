use std::fs;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::wire::{self, ExchangeRequest, ExchangeResponse, PartLayout};
use crate::cert::Certificate;
use crate::channel::{ChannelAcceptor, TrustContext};
use crate::config::ExchangeConfig;
use crate::error::{Result, SegError};
use crate::signature;
use crate::store::CertStore;

/// Pause after a failed `accept` so persistent errors such as EMFILE do not
/// spin the loop.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Destination of documents whose signature verified.
///
/// `store` may block; the receiver calls it on the blocking thread pool.
pub trait DocumentSink: Send + Sync {
    fn store(&self, document: &[u8]) -> Result<()>;
}

/// Writes each accepted document to a fixed path, replacing the previous one.
///
/// The file is written to a temporary sibling and renamed into place, so a
/// reader never observes a partially written document.
#[derive(Debug, Clone)]
pub struct FileSink {
    path: PathBuf,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DocumentSink for FileSink {
    fn store(&self, document: &[u8]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        std::io::Write::write_all(&mut staged, document)?;
        staged
            .persist(&self.path)
            .map_err(|e| SegError::Io(format!("{}: {}", self.path.display(), e.error)))?;
        Ok(())
    }
}

/// The receiving end of a document exchange.
///
/// Each session must pass the channel gate before its request is read; the
/// detached signature is then checked against the sender's published
/// certificate, independently of the certificate used on the channel.
pub struct Receiver {
    acceptor: ChannelAcceptor,
    sender_certificate: Certificate,
    sink: Arc<dyn DocumentSink>,
    layout: PartLayout,
}

impl Receiver {
    pub fn new(
        context: Arc<TrustContext>,
        sender_certificate: Certificate,
        sink: Arc<dyn DocumentSink>,
    ) -> Result<Self> {
        Ok(Self {
            acceptor: ChannelAcceptor::new(context)?,
            sender_certificate,
            sink,
            layout: PartLayout::default(),
        })
    }

    pub fn with_layout(mut self, layout: PartLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Loads trust material from `config.cert_dir` and stores accepted
    /// documents at `config.received_document`.
    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        let store = CertStore::new(&config.cert_dir);
        let policy = config.key_storage_policy();
        let context = store.load_trust_context(
            &config.receiver_identity,
            &config.trust_anchor,
            &policy,
        )?;
        let sender_certificate = store.load_certificate(&config.sender_identity)?;
        let sink = Arc::new(FileSink::new(&config.received_document));
        Ok(Self::new(Arc::new(context), sender_certificate, sink)?.with_layout(config.into()))
    }

    /// Verifies a request and, if the signature holds, hands the document to
    /// the sink.
    pub async fn evaluate(&self, request: &ExchangeRequest) -> ExchangeResponse {
        let Some(document) = request.part(&self.layout.document_part) else {
            return self.reject(format!("missing part {:?}", self.layout.document_part));
        };
        let Some(signature) = request.part(&self.layout.signature_part) else {
            return self.reject(format!("missing part {:?}", self.layout.signature_part));
        };

        if let Err(e) = signature::verify_with_certificate(
            &self.sender_certificate,
            &document.body,
            &signature.body,
        ) {
            return self.reject(e);
        }

        let sink = Arc::clone(&self.sink);
        let body = document.body.clone();
        let stored = tokio::task::spawn_blocking(move || sink.store(&body))
            .await
            .unwrap_or_else(|e| Err(SegError::Io(format!("document sink task failed: {e}"))));
        match stored {
            Ok(()) => {
                info!(bytes = document.body.len(), "signature verified, document accepted");
                ExchangeResponse::accepted()
            }
            Err(e) => {
                error!(error = %e, "verified document could not be stored");
                ExchangeResponse::storage_failed(e)
            }
        }
    }

    fn reject(&self, detail: impl std::fmt::Display) -> ExchangeResponse {
        warn!(signature_rejected = true, %detail, "document rejected");
        ExchangeResponse::rejected(detail)
    }

    /// Runs one session on `io`: channel gate, request, verdict, response.
    ///
    /// Returns the response that was sent. A rejected handshake returns
    /// [`SegError::ChannelAuthFailure`] without reading any application data.
    pub async fn handle<IO>(&self, io: IO) -> Result<ExchangeResponse>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = self.acceptor.accept(io).await?;
        let stream = session.stream_mut();

        let response = match wire::read_request(stream, self.layout.max_part_bytes).await {
            Ok(request) => self.evaluate(&request).await,
            Err(SegError::DecodingError(detail)) => self.reject(format!("malformed request: {detail}")),
            Err(e) => return Err(e),
        };

        wire::write_response(stream, &response).await?;
        if let Err(e) = stream.shutdown().await {
            debug!(error = %e, "session shutdown");
        }
        Ok(response)
    }

    /// Accepts connections until `shutdown` resolves, one task per session.
    pub async fn serve<F>(self: Arc<Self>, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "receiver listening");
        }
        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("receiver shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (socket, addr) = match accepted {
                        Ok(accepted) => accepted,
                        Err(e) => {
                            warn!(error = %e, "accept failed");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let receiver = Arc::clone(&self);
                    tokio::spawn(async move {
                        match receiver.handle(socket).await {
                            Ok(response) => debug!(%addr, status = response.status, "session complete"),
                            Err(e) => debug!(%addr, error = %e, "session ended without a response"),
                        }
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_sink_replaces_previous_document() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("inbox").join("received_document.xml");
        let sink = FileSink::new(&path);
        sink.store(b"<first/>").unwrap();
        sink.store(b"<second/>").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"<second/>");
        assert_eq!(fs::read_dir(path.parent().unwrap()).unwrap().count(), 1);
    }
}
