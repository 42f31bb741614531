use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::info;

use super::wire::{self, ExchangeRequest, ExchangeResponse, Part, PartLayout};
use crate::channel::{ChannelConnector, TrustContext};
use crate::config::ExchangeConfig;
use crate::error::{Result, SegError};
use crate::signature;
use crate::store::CertStore;

/// The sending end of a document exchange.
pub struct Sender {
    connector: ChannelConnector,
    context: Arc<TrustContext>,
    layout: PartLayout,
}

impl Sender {
    pub fn new(context: Arc<TrustContext>, server_name: &str) -> Result<Self> {
        Ok(Self {
            connector: ChannelConnector::new(Arc::clone(&context), server_name)?,
            context,
            layout: PartLayout::default(),
        })
    }

    pub fn with_layout(mut self, layout: PartLayout) -> Self {
        self.layout = layout;
        self
    }

    pub fn from_config(config: &ExchangeConfig) -> Result<Self> {
        let store = CertStore::new(&config.cert_dir);
        let context = store.load_trust_context(
            &config.sender_identity,
            &config.trust_anchor,
            &config.key_storage_policy(),
        )?;
        Ok(Self::new(Arc::new(context), &config.server_name)?.with_layout(config.into()))
    }

    /// Signs `document` with the sender key and pairs both into a request.
    pub fn build_request(&self, document: &[u8]) -> Result<ExchangeRequest> {
        let signature = signature::sign(self.context.key(), document)?;
        Ok(ExchangeRequest {
            parts: vec![
                Part::new(
                    self.layout.document_part.as_str(),
                    self.layout.document_content_type.as_str(),
                    document.to_vec(),
                ),
                Part::new(
                    self.layout.signature_part.as_str(),
                    self.layout.signature_content_type.as_str(),
                    signature,
                ),
            ],
        })
    }

    /// Sends an already built request over `io`.
    pub async fn send_request<IO>(&self, io: IO, request: &ExchangeRequest) -> Result<ExchangeResponse>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = self.connector.connect(io).await?;
        let stream = session.stream_mut();
        wire::write_request(stream, request).await?;
        let response = wire::read_response(stream).await?;
        info!(status = response.status, message = %response.message, "receiver responded");
        Ok(response)
    }

    /// Signs `document` and sends it over `io`.
    pub async fn send_over<IO>(&self, io: IO, document: &[u8]) -> Result<ExchangeResponse>
    where
        IO: AsyncRead + AsyncWrite + Unpin,
    {
        let request = self.build_request(document)?;
        self.send_request(io, &request).await
    }

    /// Connects to `addr` and sends `document`.
    pub async fn send(&self, addr: SocketAddr, document: &[u8]) -> Result<ExchangeResponse> {
        let socket = TcpStream::connect(addr)
            .await
            .map_err(|e| SegError::Channel(format!("connect {addr}: {e}")))?;
        self.send_over(socket, document).await
    }
}
