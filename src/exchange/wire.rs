//! Framing for one request and one response over an established session.
//!
//! All integers are big-endian.
//!
//! ```text
//! request  := part_count:u16 part{part_count}
//! part     := name_len:u16 name content_type_len:u16 content_type body_len:u32 body
//! response := status:u16 message_len:u32 message
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::channel::map_tls_io_error;
use crate::config::ExchangeConfig;
use crate::error::{Result, SegError};

pub const STATUS_OK: u16 = 200;
pub const STATUS_BAD_REQUEST: u16 = 400;
pub const STATUS_INTERNAL_ERROR: u16 = 500;

pub const ACCEPTED_MESSAGE: &str = "Signature valid. Document accepted.";
pub const REJECTED_PREFIX: &str = "Signature verification failed: ";

/// Most parts a request may carry.
pub const MAX_PARTS: u16 = 8;
const MAX_LABEL_BYTES: u16 = 256;
const MAX_MESSAGE_BYTES: u32 = 64 * 1024;

/// One labelled, opaque field of a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub content_type: String,
    pub body: Vec<u8>,
}

impl Part {
    pub fn new(name: impl Into<String>, content_type: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            content_type: content_type.into(),
            body,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExchangeRequest {
    pub parts: Vec<Part>,
}

impl ExchangeRequest {
    /// First part named `name`.
    pub fn part(&self, name: &str) -> Option<&Part> {
        self.parts.iter().find(|part| part.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeResponse {
    pub status: u16,
    pub message: String,
}

impl ExchangeResponse {
    pub fn accepted() -> Self {
        Self {
            status: STATUS_OK,
            message: ACCEPTED_MESSAGE.to_string(),
        }
    }

    pub fn rejected(detail: impl std::fmt::Display) -> Self {
        Self {
            status: STATUS_BAD_REQUEST,
            message: format!("{REJECTED_PREFIX}{detail}"),
        }
    }

    pub fn storage_failed(detail: impl std::fmt::Display) -> Self {
        Self {
            status: STATUS_INTERNAL_ERROR,
            message: format!("Document storage failed: {detail}"),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == STATUS_OK
    }
}

/// Names and content types of the document and signature parts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartLayout {
    pub document_part: String,
    pub document_content_type: String,
    pub signature_part: String,
    pub signature_content_type: String,
    pub max_part_bytes: u32,
}

impl Default for PartLayout {
    fn default() -> Self {
        Self::from(&ExchangeConfig::default())
    }
}

impl From<&ExchangeConfig> for PartLayout {
    fn from(config: &ExchangeConfig) -> Self {
        Self {
            document_part: config.document_part.clone(),
            document_content_type: config.document_content_type.clone(),
            signature_part: config.signature_part.clone(),
            signature_content_type: config.signature_content_type.clone(),
            max_part_bytes: config.max_part_bytes,
        }
    }
}

pub async fn write_request<W>(writer: &mut W, request: &ExchangeRequest) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let count = u16::try_from(request.parts.len())
        .ok()
        .filter(|count| *count <= MAX_PARTS)
        .ok_or_else(|| SegError::InvalidInput(format!("too many parts: {}", request.parts.len())))?;

    let mut frame = Vec::new();
    frame.extend_from_slice(&count.to_be_bytes());
    for part in &request.parts {
        put_label(&mut frame, &part.name)?;
        put_label(&mut frame, &part.content_type)?;
        let len = u32::try_from(part.body.len())
            .map_err(|_| SegError::InvalidInput(format!("part {:?} is too large", part.name)))?;
        frame.extend_from_slice(&len.to_be_bytes());
        frame.extend_from_slice(&part.body);
    }
    writer.write_all(&frame).await.map_err(map_tls_io_error)?;
    writer.flush().await.map_err(map_tls_io_error)
}

fn put_label(frame: &mut Vec<u8>, label: &str) -> Result<()> {
    let len = u16::try_from(label.len())
        .ok()
        .filter(|len| *len <= MAX_LABEL_BYTES)
        .ok_or_else(|| SegError::InvalidInput(format!("label too long: {} bytes", label.len())))?;
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(label.as_bytes());
    Ok(())
}

/// Reads one request, refusing any part body above `max_part_bytes`.
///
/// Framing violations are [`SegError::DecodingError`]; transport failures
/// keep their channel classification.
pub async fn read_request<R>(reader: &mut R, max_part_bytes: u32) -> Result<ExchangeRequest>
where
    R: AsyncRead + Unpin,
{
    let count = reader.read_u16().await.map_err(map_tls_io_error)?;
    if count > MAX_PARTS {
        return Err(SegError::DecodingError(format!("request has {count} parts")));
    }
    let mut parts = Vec::with_capacity(usize::from(count));
    for _ in 0..count {
        let name = read_label(reader).await?;
        let content_type = read_label(reader).await?;
        let len = reader.read_u32().await.map_err(map_tls_io_error)?;
        if len > max_part_bytes {
            return Err(SegError::DecodingError(format!(
                "part {name:?} is {len} bytes, limit is {max_part_bytes}"
            )));
        }
        let body = read_exact_vec(reader, len as usize).await?;
        parts.push(Part {
            name,
            content_type,
            body,
        });
    }
    Ok(ExchangeRequest { parts })
}

async fn read_label<R>(reader: &mut R) -> Result<String>
where
    R: AsyncRead + Unpin,
{
    let len = reader.read_u16().await.map_err(map_tls_io_error)?;
    if len > MAX_LABEL_BYTES {
        return Err(SegError::DecodingError(format!("label of {len} bytes")));
    }
    let bytes = read_exact_vec(reader, usize::from(len)).await?;
    String::from_utf8(bytes).map_err(|e| SegError::DecodingError(format!("label is not UTF-8: {e}")))
}

async fn read_exact_vec<R>(reader: &mut R, len: usize) -> Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = vec![0u8; len];
    reader.read_exact(&mut buf).await.map_err(map_tls_io_error)?;
    Ok(buf)
}

pub async fn write_response<W>(writer: &mut W, response: &ExchangeResponse) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let message = response.message.as_bytes();
    let len = u32::try_from(message.len())
        .ok()
        .filter(|len| *len <= MAX_MESSAGE_BYTES)
        .ok_or_else(|| SegError::InvalidInput("response message too long".to_string()))?;
    let mut frame = Vec::with_capacity(6 + message.len());
    frame.extend_from_slice(&response.status.to_be_bytes());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(message);
    writer.write_all(&frame).await.map_err(map_tls_io_error)?;
    writer.flush().await.map_err(map_tls_io_error)
}

pub async fn read_response<R>(reader: &mut R) -> Result<ExchangeResponse>
where
    R: AsyncRead + Unpin,
{
    let status = reader.read_u16().await.map_err(map_tls_io_error)?;
    let len = reader.read_u32().await.map_err(map_tls_io_error)?;
    if len > MAX_MESSAGE_BYTES {
        return Err(SegError::DecodingError(format!("response message of {len} bytes")));
    }
    let message = read_exact_vec(reader, len as usize).await?;
    let message = String::from_utf8(message)
        .map_err(|e| SegError::DecodingError(format!("response is not UTF-8: {e}")))?;
    Ok(ExchangeResponse { status, message })
}
