// Replayable request bodies
//
// Payload streams can be read once. The dispatcher drains them into an
// immutable snapshot before the first send; every send reads from it.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt};

use crate::error::{ClientError, Result};

/// Outbound payload as handed to the dispatcher
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Bytes(Bytes),
    /// Single-read stream
    Reader(Box<dyn AsyncRead + Send + Unpin>),
}

impl std::fmt::Debug for Payload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Payload::Empty => f.write_str("Empty"),
            Payload::Json(v) => f.debug_tuple("Json").field(v).finish(),
            Payload::Bytes(b) => f.debug_tuple("Bytes").field(&b.len()).finish(),
            Payload::Reader(_) => f.write_str("Reader(..)"),
        }
    }
}

impl Payload {
    /// Drain the payload into a snapshot. Consumes reader payloads.
    pub async fn snapshot(self) -> Result<ReplayableBody> {
        match self {
            Payload::Empty => Ok(ReplayableBody::empty()),
            Payload::Json(value) => {
                let bytes = serde_json::to_vec(&value)
                    .map_err(|e| ClientError::Internal(anyhow::anyhow!("encode body: {}", e)))?;
                Ok(ReplayableBody::new(bytes, Some("application/json")))
            }
            Payload::Bytes(bytes) => Ok(ReplayableBody::new(bytes, None)),
            Payload::Reader(mut reader) => {
                let mut buf = Vec::new();
                reader
                    .read_to_end(&mut buf)
                    .await
                    .map_err(|e| ClientError::Internal(anyhow::anyhow!("read body: {}", e)))?;
                Ok(ReplayableBody::new(buf, None))
            }
        }
    }
}

/// Immutable snapshot of an outbound payload
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayableBody {
    bytes: Bytes,
    content_type: Option<&'static str>,
}

impl ReplayableBody {
    pub fn new(bytes: impl Into<Bytes>, content_type: Option<&'static str>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&'static str> {
        self.content_type
    }

    /// Fresh request body sharing the snapshot's buffer
    pub fn to_body(&self) -> reqwest::Body {
        reqwest::Body::from(self.bytes.clone())
    }
}
