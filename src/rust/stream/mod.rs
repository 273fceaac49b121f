//! Streaming ingestion: feed transports push [`FeedEvent`]s into a channel and
//! the [`StreamIngestor`] classifies each item and hands the result to a sink.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod feed;
mod ingestor;

pub use feed::{FeedFormat, HttpFeed, LinesFeed, DEFAULT_MAX_LINE_BYTES};
pub use ingestor::{IngestStats, StreamIngestor, DEFAULT_DRAIN_TIMEOUT};

/// The text of a feed item as the transport delivered it.
///
/// In JSON feeds a string becomes `Text` and an array of byte values becomes
/// `Bytes`. Raw line feeds always deliver `Bytes`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Bytes(Vec<u8>),
}

impl Payload {
    /// Decodes the payload as strict UTF-8.
    pub fn decode_utf8(self) -> Result<String, DecodeFailure> {
        match self {
            Self::Text(text) => Ok(text),
            Self::Bytes(bytes) => String::from_utf8(bytes).map_err(|e| DecodeFailure::InvalidUtf8(e.utf8_error())),
        }
    }
}

impl From<&str> for Payload {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Payload {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

/// One item pushed by a feed. Fields other than `text` are ignored.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedItem {
    #[serde(default)]
    pub text: Option<Payload>,
}

impl FeedItem {
    pub fn new(text: impl Into<Payload>) -> Self {
        Self {
            text: Some(text.into()),
        }
    }
}

/// Everything a feed transport can push.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedEvent {
    Item(FeedItem),
    /// A non-2xx status or a connection/format fault. `status` is the HTTP
    /// status code when there is one.
    TransportError { status: Option<u16>, message: String },
}

/// Why a payload could not be turned into classifiable text.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeFailure {
    /// The payload is raw bytes, not decoded text
    #[error("payload is not decoded text")]
    NotText,
    /// The bytes are not valid UTF-8
    #[error("payload is not valid UTF-8: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}
