use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error payload carried by an `error` event from the server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct RemoteError {
    #[serde(rename = "type")]
    pub error_type: Option<String>,
    pub code: Option<String>,
    #[serde(default)]
    pub message: String,
    pub param: Option<String>,
    pub event_id: Option<String>,
}

#[derive(Error, Debug)]
pub enum Error {
    /// Missing credential, not yet connected, already active. Raised
    /// synchronously before any network I/O.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("failed to parse or serialize JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    #[error("header error: {0}")]
    Header(#[from] reqwest::header::InvalidHeaderValue),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// An explicit `error` event from the server. Surfaced via callback;
    /// the session continues unless the transport also drops.
    #[error("server error: {}", .0.message)]
    Remote(RemoteError),

    #[error("the connection was closed unexpectedly")]
    ConnectionClosed,

    #[error("connection attempt timed out")]
    ConnectTimeout,

    /// Stale or duplicate tool-call submission, or an unknown tool.
    #[error("tool bridge error: {0}")]
    ToolBridge(String),
}

pub type Result<T> = std::result::Result<T, Error>;
