//! Shared primitives for the tapforge capture and relay crates.

use std::collections::HashMap;
use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Request/response header map as delivered by capture sources. Header name
/// casing is preserved as observed; lookups that need case-insensitivity
/// normalize on their side.
pub type HeaderMap = HashMap<String, String>;

/// Identifier for one captured exchange. Capture sources deliver the three
/// observation phases without any shared id, so this one is minted locally:
/// a fixed-width millisecond prefix keeps ids sortable by creation time, a
/// random suffix breaks ties within the same millisecond.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ExchangeId(pub String);

impl ExchangeId {
    pub fn new() -> Self {
        let millis = Utc::now().timestamp_millis().max(0) as u64;
        let nonce = Uuid::new_v4().as_u128() as u32;
        Self(format!("{millis:013x}-{nonce:08x}"))
    }
}

impl Default for ExchangeId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ExchangeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for one user question in flight. Never reused.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub String);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for QueryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier for a tool definition. Opaque: assigned by the catalog or by
/// whatever derives the tool, never interpreted here.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct ToolId(pub String);

impl fmt::Display for ToolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ToolId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Tag identifying which capture surface produced an event. Correlation
/// between observation phases never crosses sources: a ledger shared by
/// several surfaces partitions its records by this tag.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct CaptureSource(pub String);

impl CaptureSource {
    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }
}

impl Default for CaptureSource {
    fn default() -> Self {
        Self("primary".to_string())
    }
}

impl fmt::Display for CaptureSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Resource category reported by the capture source for a network event.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Document,
    SubFrame,
    Stylesheet,
    Script,
    Image,
    Font,
    Media,
    Xhr,
    Fetch,
    WebSocket,
    Ping,
    Other,
}

impl ResourceKind {
    /// Lenient parse of the category labels different capture surfaces emit
    /// ("xmlhttprequest", "XHR", "main_frame", "Document", ...). Unknown
    /// labels map to `Other`.
    pub fn from_label(label: &str) -> Self {
        match label.to_ascii_lowercase().as_str() {
            "document" | "main_frame" | "mainframe" => Self::Document,
            "sub_frame" | "subframe" | "iframe" => Self::SubFrame,
            "stylesheet" | "css" => Self::Stylesheet,
            "script" => Self::Script,
            "image" | "img" => Self::Image,
            "font" => Self::Font,
            "media" => Self::Media,
            "xhr" | "xmlhttprequest" => Self::Xhr,
            "fetch" => Self::Fetch,
            "websocket" => Self::WebSocket,
            "ping" | "beacon" => Self::Ping,
            _ => Self::Other,
        }
    }

    /// Categories that are presentation assets rather than data.
    pub fn is_static_asset(self) -> bool {
        matches!(
            self,
            Self::Stylesheet | Self::Script | Self::Image | Self::Font | Self::Media
        )
    }

    /// Categories that carry application data by construction.
    pub fn is_data_call(self) -> bool {
        matches!(self, Self::Xhr | Self::Fetch)
    }

    /// Navigation-shaped categories where the URL decides interest.
    pub fn is_navigation(self) -> bool {
        matches!(self, Self::Document | Self::SubFrame | Self::Other)
    }
}

/// Shape of a captured or fetched payload, assigned once when the payload
/// enters the system and matched exhaustively downstream.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Json,
    Html,
    Text,
    Raw,
}

impl PayloadKind {
    /// Classify from a Content-Type header value. Absent or unrecognized
    /// types fall back to `Raw`.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(value) = content_type else {
            return Self::Raw;
        };
        let mime = value
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        if mime.ends_with("/json") || mime.ends_with("+json") {
            Self::Json
        } else if mime == "text/html" || mime == "application/xhtml+xml" {
            Self::Html
        } else if mime.starts_with("text/") {
            Self::Text
        } else {
            Self::Raw
        }
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Json => "json",
            Self::Html => "html",
            Self::Text => "text",
            Self::Raw => "raw",
        };
        f.write_str(label)
    }
}
