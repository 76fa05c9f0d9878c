//! Data model for the query relay.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tapforge_core_types::{HeaderMap, PayloadKind, QueryId, ToolId};
use tokio::sync::broadcast;
use url::Url;

/// Lifecycle of one user question. `Submitted` recurs after a tool result
/// has been relayed: the query is again waiting on the remote's final
/// answer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryStatus {
    Submitted,
    Searching,
    ToolRequested,
    ToolExecuting,
    Completed,
    Cancelled,
    Failed,
}

impl QueryStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled | Self::Failed)
    }
}

/// Final answer surfaced to the caller.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QueryAnswer {
    pub answer: String,
    #[serde(default)]
    pub reasoning: Option<String>,
}

/// A reusable HTTP call definition, supplied read-only by the catalog.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolDescriptor {
    pub id: ToolId,
    pub name: String,
    pub endpoint_url: String,
    pub method: String,
    /// Header-shaped call parameters. Vaulted credentials override these
    /// for auth-sensitive names at execution time.
    #[serde(default)]
    pub parameter_template: HeaderMap,
    /// Hostname used for vault lookups.
    pub domain: String,
}

impl ToolDescriptor {
    /// Build a descriptor, deriving `domain` from the endpoint URL.
    pub fn new(
        id: ToolId,
        name: impl Into<String>,
        endpoint_url: impl Into<String>,
        method: impl Into<String>,
    ) -> Self {
        let endpoint_url = endpoint_url.into();
        let domain = Url::parse(&endpoint_url)
            .ok()
            .and_then(|parsed| parsed.host_str().map(|host| host.to_ascii_lowercase()))
            .unwrap_or_default();
        Self {
            id,
            name: name.into(),
            endpoint_url,
            method: method.into(),
            parameter_template: HeaderMap::new(),
            domain,
        }
    }

    pub fn with_template(mut self, template: HeaderMap) -> Self {
        self.parameter_template = template;
        self
    }
}

/// A tool invocation the remote service wants executed locally.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PendingToolCall {
    pub tool_id: ToolId,
    /// Optional call arguments, forwarded as a JSON body for methods that
    /// take one.
    #[serde(default)]
    pub params: Option<serde_json::Value>,
}

impl PendingToolCall {
    pub fn new(tool_id: ToolId) -> Self {
        Self {
            tool_id,
            params: None,
        }
    }
}

/// Normalized tool-result envelope. The remote service sees this exact
/// shape whether the tool returned JSON, HTML, plain text, or failed
/// outright.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ToolOutcome {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub content_kind: PayloadKind,
    pub timestamp: DateTime<Utc>,
}

impl ToolOutcome {
    pub fn success(data: serde_json::Value, content_kind: PayloadKind) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            content_kind,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self::failure_with_kind(error, PayloadKind::Raw)
    }

    pub fn failure_with_kind(error: impl Into<String>, content_kind: PayloadKind) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            content_kind,
            timestamp: Utc::now(),
        }
    }
}

/// One user question being resolved. The cancellation token lives in the
/// orchestrator's active registry, not here; the query itself is plain
/// data.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatQuery {
    pub id: QueryId,
    pub question: String,
    pub status: QueryStatus,
    pub started_at: DateTime<Utc>,
    pub candidate_tools: Vec<ToolDescriptor>,
    pub result: Option<QueryAnswer>,
}

impl ChatQuery {
    pub(crate) fn new(question: String) -> Self {
        Self {
            id: QueryId::new(),
            question,
            status: QueryStatus::Submitted,
            started_at: Utc::now(),
            candidate_tools: Vec::new(),
            result: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }
}

/// Status transition notifications for observers.
#[derive(Clone, Debug)]
pub enum QueryEvent {
    StatusChanged { id: QueryId, status: QueryStatus },
}

/// Broadcast channel for query events.
pub type QueryBus = broadcast::Sender<QueryEvent>;
