//! Local tool execution.
//!
//! The remote reasoner never touches the target API itself; it asks this
//! side to run the call, precisely because only this process holds the
//! session's live credentials. The runner merges the tool's parameter
//! template with vaulted headers, executes the HTTP call, and folds
//! whatever happened into the normalized [`ToolOutcome`] envelope. Only
//! cancellation escapes as an error.

use std::sync::Arc;
use std::time::Duration;

use header_vault::{is_auth_sensitive, HeaderVault};
use reqwest::header::CONTENT_TYPE;
use reqwest::Method;
use tapforge_core_types::{HeaderMap, PayloadKind};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::RelayError;
use crate::metrics;
use crate::model::{PendingToolCall, ToolDescriptor, ToolOutcome};

/// Merge a tool's parameter template with vaulted headers. Vault wins for
/// auth-sensitive names, the template wins on other conflicts, and
/// non-conflicting vault headers pass through. Header names compare
/// case-insensitively.
pub fn merge_headers(template: &HeaderMap, vaulted: Option<&HeaderMap>) -> HeaderMap {
    let mut merged = template.clone();
    let Some(vaulted) = vaulted else {
        return merged;
    };
    for (name, value) in vaulted {
        if is_auth_sensitive(name) {
            merged.retain(|existing, _| !existing.eq_ignore_ascii_case(name));
            merged.insert(name.clone(), value.clone());
        } else if !merged.keys().any(|existing| existing.eq_ignore_ascii_case(name)) {
            merged.insert(name.clone(), value.clone());
        }
    }
    merged
}

/// Executes tool descriptors against their live endpoints.
pub struct ToolRunner {
    client: reqwest::Client,
    vault: Arc<HeaderVault>,
    timeout: Duration,
}

impl ToolRunner {
    pub fn new(vault: Arc<HeaderVault>, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RelayError::Config(err.to_string()))?;
        Ok(Self {
            client,
            vault,
            timeout,
        })
    }

    pub fn vault(&self) -> &Arc<HeaderVault> {
        &self.vault
    }

    /// Run one tool call. HTTP failures, timeouts, and error statuses all
    /// land inside the returned envelope; the only `Err` this produces is
    /// [`RelayError::Cancelled`].
    pub async fn execute(
        &self,
        descriptor: &ToolDescriptor,
        call: &PendingToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolOutcome, RelayError> {
        let outcome = self.execute_inner(descriptor, call, cancel).await?;
        metrics::record_tool_execution(outcome.success);
        Ok(outcome)
    }

    async fn execute_inner(
        &self,
        descriptor: &ToolDescriptor,
        call: &PendingToolCall,
        cancel: &CancellationToken,
    ) -> Result<ToolOutcome, RelayError> {
        let Ok(method) = Method::from_bytes(descriptor.method.as_bytes()) else {
            return Ok(ToolOutcome::failure(format!(
                "invalid method {}",
                descriptor.method
            )));
        };
        let credentials = self.vault.get_or_most_recent(&descriptor.domain);
        let headers = merge_headers(&descriptor.parameter_template, credentials.as_ref());
        debug!(
            target: "query-relay",
            tool = %descriptor.id,
            url = %descriptor.endpoint_url,
            vaulted = credentials.is_some(),
            "executing tool"
        );

        let takes_body = method != Method::GET && method != Method::HEAD;
        let mut request = self
            .client
            .request(method, &descriptor.endpoint_url)
            .timeout(self.timeout);
        for (name, value) in &headers {
            request = request.header(name, value);
        }
        if takes_body {
            if let Some(params) = &call.params {
                request = request.json(params);
            }
        }

        let response = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            sent = request.send() => match sent {
                Ok(response) => response,
                Err(err) => return Ok(ToolOutcome::failure(describe_send_error(&err))),
            },
        };

        let status = response.status();
        let kind = PayloadKind::from_content_type(
            response
                .headers()
                .get(CONTENT_TYPE)
                .and_then(|value| value.to_str().ok()),
        );
        let text = tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            read = response.text() => match read {
                Ok(text) => text,
                Err(err) => return Ok(ToolOutcome::failure(err.to_string())),
            },
        };

        if !status.is_success() {
            let snippet: String = text.chars().take(200).collect();
            return Ok(ToolOutcome::failure_with_kind(
                format!("HTTP {status}: {snippet}"),
                kind,
            ));
        }

        Ok(normalize(text, kind))
    }
}

/// Fold a successful body into the envelope. JSON that fails to parse is
/// demoted to a raw string rather than reported as a failure; the call
/// itself worked.
fn normalize(text: String, kind: PayloadKind) -> ToolOutcome {
    match kind {
        PayloadKind::Json => match serde_json::from_str::<serde_json::Value>(&text) {
            Ok(value) => ToolOutcome::success(value, PayloadKind::Json),
            Err(_) => ToolOutcome::success(serde_json::Value::String(text), PayloadKind::Raw),
        },
        PayloadKind::Html => ToolOutcome::success(serde_json::Value::String(text), PayloadKind::Html),
        PayloadKind::Text => ToolOutcome::success(serde_json::Value::String(text), PayloadKind::Text),
        PayloadKind::Raw => ToolOutcome::success(serde_json::Value::String(text), PayloadKind::Raw),
    }
}

fn describe_send_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "tool call timed out".to_string()
    } else {
        err.to_string()
    }
}
