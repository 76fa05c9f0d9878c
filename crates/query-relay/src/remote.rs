//! The remote reasoning protocol.
//!
//! Three operations, all correlated by query id: a long-lived solve call
//! that resolves once a final answer exists, an idempotent short poll for
//! pending tool requests, and result submission. The wire shapes belong to
//! the remote service; this module pins down the local trait and one
//! JSON-over-HTTP implementation of it.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use tapforge_core_types::{QueryId, ToolId};
use tokio::sync::Notify;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::error::RelayError;
use crate::model::{PendingToolCall, QueryAnswer, ToolOutcome};

#[async_trait]
pub trait RemoteReasoner: Send + Sync {
    /// Submit the question and wait for the final answer. Long-lived: the
    /// call stays open across any tool round-trip.
    async fn solve(&self, query: &QueryId, question: &str) -> Result<QueryAnswer, RelayError>;

    /// Ask whether the remote wants a tool executed. Short-lived and
    /// idempotent; `Ok(None)` covers both "nothing yet" and the remote's
    /// not-found class.
    async fn poll_tool_request(&self, query: &QueryId)
        -> Result<Option<PendingToolCall>, RelayError>;

    /// Relay a normalized tool result back, keyed by query id.
    async fn submit_tool_result(
        &self,
        query: &QueryId,
        outcome: &ToolOutcome,
    ) -> Result<(), RelayError>;
}

#[derive(Serialize)]
struct SolveRequest<'a> {
    #[serde(rename = "queryId")]
    query_id: &'a str,
    question: &'a str,
    #[serde(rename = "userId")]
    user_id: &'a str,
}

#[derive(Deserialize)]
struct SolveResponse {
    answer: String,
    #[serde(default)]
    reasoning: Option<String>,
}

#[derive(Deserialize)]
struct PendingToolResponse {
    #[serde(rename = "toolId")]
    tool_id: String,
    #[serde(default)]
    params: Option<serde_json::Value>,
}

#[derive(Serialize)]
struct ToolResultRequest<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    result: &'a ToolOutcome,
}

/// JSON-over-HTTP reasoner client.
pub struct HttpRemoteReasoner {
    client: reqwest::Client,
    config: RemoteConfig,
}

impl HttpRemoteReasoner {
    pub fn new(config: RemoteConfig) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|err| RelayError::Config(err.to_string()))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, suffix: &str) -> String {
        format!("{}/{}", self.config.base_url.trim_end_matches('/'), suffix)
    }
}

#[async_trait]
impl RemoteReasoner for HttpRemoteReasoner {
    async fn solve(&self, query: &QueryId, question: &str) -> Result<QueryAnswer, RelayError> {
        let payload = SolveRequest {
            query_id: &query.0,
            question,
            user_id: &self.config.user_id,
        };
        let response = self
            .client
            .post(self.endpoint("queries/solve"))
            .timeout(Duration::from_millis(self.config.solve_timeout_ms))
            .json(&payload)
            .send()
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayError::Remote(format!(
                "solve returned {}",
                response.status()
            )));
        }
        let body: SolveResponse = response
            .json()
            .await
            .map_err(|err| RelayError::Remote(err.to_string()))?;
        Ok(QueryAnswer {
            answer: body.answer,
            reasoning: body.reasoning,
        })
    }

    async fn poll_tool_request(
        &self,
        query: &QueryId,
    ) -> Result<Option<PendingToolCall>, RelayError> {
        let response = self
            .client
            .get(self.endpoint(&format!("queries/{}/pending-tool", query.0)))
            .timeout(Duration::from_millis(self.config.poll_timeout_ms))
            .query(&[("userId", self.config.user_id.as_str())])
            .send()
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;
        match response.status() {
            StatusCode::NOT_FOUND | StatusCode::NO_CONTENT => Ok(None),
            status if status.is_success() => {
                let body: PendingToolResponse = response
                    .json()
                    .await
                    .map_err(|err| RelayError::Remote(err.to_string()))?;
                Ok(Some(PendingToolCall {
                    tool_id: ToolId(body.tool_id),
                    params: body.params,
                }))
            }
            status => Err(RelayError::Remote(format!("poll returned {status}"))),
        }
    }

    async fn submit_tool_result(
        &self,
        query: &QueryId,
        outcome: &ToolOutcome,
    ) -> Result<(), RelayError> {
        let payload = ToolResultRequest {
            user_id: &self.config.user_id,
            result: outcome,
        };
        let response = self
            .client
            .post(self.endpoint(&format!("queries/{}/tool-result", query.0)))
            .timeout(Duration::from_millis(self.config.poll_timeout_ms))
            .json(&payload)
            .send()
            .await
            .map_err(|err| RelayError::Transport(err.to_string()))?;
        if !response.status().is_success() {
            return Err(RelayError::Remote(format!(
                "tool result returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Deterministic reasoner for tests and offline demo runs.
///
/// Scripts a single query: optionally hands out one pending tool call after
/// a fixed number of polls, then resolves the solve call with a fixed
/// answer once the tool result has been submitted. Without a scripted tool
/// call, solve resolves immediately.
pub struct ScriptedReasoner {
    final_answer: String,
    pending: Option<PendingToolCall>,
    polls_before_release: u32,
    polls: AtomicU32,
    released: AtomicBool,
    result_seen: Notify,
    submitted: Mutex<Vec<ToolOutcome>>,
}

impl ScriptedReasoner {
    /// Resolve directly with `answer`; never request a tool.
    pub fn direct(answer: impl Into<String>) -> Self {
        Self {
            final_answer: answer.into(),
            pending: None,
            polls_before_release: 0,
            polls: AtomicU32::new(0),
            released: AtomicBool::new(false),
            result_seen: Notify::new(),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Hand out `call` on the first poll after `polls_before_release`
    /// empty ones, then resolve with `answer` once the result arrives.
    pub fn with_tool_call(
        answer: impl Into<String>,
        call: PendingToolCall,
        polls_before_release: u32,
    ) -> Self {
        Self {
            final_answer: answer.into(),
            pending: Some(call),
            polls_before_release,
            polls: AtomicU32::new(0),
            released: AtomicBool::new(false),
            result_seen: Notify::new(),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// How many times the poll endpoint has been hit.
    pub fn polls(&self) -> u32 {
        self.polls.load(Ordering::SeqCst)
    }

    /// Every tool result submitted so far.
    pub fn submitted(&self) -> Vec<ToolOutcome> {
        self.submitted.lock().clone()
    }
}

#[async_trait]
impl RemoteReasoner for ScriptedReasoner {
    async fn solve(&self, query: &QueryId, _question: &str) -> Result<QueryAnswer, RelayError> {
        if self.pending.is_some() {
            debug!(target: "query-relay", %query, "scripted solve waiting for tool result");
            self.result_seen.notified().await;
        }
        Ok(QueryAnswer {
            answer: self.final_answer.clone(),
            reasoning: None,
        })
    }

    async fn poll_tool_request(
        &self,
        _query: &QueryId,
    ) -> Result<Option<PendingToolCall>, RelayError> {
        let seen = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
        match &self.pending {
            Some(call)
                if seen > self.polls_before_release
                    && !self.released.swap(true, Ordering::SeqCst) =>
            {
                Ok(Some(call.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn submit_tool_result(
        &self,
        _query: &QueryId,
        outcome: &ToolOutcome,
    ) -> Result<(), RelayError> {
        self.submitted.lock().push(outcome.clone());
        // notify_one stores a permit, so the solve side cannot miss the
        // wakeup even if it has not registered yet.
        self.result_seen.notify_one();
        Ok(())
    }
}
