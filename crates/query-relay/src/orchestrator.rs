//! The query orchestrator: drives one user question through catalog
//! lookup, remote submission, bounded tool-request polling, local tool
//! execution, and result relay, with cooperative cancellation at every
//! suspension point.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use tapforge_core_types::{QueryId, ToolId};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::catalog::{Catalog, CandidateSet};
use crate::config::RelayConfig;
use crate::error::RelayError;
use crate::executor::ToolRunner;
use crate::metrics;
use crate::model::{
    ChatQuery, PendingToolCall, QueryAnswer, QueryBus, QueryEvent, QueryStatus, ToolDescriptor,
    ToolOutcome,
};
use crate::remote::RemoteReasoner;

struct ActiveQuery {
    cancel: CancellationToken,
    status: QueryStatus,
}

/// Runs queries to a terminal state and tracks the ones in flight.
///
/// One tool round-trip per query: once the remote hands out a pending tool
/// call, polling stops for good. A remote that wants a second tool needs a
/// fresh query.
pub struct QueryOrchestrator {
    catalog: Arc<dyn Catalog>,
    remote: Arc<dyn RemoteReasoner>,
    runner: ToolRunner,
    config: RelayConfig,
    active: DashMap<QueryId, ActiveQuery>,
    bus: QueryBus,
}

impl QueryOrchestrator {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        remote: Arc<dyn RemoteReasoner>,
        runner: ToolRunner,
        config: RelayConfig,
    ) -> Self {
        let (bus, _) = broadcast::channel(64);
        Self {
            catalog,
            remote,
            runner,
            config,
            active: DashMap::new(),
            bus,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueryEvent> {
        self.bus.subscribe()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    pub fn status_of(&self, id: &QueryId) -> Option<QueryStatus> {
        self.active.get(id).map(|entry| entry.status)
    }

    /// Trigger cooperative cancellation of an in-flight query. Returns
    /// false when the id is unknown or already terminal.
    pub fn cancel(&self, id: &QueryId) -> bool {
        match self.active.get(id) {
            Some(entry) => {
                entry.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Drive one question to a terminal state.
    pub async fn run(&self, question: impl Into<String>) -> ChatQuery {
        let query = ChatQuery::new(question.into());
        let cancel = CancellationToken::new();
        self.register(&query, cancel.clone());
        self.drive(query, cancel).await
    }

    /// Like [`run`](Self::run), detached. The id is registered before the
    /// task starts, so it can be cancelled right away.
    pub fn spawn(
        self: &Arc<Self>,
        question: impl Into<String>,
    ) -> (QueryId, JoinHandle<ChatQuery>) {
        let query = ChatQuery::new(question.into());
        let id = query.id.clone();
        let cancel = CancellationToken::new();
        self.register(&query, cancel.clone());
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.drive(query, cancel).await });
        (id, handle)
    }

    fn register(&self, query: &ChatQuery, cancel: CancellationToken) {
        self.active.insert(
            query.id.clone(),
            ActiveQuery {
                cancel,
                status: query.status,
            },
        );
        metrics::record_query_started();
        let _ = self.bus.send(QueryEvent::StatusChanged {
            id: query.id.clone(),
            status: query.status,
        });
    }

    async fn drive(&self, mut query: ChatQuery, cancel: CancellationToken) -> ChatQuery {
        self.transition(&mut query, QueryStatus::Searching);
        let candidates = match self.catalog.lookup(&query.question).await {
            Ok(set) => set,
            Err(err) => {
                warn!(target: "query-relay", id = %query.id, %err, "catalog lookup failed");
                CandidateSet::default()
            }
        };
        query.candidate_tools = candidates.tools.clone();

        let outcome = if cancel.is_cancelled() {
            Err(RelayError::Cancelled)
        } else if query.candidate_tools.is_empty() {
            self.solve_direct(&query, &cancel).await
        } else {
            self.relay_with_tools(&mut query, &cancel).await
        };
        self.finish(query, outcome, candidates.knowledge)
    }

    /// No candidate tools: hand the question to the remote and wait.
    async fn solve_direct(
        &self,
        query: &ChatQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryAnswer, RelayError> {
        tokio::select! {
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            answer = self.remote.solve(&query.id, &query.question) => answer,
        }
    }

    /// Tool relay: keep the long-lived solve call open while polling for a
    /// pending tool request, execute at most one tool, relay its result,
    /// then wait for the final answer.
    async fn relay_with_tools(
        &self,
        query: &mut ChatQuery,
        cancel: &CancellationToken,
    ) -> Result<QueryAnswer, RelayError> {
        // Owned copies: the solve future stays pinned across the status
        // transitions below, so it must not borrow `query`.
        let query_id = query.id.clone();
        let question = query.question.clone();
        let solve = self.remote.solve(&query_id, &question);
        tokio::pin!(solve);

        let mut attempts: u32 = 0;
        let pending: PendingToolCall = loop {
            attempts += 1;
            let polled = tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                answer = &mut solve => return answer,
                polled = self.remote.poll_tool_request(&query_id) => polled,
            };
            match polled {
                Ok(Some(call)) => break call,
                Ok(None) => {
                    debug!(target: "query-relay", id = %query_id, attempts, "no tool request yet");
                }
                // Transient poll failures count as an attempt and retry.
                Err(err) => {
                    warn!(target: "query-relay", id = %query_id, %err, attempts, "tool poll failed");
                }
            }
            if attempts >= self.config.max_poll_attempts {
                metrics::record_poll_timeout();
                return Err(RelayError::PollTimeout { attempts });
            }
            tokio::select! {
                _ = cancel.cancelled() => return Err(RelayError::Cancelled),
                answer = &mut solve => return answer,
                _ = sleep(Duration::from_millis(self.config.poll_interval_ms)) => {}
            }
        };

        self.transition(query, QueryStatus::ToolRequested);
        let descriptor = self
            .resolve_tool(&pending.tool_id, &query.candidate_tools)
            .await;

        self.transition(query, QueryStatus::ToolExecuting);
        let outcome = match descriptor {
            Some(descriptor) => self.runner.execute(&descriptor, &pending, cancel).await?,
            None => {
                warn!(
                    target: "query-relay",
                    id = %query_id,
                    tool = %pending.tool_id,
                    "remote requested an unknown tool"
                );
                ToolOutcome::failure(format!("unknown tool {}", pending.tool_id))
            }
        };

        tokio::select! {
            _ = cancel.cancelled() => return Err(RelayError::Cancelled),
            submitted = self.remote.submit_tool_result(&query_id, &outcome) => submitted?,
        }

        // Back to waiting on the remote's final answer.
        self.transition(query, QueryStatus::Submitted);
        tokio::select! {
            _ = cancel.cancelled() => Err(RelayError::Cancelled),
            answer = &mut solve => answer,
        }
    }

    /// Prefer the catalog's current definition, fall back to the candidate
    /// list captured at lookup time.
    async fn resolve_tool(
        &self,
        id: &ToolId,
        known: &[ToolDescriptor],
    ) -> Option<ToolDescriptor> {
        match self.catalog.tool(id).await {
            Ok(Some(descriptor)) => Some(descriptor),
            Ok(None) => known.iter().find(|tool| tool.id == *id).cloned(),
            Err(err) => {
                warn!(target: "query-relay", %err, "catalog tool resolution failed");
                known.iter().find(|tool| tool.id == *id).cloned()
            }
        }
    }

    /// The single terminal transition: set the final status, compose a
    /// degraded answer on failure, and drop the query from the active set.
    fn finish(
        &self,
        mut query: ChatQuery,
        outcome: Result<QueryAnswer, RelayError>,
        knowledge: Option<String>,
    ) -> ChatQuery {
        match outcome {
            Ok(answer) => {
                query.result = Some(answer);
                self.transition(&mut query, QueryStatus::Completed);
                metrics::record_query_completed();
            }
            Err(RelayError::Cancelled) => {
                self.transition(&mut query, QueryStatus::Cancelled);
                metrics::record_query_cancelled();
            }
            Err(err) => {
                warn!(target: "query-relay", id = %query.id, %err, "query failed");
                query.result = degraded_answer(&query, knowledge);
                self.transition(&mut query, QueryStatus::Failed);
                metrics::record_query_failed();
            }
        }
        self.active.remove(&query.id);
        query
    }

    fn transition(&self, query: &mut ChatQuery, status: QueryStatus) {
        debug!(target: "query-relay", id = %query.id, ?status, "query transition");
        query.status = status;
        if let Some(mut entry) = self.active.get_mut(&query.id) {
            entry.status = status;
        }
        let _ = self.bus.send(QueryEvent::StatusChanged {
            id: query.id.clone(),
            status,
        });
    }
}

/// Local fallback when the remote path fails: catalog knowledge if the
/// lookup produced any, otherwise a pointer at the candidate tools.
fn degraded_answer(query: &ChatQuery, knowledge: Option<String>) -> Option<QueryAnswer> {
    if let Some(knowledge) = knowledge {
        return Some(QueryAnswer {
            answer: knowledge,
            reasoning: Some("local catalog knowledge; remote reasoning unavailable".to_string()),
        });
    }
    if query.candidate_tools.is_empty() {
        return None;
    }
    let names: Vec<&str> = query
        .candidate_tools
        .iter()
        .map(|tool| tool.name.as_str())
        .collect();
    Some(QueryAnswer {
        answer: format!(
            "The reasoning service was unreachable. Captured tools that may answer this: {}.",
            names.join(", ")
        ),
        reasoning: Some("degraded local fallback".to_string()),
    })
}
