//! The catalog seam: tool and knowledge lookup.
//!
//! Persistence, search ranking, and tool authoring all live outside this
//! system; the orchestrator only needs these two read operations.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tapforge_core_types::ToolId;

use crate::error::RelayError;
use crate::model::ToolDescriptor;

/// What a lookup found: optional direct knowledge plus candidate tools.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CandidateSet {
    #[serde(default)]
    pub knowledge: Option<String>,
    #[serde(default)]
    pub tools: Vec<ToolDescriptor>,
}

#[async_trait]
pub trait Catalog: Send + Sync {
    /// Candidate tools and/or direct knowledge for a question.
    async fn lookup(&self, question: &str) -> Result<CandidateSet, RelayError>;
    /// Resolve one tool by id.
    async fn tool(&self, id: &ToolId) -> Result<Option<ToolDescriptor>, RelayError>;
}

/// Keyword-match catalog over a fixed tool list. Backs the CLI (seeded from
/// a JSON file) and tests; a real deployment points the trait at a remote
/// catalog service instead.
#[derive(Default)]
pub struct InMemoryCatalog {
    tools: RwLock<Vec<ToolDescriptor>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_tools(tools: Vec<ToolDescriptor>) -> Self {
        Self {
            tools: RwLock::new(tools),
        }
    }

    pub fn add(&self, tool: ToolDescriptor) {
        self.tools.write().push(tool);
    }

    pub fn len(&self) -> usize {
        self.tools.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.read().is_empty()
    }
}

/// A tool matches when any meaningful question token appears in its name
/// or domain. Tokens under three characters are noise ("in", "a", "of").
fn matches_question(tool: &ToolDescriptor, question: &str) -> bool {
    let name = tool.name.to_ascii_lowercase();
    let domain = tool.domain.to_ascii_lowercase();
    question
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| token.len() >= 3)
        .map(|token| token.to_ascii_lowercase())
        .any(|token| name.contains(&token) || domain.contains(&token))
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn lookup(&self, question: &str) -> Result<CandidateSet, RelayError> {
        let tools = self
            .tools
            .read()
            .iter()
            .filter(|tool| matches_question(tool, question))
            .cloned()
            .collect();
        Ok(CandidateSet {
            knowledge: None,
            tools,
        })
    }

    async fn tool(&self, id: &ToolId) -> Result<Option<ToolDescriptor>, RelayError> {
        Ok(self
            .tools
            .read()
            .iter()
            .find(|tool| tool.id == *id)
            .cloned())
    }
}
