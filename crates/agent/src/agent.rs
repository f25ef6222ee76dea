use async_trait::async_trait;
use serde::Serialize;

/// Reply produced by an agent. `confidence` is advisory and never drives routing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AgentResponse {
    pub content: String,
    pub confidence: f32,
}

impl AgentResponse {
    pub fn new(content: impl Into<String>, confidence: f32) -> Self {
        Self { content: content.into(), confidence: confidence.clamp(0.0, 1.0) }
    }

    /// Low-confidence reply used whenever an agent cannot produce a real answer.
    pub fn degraded(content: impl Into<String>) -> Self {
        Self::new(content, 0.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentState {
    Uninitialized,
    Ready,
    Failed,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentMetadata {
    pub name: String,
    pub description: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub state: AgentState,
}

/// A pluggable responder.
///
/// Neither `initialize` nor `process` can fail: an agent that cannot reach its
/// backend records that internally and answers with a degraded response.
#[async_trait]
pub trait Agent: Send + Sync {
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Concrete variant name, reported in diagnostics.
    fn kind(&self) -> &'static str;

    fn state(&self) -> AgentState;

    async fn initialize(&self) {}

    async fn process(&self, user_id: &str, message: &str) -> AgentResponse;

    fn metadata(&self) -> AgentMetadata {
        AgentMetadata {
            name: self.name().to_string(),
            description: self.description().to_string(),
            kind: self.kind().to_string(),
            state: self.state(),
        }
    }
}
