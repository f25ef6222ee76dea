use async_trait::async_trait;

use crate::agent::{Agent, AgentResponse, AgentState};

/// Repeats the user's message back. Always ready; used for health checks and tests.
#[derive(Clone, Debug, Default)]
pub struct EchoAgent;

impl EchoAgent {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Agent for EchoAgent {
    fn name(&self) -> &str {
        "Echo Agent"
    }

    fn description(&self) -> &str {
        "Replies with the message it received"
    }

    fn kind(&self) -> &'static str {
        "EchoAgent"
    }

    fn state(&self) -> AgentState {
        AgentState::Ready
    }

    async fn process(&self, _user_id: &str, message: &str) -> AgentResponse {
        AgentResponse::new(format!("Echo: {message}"), 1.0)
    }
}

#[cfg(test)]
mod tests {
    use crate::agent::{Agent, AgentState};

    use super::EchoAgent;

    #[tokio::test]
    async fn echoes_with_full_confidence() {
        let agent = EchoAgent::new();

        let response = agent.process("U1", "hello").await;

        assert_eq!(response.content, "Echo: hello");
        assert_eq!(response.confidence, 1.0);
    }

    #[tokio::test]
    async fn echoes_empty_message_for_any_user() {
        let agent = EchoAgent::new();

        assert_eq!(agent.process("", "").await.content, "Echo: ");
        assert_eq!(agent.process("U2", "多語 text").await.content, "Echo: 多語 text");
    }

    #[tokio::test]
    async fn metadata_reports_ready_echo_variant() {
        let agent = EchoAgent::new();
        agent.initialize().await;

        let metadata = agent.metadata();
        assert_eq!(metadata.kind, "EchoAgent");
        assert_eq!(metadata.name, "Echo Agent");
        assert_eq!(metadata.state, AgentState::Ready);
    }
}
