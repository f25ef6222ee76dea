use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentMetadata, AgentResponse};

pub const DEFAULT_AGENT_ID: &str = "llm";
pub const FALLBACK_AGENT_ID: &str = "echo";

const OVERRIDE_PREFIX: &str = "/agent ";

pub const INVALID_COMMAND_REPLY: &str = "Invalid command format. Use /agent {agent_id} {message}";
pub const PROCESSING_FAILED_REPLY: &str =
    "Sorry, something went wrong while processing your message.";
pub const NO_AGENTS_REPLY: &str = "Sorry, no agents are currently available.";

pub fn agent_not_found_reply(agent_id: &str) -> String {
    format!("Agent not found: {agent_id}")
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RegisteredAgent {
    pub id: String,
    #[serde(flatten)]
    pub metadata: AgentMetadata,
}

/// Chooses which agent answers a message.
///
/// Messages of the form `/agent <id> <text>` go straight to `<id>`. Everything
/// else goes to the default agent, then the fallback, inside a task so that a
/// panicking agent yields an apology instead of tearing down the caller.
pub struct AgentRouter {
    agents: Vec<(String, Arc<dyn Agent>)>,
    default_agent_id: String,
}

impl Default for AgentRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl AgentRouter {
    pub fn new() -> Self {
        Self::with_default_agent(DEFAULT_AGENT_ID)
    }

    pub fn with_default_agent(agent_id: impl Into<String>) -> Self {
        Self { agents: Vec::new(), default_agent_id: agent_id.into() }
    }

    pub fn default_agent_id(&self) -> &str {
        &self.default_agent_id
    }

    /// Registers `agent` under `agent_id`. Re-registering an id replaces the
    /// agent but keeps its position in `list_agents`.
    pub fn register(&mut self, agent_id: impl Into<String>, agent: Arc<dyn Agent>) {
        let agent_id = agent_id.into();
        match self.agents.iter_mut().find(|(id, _)| *id == agent_id) {
            Some(slot) => {
                debug!(event_name = "agent.router.replaced", agent_id = %agent_id, "agent replaced");
                slot.1 = agent;
            }
            None => {
                debug!(event_name = "agent.router.registered", agent_id = %agent_id, "agent registered");
                self.agents.push((agent_id, agent));
            }
        }
    }

    pub fn get(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.iter().find(|(id, _)| id == agent_id).map(|(_, agent)| agent.clone())
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn list_agents(&self) -> Vec<RegisteredAgent> {
        self.agents
            .iter()
            .map(|(id, agent)| RegisteredAgent { id: id.clone(), metadata: agent.metadata() })
            .collect()
    }

    pub async fn initialize_all(&self) {
        let mut tasks = JoinSet::new();
        for (agent_id, agent) in &self.agents {
            let agent_id = agent_id.clone();
            let agent = agent.clone();
            tasks.spawn(async move {
                agent.initialize().await;
                (agent_id, agent.state())
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((agent_id, state)) => info!(
                    event_name = "agent.router.initialized",
                    agent_id = %agent_id,
                    state = ?state,
                    "agent initialization finished"
                ),
                Err(join_error) => error!(
                    event_name = "agent.router.initialize_panicked",
                    error = %join_error,
                    "agent initialization task did not complete"
                ),
            }
        }
    }

    pub async fn process_with(
        &self,
        agent_id: &str,
        user_id: &str,
        message: &str,
    ) -> Option<AgentResponse> {
        let agent = self.get(agent_id)?;
        Some(agent.process(user_id, message).await)
    }

    pub async fn route_and_process(&self, user_id: &str, message: &str) -> String {
        if let Some(command) = message.strip_prefix(OVERRIDE_PREFIX) {
            return self.route_override(user_id, command).await;
        }

        let (agent_id, agent) = match self.get(&self.default_agent_id) {
            Some(agent) => (self.default_agent_id.as_str(), agent),
            None => match self.get(FALLBACK_AGENT_ID) {
                Some(agent) => {
                    warn!(
                        event_name = "agent.router.fallback",
                        default_agent_id = %self.default_agent_id,
                        fallback_agent_id = FALLBACK_AGENT_ID,
                        "default agent missing, using fallback"
                    );
                    (FALLBACK_AGENT_ID, agent)
                }
                None => {
                    error!(event_name = "agent.router.no_agents", user_id, "no agent can answer");
                    return NO_AGENTS_REPLY.to_string();
                }
            },
        };

        let task_user = user_id.to_string();
        let task_message = message.to_string();
        let handle =
            tokio::spawn(async move { agent.process(&task_user, &task_message).await.content });

        match handle.await {
            Ok(content) => content,
            Err(join_error) => {
                error!(
                    event_name = "agent.router.process_failed",
                    agent_id,
                    user_id,
                    panicked = join_error.is_panic(),
                    error = %join_error,
                    "agent task failed"
                );
                PROCESSING_FAILED_REPLY.to_string()
            }
        }
    }

    async fn route_override(&self, user_id: &str, command: &str) -> String {
        let Some((agent_id, rest)) = command.split_once(' ') else {
            debug!(event_name = "agent.router.invalid_command", user_id, "override without message");
            return INVALID_COMMAND_REPLY.to_string();
        };

        match self.get(agent_id) {
            Some(agent) => {
                debug!(event_name = "agent.router.override", agent_id, user_id, "explicit agent selected");
                agent.process(user_id, rest).await.content
            }
            None => {
                warn!(event_name = "agent.router.unknown_agent", agent_id, user_id, "override names unknown agent");
                agent_not_found_reply(agent_id)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::{
        agent_not_found_reply, AgentRouter, FALLBACK_AGENT_ID, INVALID_COMMAND_REPLY,
        NO_AGENTS_REPLY, PROCESSING_FAILED_REPLY,
    };
    use crate::agent::{Agent, AgentResponse, AgentState};
    use crate::echo::EchoAgent;

    struct Canned {
        label: &'static str,
        calls: AtomicUsize,
        initialized: AtomicUsize,
    }

    impl Canned {
        fn new(label: &'static str) -> Arc<Self> {
            Arc::new(Self { label, calls: AtomicUsize::new(0), initialized: AtomicUsize::new(0) })
        }
    }

    #[async_trait]
    impl Agent for Canned {
        fn name(&self) -> &str {
            self.label
        }

        fn description(&self) -> &str {
            "canned replies"
        }

        fn kind(&self) -> &'static str {
            "Canned"
        }

        fn state(&self) -> AgentState {
            if self.initialized.load(Ordering::SeqCst) > 0 {
                AgentState::Ready
            } else {
                AgentState::Uninitialized
            }
        }

        async fn initialize(&self) {
            self.initialized.fetch_add(1, Ordering::SeqCst);
        }

        async fn process(&self, user_id: &str, message: &str) -> AgentResponse {
            self.calls.fetch_add(1, Ordering::SeqCst);
            AgentResponse::new(format!("{}[{user_id}]: {message}", self.label), 0.5)
        }
    }

    struct Exploding;

    #[async_trait]
    impl Agent for Exploding {
        fn name(&self) -> &str {
            "Exploding"
        }

        fn description(&self) -> &str {
            "panics on every message"
        }

        fn kind(&self) -> &'static str {
            "Exploding"
        }

        fn state(&self) -> AgentState {
            AgentState::Ready
        }

        async fn process(&self, _user_id: &str, _message: &str) -> AgentResponse {
            panic!("backend exploded");
        }
    }

    fn router_with_echo_and(default: Arc<dyn Agent>) -> AgentRouter {
        let mut router = AgentRouter::new();
        router.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
        router.register("llm", default);
        router
    }

    #[tokio::test]
    async fn override_returns_target_agent_content_verbatim() {
        let router = router_with_echo_and(Canned::new("llm"));

        for agent_id in ["echo", "llm"] {
            let expected = router
                .get(agent_id)
                .expect("registered")
                .process("U1", "track my parcel")
                .await
                .content;
            let routed = router.route_and_process("U1", &format!("/agent {agent_id} track my parcel")).await;
            assert_eq!(routed, expected);
        }
    }

    #[tokio::test]
    async fn override_splits_on_first_space_only() {
        let router = router_with_echo_and(Canned::new("llm"));

        let reply = router.route_and_process("U1", "/agent echo a  b c").await;

        assert_eq!(reply, "Echo: a  b c");
    }

    #[tokio::test]
    async fn override_with_unknown_agent_names_it() {
        let default = Canned::new("llm");
        let router = router_with_echo_and(default.clone());

        let reply = router.route_and_process("U1", "/agent unknown hi").await;

        assert_eq!(reply, agent_not_found_reply("unknown"));
        assert_eq!(reply, "Agent not found: unknown");
        assert_eq!(default.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn override_without_message_is_a_format_error() {
        let router = router_with_echo_and(Canned::new("llm"));

        assert_eq!(router.route_and_process("U1", "/agent onlyonepart").await, INVALID_COMMAND_REPLY);
        assert_eq!(router.route_and_process("U1", "/agent ").await, INVALID_COMMAND_REPLY);
    }

    #[tokio::test]
    async fn plain_message_goes_to_default_agent() {
        let default = Canned::new("llm");
        let router = router_with_echo_and(default.clone());

        let reply = router.route_and_process("U1", "hello").await;

        assert_eq!(reply, "llm[U1]: hello");
        assert_eq!(default.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn prefix_without_trailing_space_is_a_plain_message() {
        let router = router_with_echo_and(Canned::new("llm"));

        assert_eq!(router.route_and_process("U1", "/agentecho hi").await, "llm[U1]: /agentecho hi");
    }

    #[tokio::test]
    async fn missing_default_falls_back_to_echo() {
        let mut router = AgentRouter::new();
        router.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));

        assert_eq!(router.route_and_process("U1", "hello").await, "Echo: hello");
    }

    #[tokio::test]
    async fn empty_router_reports_no_agents() {
        let router = AgentRouter::new();

        assert!(router.is_empty());
        assert_eq!(router.route_and_process("U1", "hello").await, NO_AGENTS_REPLY);
    }

    #[tokio::test]
    async fn panicking_default_agent_yields_apology() {
        let router = router_with_echo_and(Arc::new(Exploding));

        assert_eq!(router.route_and_process("U1", "hello").await, PROCESSING_FAILED_REPLY);
        assert_eq!(router.route_and_process("U1", "/agent echo still here").await, "Echo: still here");
    }

    #[tokio::test]
    async fn configured_default_agent_id_is_honoured() {
        let mut router = AgentRouter::with_default_agent("support");
        router.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
        router.register("support", Canned::new("support"));

        assert_eq!(router.default_agent_id(), "support");
        assert_eq!(router.route_and_process("U9", "hi").await, "support[U9]: hi");
    }

    #[tokio::test]
    async fn reregistration_replaces_agent_in_place() {
        let mut router = AgentRouter::new();
        router.register("llm", Canned::new("first"));
        router.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
        router.register("llm", Canned::new("second"));

        let ids = router.list_agents().into_iter().map(|agent| agent.id).collect::<Vec<_>>();

        assert_eq!(ids, vec!["llm".to_string(), "echo".to_string()]);
        assert_eq!(router.len(), 2);
        assert_eq!(router.route_and_process("U1", "hi").await, "second[U1]: hi");
    }

    #[tokio::test]
    async fn initialize_all_reaches_every_agent() {
        let first = Canned::new("first");
        let second = Canned::new("second");
        let mut router = AgentRouter::new();
        router.register("first", first.clone());
        router.register("second", second.clone());

        router.initialize_all().await;

        assert_eq!(first.initialized.load(Ordering::SeqCst), 1);
        assert_eq!(second.initialized.load(Ordering::SeqCst), 1);
        assert!(router.list_agents().iter().all(|agent| agent.metadata.state == AgentState::Ready));
    }

    #[tokio::test]
    async fn process_with_exposes_confidence() {
        let router = router_with_echo_and(Canned::new("llm"));

        let response = router.process_with("echo", "U1", "hi").await.expect("echo registered");
        assert_eq!(response.content, "Echo: hi");
        assert_eq!(response.confidence, 1.0);
        assert!(router.process_with("missing", "U1", "hi").await.is_none());
    }

    #[test]
    fn registered_agent_serializes_flat() {
        let mut router = AgentRouter::new();
        router.register("echo", Arc::new(EchoAgent::new()));

        let json = serde_json::to_value(router.list_agents()).expect("serialize");

        assert_eq!(
            json,
            serde_json::json!([{
                "id": "echo",
                "name": "Echo Agent",
                "description": "Replies with the message it received",
                "type": "EchoAgent",
                "state": "ready"
            }])
        );
    }
}
