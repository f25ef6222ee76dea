use std::sync::Arc;

use linedesk_agent::{
    AgentRouter, EchoAgent, LlmAgent, LlmSettings, DEFAULT_AGENT_ID, FALLBACK_AGENT_ID,
};
use linedesk_core::config::{AppConfig, LoadOptions};
use linedesk_core::SenderRole;
use linedesk_store::{ConversationStore, InMemoryConversationStore};
use serde::Serialize;

use super::CommandResult;

#[derive(Debug, Serialize)]
struct ChatOutcome {
    command: &'static str,
    status: &'static str,
    reply: String,
    conversation_id: String,
    message_count: usize,
}

/// Sends `message` through the same routing and conversation tracking the
/// webhook uses, without delivering anything to LINE.
pub fn run(user_id: &str, message: &str) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure("chat", "config_validation", error.to_string(), 2);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "chat",
                "runtime",
                format!("failed to initialize async runtime: {error}"),
                1,
            );
        }
    };

    let outcome = runtime.block_on(async {
        let mut agents = AgentRouter::with_default_agent(DEFAULT_AGENT_ID);
        agents.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
        agents.register(DEFAULT_AGENT_ID, Arc::new(LlmAgent::new(LlmSettings::from(&config.llm))));
        agents.initialize_all().await;

        let store = InMemoryConversationStore::new();
        let conversation = store.get_active_conversation(user_id).await;
        store.add_message(&conversation.id, message, SenderRole::User).await;
        let reply = agents.route_and_process(user_id, message).await;
        store.add_message(&conversation.id, &reply, SenderRole::Bot).await;

        let message_count = store
            .get_conversation(&conversation.id)
            .await
            .map(|conversation| conversation.messages.len())
            .unwrap_or_default();

        ChatOutcome {
            command: "chat",
            status: "ok",
            reply,
            conversation_id: conversation.id.to_string(),
            message_count,
        }
    });

    CommandResult::with_payload(&outcome)
}
