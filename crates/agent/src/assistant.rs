use std::sync::{Arc, RwLock};

use anyhow::Result;
use async_trait::async_trait;
use secrecy::SecretString;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use crate::agent::{Agent, AgentResponse, AgentState};
use crate::llm::{LlmClient, LlmSettings, OpenAiChatClient};

pub const NOT_READY_REPLY: &str = "The assistant is not ready yet, please try again later.";
pub const FAILURE_REPLY: &str =
    "Sorry, an error occurred while handling your request. Please try again later.";

const ANSWER_CONFIDENCE: f32 = 0.9;

pub type ClientFactory =
    Box<dyn Fn(&LlmSettings, SecretString) -> Result<Arc<dyn LlmClient>> + Send + Sync>;

#[derive(Clone)]
enum ClientSlot {
    Uninitialized,
    Ready(Arc<dyn LlmClient>),
    /// Terminal: no key, no retry.
    MissingKey,
    /// Cleared by the next `initialize` call.
    ConstructionFailed,
}

/// Customer-service agent backed by a chat-completion model.
///
/// A missing API key leaves the agent `Failed` for the rest of the process.
/// A client that could not be built is retried on the next `initialize`, and
/// `process` attempts that retry before answering.
pub struct LlmAgent {
    settings: LlmSettings,
    factory: ClientFactory,
    slot: RwLock<ClientSlot>,
    init_lock: Mutex<()>,
}

impl LlmAgent {
    pub fn new(settings: LlmSettings) -> Self {
        Self::with_factory(
            settings,
            Box::new(|settings: &LlmSettings, api_key: SecretString| -> Result<Arc<dyn LlmClient>> {
                let client: Arc<dyn LlmClient> = Arc::new(OpenAiChatClient::new(settings, api_key)?);
                Ok(client)
            }),
        )
    }

    pub fn with_factory(settings: LlmSettings, factory: ClientFactory) -> Self {
        Self {
            settings,
            factory,
            slot: RwLock::new(ClientSlot::Uninitialized),
            init_lock: Mutex::new(()),
        }
    }

    fn slot(&self) -> ClientSlot {
        match self.slot.read() {
            Ok(slot) => slot.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn set_slot(&self, next: ClientSlot) {
        match self.slot.write() {
            Ok(mut slot) => *slot = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    fn build_client(&self) -> ClientSlot {
        let Some(api_key) = self.settings.usable_api_key() else {
            error!(
                event_name = "agent.llm.init_failed",
                reason = "missing_api_key",
                "llm api key is not configured; assistant agent disabled"
            );
            return ClientSlot::MissingKey;
        };

        match (self.factory)(&self.settings, api_key.clone()) {
            Ok(client) => {
                info!(
                    event_name = "agent.llm.ready",
                    model = %self.settings.model,
                    "assistant agent initialized"
                );
                ClientSlot::Ready(client)
            }
            Err(error) => {
                error!(
                    event_name = "agent.llm.init_failed",
                    reason = "client_construction",
                    error = %format!("{error:#}"),
                    "could not build llm client; initialize will retry on the next call"
                );
                ClientSlot::ConstructionFailed
            }
        }
    }
}

#[async_trait]
impl Agent for LlmAgent {
    fn name(&self) -> &str {
        "Assistant Agent"
    }

    fn description(&self) -> &str {
        "Customer-service assistant backed by a chat-completion model"
    }

    fn kind(&self) -> &'static str {
        "LlmAgent"
    }

    fn state(&self) -> AgentState {
        match self.slot() {
            ClientSlot::Uninitialized => AgentState::Uninitialized,
            ClientSlot::Ready(_) => AgentState::Ready,
            ClientSlot::MissingKey | ClientSlot::ConstructionFailed => AgentState::Failed,
        }
    }

    async fn initialize(&self) {
        let _guard = self.init_lock.lock().await;
        if matches!(self.slot(), ClientSlot::Ready(_) | ClientSlot::MissingKey) {
            return;
        }
        let next = self.build_client();
        self.set_slot(next);
    }

    async fn process(&self, user_id: &str, message: &str) -> AgentResponse {
        if matches!(self.slot(), ClientSlot::ConstructionFailed) {
            self.initialize().await;
        }

        let ClientSlot::Ready(client) = self.slot() else {
            warn!(
                event_name = "agent.llm.not_ready",
                user_id,
                state = ?self.state(),
                "assistant agent is not ready; request not processed"
            );
            return AgentResponse::degraded(NOT_READY_REPLY);
        };

        debug!(event_name = "agent.llm.process", user_id, "forwarding message to llm backend");
        match client.complete(user_id, user_id, message).await {
            Ok(content) => AgentResponse::new(content, ANSWER_CONFIDENCE),
            Err(error) => {
                error!(
                    event_name = "agent.llm.process_failed",
                    user_id,
                    error = %format!("{error:#}"),
                    "llm backend call failed"
                );
                AgentResponse::degraded(FAILURE_REPLY)
            }
        }
    }
}
