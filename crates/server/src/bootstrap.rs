use std::sync::Arc;

use linedesk_agent::{AgentRouter, EchoAgent, LlmAgent, LlmSettings, DEFAULT_AGENT_ID, FALLBACK_AGENT_ID};
use linedesk_core::config::{AppConfig, ConfigError};
use linedesk_line::{DeliveryError, LineMessagingClient, MessagingApi, WebhookVerifier};
use linedesk_store::InMemoryConversationStore;
use secrecy::SecretString;
use thiserror::Error;
use tracing::info;

pub struct Application {
    pub config: AppConfig,
    pub agents: Arc<AgentRouter>,
    pub conversations: Arc<InMemoryConversationStore>,
    pub messaging: Arc<dyn MessagingApi>,
    pub verifier: Arc<WebhookVerifier>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("LINE messaging client could not be built: {0}")]
    Messaging(#[source] DeliveryError),
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        app_env = %config.app.env,
        "starting application bootstrap"
    );
    config.require_line_credentials()?;

    let channel_secret: SecretString =
        config.line.channel_secret.clone().ok_or_else(|| {
            ConfigError::Validation("line.channel_secret is required".to_string())
        })?;
    let messaging = LineMessagingClient::new(
        &config.line.api_base_url,
        config.line.channel_access_token.clone(),
    )
    .map_err(BootstrapError::Messaging)?;

    let agents = build_agents(&config).await;
    info!(
        event_name = "system.bootstrap.agents_ready",
        correlation_id = "bootstrap",
        agent_count = agents.len(),
        "agents registered and initialized"
    );

    Ok(Application {
        config,
        agents: Arc::new(agents),
        conversations: Arc::new(InMemoryConversationStore::new()),
        messaging: Arc::new(messaging),
        verifier: Arc::new(WebhookVerifier::new(channel_secret)),
    })
}

/// Registers the echo agent and the LLM assistant, then initializes both.
/// A missing LLM key leaves the assistant `Failed`; it never aborts startup.
pub async fn build_agents(config: &AppConfig) -> AgentRouter {
    let mut agents = AgentRouter::with_default_agent(DEFAULT_AGENT_ID);
    agents.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
    agents.register(DEFAULT_AGENT_ID, Arc::new(LlmAgent::new(LlmSettings::from(&config.llm))));
    agents.initialize_all().await;
    agents
}
