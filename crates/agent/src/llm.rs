use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use linedesk_core::config::LlmConfig;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::debug;

const ASSISTANT_DESCRIPTION: &str =
    "You are a friendly customer service assistant who answers users' questions.";
const ASSISTANT_INSTRUCTIONS: [&str; 3] = [
    "Reply politely.",
    "If you are not sure about an answer, say so honestly.",
    "Keep answers short and clear.",
];

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Completes `message` within the backend session `session_id`.
    async fn complete(&self, session_id: &str, user_id: &str, message: &str) -> Result<String>;
}

#[derive(Clone, Debug)]
pub struct LlmSettings {
    pub api_key: Option<SecretString>,
    pub base_url: String,
    pub model: String,
    pub timeout: Duration,
    pub history_turns: usize,
}

impl From<&LlmConfig> for LlmSettings {
    fn from(config: &LlmConfig) -> Self {
        Self {
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            timeout: Duration::from_secs(config.timeout_secs),
            history_turns: config.history_turns,
        }
    }
}

impl LlmSettings {
    /// The configured key, if it is present and not blank.
    pub fn usable_api_key(&self) -> Option<&SecretString> {
        self.api_key.as_ref().filter(|key| !key.expose_secret().trim().is_empty())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct ChatTurn {
    user: String,
    assistant: String,
}

/// Client for OpenAI-compatible `/chat/completions` endpoints.
///
/// Keeps the last `history_turns` exchanges per session so each user gets
/// their own running context on the backend side of the agent.
pub struct OpenAiChatClient {
    http: Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    history_turns: usize,
    sessions: Mutex<HashMap<String, VecDeque<ChatTurn>>>,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    user: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiChatClient {
    pub fn new(settings: &LlmSettings, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.timeout)
            .build()
            .context("failed to build llm http client")?;

        Ok(Self {
            http,
            api_key,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
            model: settings.model.clone(),
            history_turns: settings.history_turns,
            sessions: Mutex::new(HashMap::new()),
        })
    }

    #[cfg(test)]
    pub(crate) async fn session_len(&self, session_id: &str) -> usize {
        self.sessions.lock().await.get(session_id).map(VecDeque::len).unwrap_or(0)
    }

    fn system_prompt() -> String {
        let mut prompt = String::from(ASSISTANT_DESCRIPTION);
        for instruction in ASSISTANT_INSTRUCTIONS {
            prompt.push_str("\n- ");
            prompt.push_str(instruction);
        }
        prompt
    }

    async fn remember(&self, session_id: &str, user: &str, assistant: &str) {
        if self.history_turns == 0 {
            return;
        }

        let mut sessions = self.sessions.lock().await;
        let turns = sessions.entry(session_id.to_string()).or_default();
        turns.push_back(ChatTurn { user: user.to_string(), assistant: assistant.to_string() });
        while turns.len() > self.history_turns {
            turns.pop_front();
        }
    }
}

#[async_trait]
impl LlmClient for OpenAiChatClient {
    async fn complete(&self, session_id: &str, user_id: &str, message: &str) -> Result<String> {
        let history =
            self.sessions.lock().await.get(session_id).cloned().unwrap_or_default();
        let system_prompt = Self::system_prompt();

        let mut messages = Vec::with_capacity(history.len() * 2 + 2);
        messages.push(ChatMessage { role: "system", content: &system_prompt });
        for turn in &history {
            messages.push(ChatMessage { role: "user", content: &turn.user });
            messages.push(ChatMessage { role: "assistant", content: &turn.assistant });
        }
        messages.push(ChatMessage { role: "user", content: message });

        let request = ChatRequest { model: &self.model, messages, user: user_id };
        debug!(
            event_name = "agent.llm.request",
            model = %self.model,
            session_id,
            history_turns = history.len(),
            "sending chat completion request"
        );

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(self.api_key.expose_secret())
            .json(&request)
            .send()
            .await
            .context("chat completion request failed")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("chat completion returned HTTP {status}: {body}");
        }

        let payload =
            response.json::<ChatResponse>().await.context("chat completion body was not valid")?;
        let content = payload
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|content| !content.trim().is_empty())
            .ok_or_else(|| anyhow!("chat completion contained no message content"))?;

        self.remember(session_id, message, &content).await;
        Ok(content)
    }
}
