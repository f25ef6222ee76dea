use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

use crate::signature::verify_signature;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LineEvent {
    TextMessage(TextMessageEvent),
    Unsupported { event_type: String },
}

impl LineEvent {
    pub fn event_type(&self) -> &str {
        match self {
            Self::TextMessage(_) => "message",
            Self::Unsupported { event_type } => event_type,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TextMessageEvent {
    pub webhook_event_id: Option<String>,
    pub reply_token: String,
    pub user_id: String,
    pub message_id: String,
    pub text: String,
    pub timestamp: i64,
}

impl TextMessageEvent {
    /// Id used to correlate log lines for this event.
    pub fn correlation_id(&self) -> &str {
        self.webhook_event_id.as_deref().unwrap_or(&self.message_id)
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum WebhookError {
    #[error("X-Line-Signature header is missing")]
    MissingSignature,
    #[error("Invalid signature")]
    InvalidSignature,
    #[error("malformed webhook body: {0}")]
    Malformed(String),
}

#[derive(Debug, Deserialize)]
struct WebhookBody {
    events: Vec<RawEvent>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawEvent {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    timestamp: i64,
    #[serde(default)]
    webhook_event_id: Option<String>,
    #[serde(default)]
    reply_token: Option<String>,
    #[serde(default)]
    source: Option<RawSource>,
    #[serde(default)]
    message: Option<RawMessage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSource {
    #[serde(default)]
    user_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    id: String,
    #[serde(rename = "type")]
    message_type: String,
    #[serde(default)]
    text: Option<String>,
}

impl RawEvent {
    fn into_event(self) -> LineEvent {
        if self.event_type != "message" {
            return LineEvent::Unsupported { event_type: self.event_type };
        }

        let user_id = self.source.and_then(|source| source.user_id);
        match (self.message, user_id, self.reply_token) {
            (Some(message), Some(user_id), Some(reply_token)) if message.message_type == "text" => {
                LineEvent::TextMessage(TextMessageEvent {
                    webhook_event_id: self.webhook_event_id,
                    reply_token,
                    user_id,
                    message_id: message.id,
                    text: message.text.unwrap_or_default(),
                    timestamp: self.timestamp,
                })
            }
            (Some(message), _, _) if message.message_type != "text" => {
                LineEvent::Unsupported { event_type: format!("message.{}", message.message_type) }
            }
            _ => LineEvent::Unsupported { event_type: self.event_type },
        }
    }
}

/// Parses a webhook request body into events, in delivery order.
pub fn parse_webhook(body: &[u8]) -> Result<Vec<LineEvent>, WebhookError> {
    let payload: WebhookBody = serde_json::from_slice(body)
        .map_err(|error| WebhookError::Malformed(error.to_string()))?;

    Ok(payload.events.into_iter().map(RawEvent::into_event).collect())
}

/// Authenticates and decodes webhook deliveries for one channel.
#[derive(Clone)]
pub struct WebhookVerifier {
    channel_secret: SecretString,
}

impl WebhookVerifier {
    pub fn new(channel_secret: SecretString) -> Self {
        Self { channel_secret }
    }

    pub fn verify_and_parse(
        &self,
        body: &[u8],
        signature: Option<&str>,
    ) -> Result<Vec<LineEvent>, WebhookError> {
        let signature = signature.ok_or(WebhookError::MissingSignature)?;
        if !verify_signature(body, signature, self.channel_secret.expose_secret()) {
            debug!(event_name = "ingress.line.signature_rejected", "webhook signature mismatch");
            return Err(WebhookError::InvalidSignature);
        }
        parse_webhook(body)
    }
}
