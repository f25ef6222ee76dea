use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};

/// LINE rejects text messages longer than this many characters.
pub const MAX_TEXT_CHARS: usize = 5000;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("LINE channel access token is not configured")]
    MissingCredentials,
    #[error("LINE API request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("LINE API returned HTTP {status}: {body}")]
    Api { status: u16, body: String },
}

/// Outbound half of the LINE channel.
#[async_trait]
pub trait MessagingApi: Send + Sync {
    /// Answers a webhook event. Reply tokens are single-use and expire quickly.
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), DeliveryError>;

    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), DeliveryError>;
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReplyRequest<'a> {
    reply_token: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct PushRequest<'a> {
    to: &'a str,
    messages: [TextMessage<'a>; 1],
}

#[derive(Debug, Serialize)]
struct TextMessage<'a> {
    #[serde(rename = "type")]
    kind: &'static str,
    text: &'a str,
}

impl<'a> TextMessage<'a> {
    fn new(text: &'a str) -> Self {
        Self { kind: "text", text: truncate_text(text) }
    }
}

/// Cuts `text` to at most `MAX_TEXT_CHARS` characters on a char boundary.
pub fn truncate_text(text: &str) -> &str {
    match text.char_indices().nth(MAX_TEXT_CHARS) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

/// `MessagingApi` over the LINE Messaging API (`/v2/bot/message/*`).
pub struct LineMessagingClient {
    http: Client,
    api_base_url: String,
    channel_access_token: Option<SecretString>,
}

impl LineMessagingClient {
    pub fn new(
        api_base_url: &str,
        channel_access_token: Option<SecretString>,
    ) -> Result<Self, DeliveryError> {
        let http = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        Ok(Self {
            http,
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            channel_access_token: channel_access_token
                .filter(|token| !token.expose_secret().trim().is_empty()),
        })
    }

    pub fn has_credentials(&self) -> bool {
        self.channel_access_token.is_some()
    }

    async fn post<T: Serialize + Sync>(&self, path: &str, payload: &T) -> Result<(), DeliveryError> {
        let token = self.channel_access_token.as_ref().ok_or(DeliveryError::MissingCredentials)?;

        let response = self
            .http
            .post(format!("{}{path}", self.api_base_url))
            .bearer_auth(token.expose_secret())
            .json(payload)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            debug!(event_name = "delivery.line.sent", path, status = status.as_u16(), "LINE API accepted message");
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        warn!(
            event_name = "delivery.line.rejected",
            path,
            status = status.as_u16(),
            body = %body,
            "LINE API rejected message"
        );
        Err(DeliveryError::Api { status: status.as_u16(), body })
    }
}

#[async_trait]
impl MessagingApi for LineMessagingClient {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), DeliveryError> {
        let payload = ReplyRequest { reply_token, messages: [TextMessage::new(text)] };
        self.post("/v2/bot/message/reply", &payload).await
    }

    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        let payload = PushRequest { to: user_id, messages: [TextMessage::new(text)] };
        self.post("/v2/bot/message/push", &payload).await
    }
}

#[cfg(test)]
mod tests {
    use mockito::Matcher;
    use serde_json::json;

    use super::{truncate_text, DeliveryError, LineMessagingClient, MessagingApi, MAX_TEXT_CHARS};

    fn client(base_url: &str) -> LineMessagingClient {
        LineMessagingClient::new(base_url, Some("line-token".to_string().into()))
            .expect("client should build")
    }

    #[tokio::test]
    async fn reply_posts_token_and_text_with_bearer_auth() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/bot/message/reply")
            .match_header("authorization", "Bearer line-token")
            .match_body(Matcher::Json(json!({
                "replyToken": "reply-1",
                "messages": [{ "type": "text", "text": "Echo: hi" }]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&server.url()).reply_text("reply-1", "Echo: hi").await.expect("reply accepted");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn push_addresses_user_id() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/v2/bot/message/push")
            .match_body(Matcher::Json(json!({
                "to": "U1",
                "messages": [{ "type": "text", "text": "ping" }]
            })))
            .with_status(200)
            .with_body("{}")
            .create_async()
            .await;

        client(&format!("{}/", server.url())).push_text("U1", "ping").await.expect("push accepted");

        mock.assert_async().await;
    }

    #[tokio::test]
    async fn api_errors_carry_status_and_body() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/v2/bot/message/reply")
            .with_status(400)
            .with_body(r#"{"message":"Invalid reply token"}"#)
            .create_async()
            .await;

        let error = client(&server.url()).reply_text("expired", "hi").await.expect_err("400");

        match error {
            DeliveryError::Api { status, body } => {
                assert_eq!(status, 400);
                assert!(body.contains("Invalid reply token"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn missing_token_fails_without_request() {
        let mut server = mockito::Server::new_async().await;
        let mock = server.mock("POST", Matcher::Any).expect(0).create_async().await;

        let client = LineMessagingClient::new(&server.url(), Some("  ".to_string().into()))
            .expect("client should build");

        assert!(!client.has_credentials());
        assert!(matches!(client.push_text("U1", "hi").await, Err(DeliveryError::MissingCredentials)));
        mock.assert_async().await;
    }

    #[test]
    fn long_text_is_cut_on_char_boundary() {
        let long = "é".repeat(MAX_TEXT_CHARS + 10);

        let truncated = truncate_text(&long);

        assert_eq!(truncated.chars().count(), MAX_TEXT_CHARS);
        assert_eq!(truncate_text("short"), "short");
        let exact = "a".repeat(MAX_TEXT_CHARS);
        assert_eq!(truncate_text(&exact).len(), MAX_TEXT_CHARS);
    }
}
