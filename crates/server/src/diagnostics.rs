//! Operator endpoints: agent registry, direct agent calls and conversation logs.
//! None of these deliver anything to LINE.

use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use linedesk_agent::RegisteredAgent;
use linedesk_core::{ApplicationError, Conversation, DomainError};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use crate::api::{ApiError, AppState};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/agents", get(list_agents))
        .route("/api/v1/agents/test", post(test_agent))
        .route("/api/v1/conversations/{user_id}", get(user_conversations))
}

pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<RegisteredAgent>> {
    Json(state.agents.list_agents())
}

#[derive(Debug, Deserialize)]
pub struct AgentTestRequest {
    pub user_id: String,
    pub message: String,
    #[serde(default)]
    pub agent_id: Option<String>,
}

#[derive(Debug, PartialEq, Serialize)]
pub struct AgentTestResponse {
    pub agent_id: String,
    pub content: String,
    pub confidence: f32,
}

pub async fn test_agent(
    State(state): State<AppState>,
    Json(request): Json<AgentTestRequest>,
) -> Result<Json<AgentTestResponse>, ApiError> {
    let agent_id =
        request.agent_id.unwrap_or_else(|| state.agents.default_agent_id().to_string());

    let response = state
        .agents
        .process_with(&agent_id, &request.user_id, &request.message)
        .await
        .ok_or_else(|| {
            ApplicationError::from(DomainError::UnknownAgent(agent_id.clone()))
                .into_interface(Uuid::new_v4().to_string())
        })?;

    info!(
        event_name = "diagnostics.agent.tested",
        agent_id = %agent_id,
        user_id = %request.user_id,
        confidence = response.confidence,
        "agent invoked directly"
    );
    Ok(Json(AgentTestResponse { agent_id, content: response.content, confidence: response.confidence }))
}

pub async fn user_conversations(
    State(state): State<AppState>,
    Path(user_id): Path<String>,
) -> Json<Vec<Conversation>> {
    Json(state.conversations.get_user_conversations(&user_id).await)
}

#[cfg(test)]
mod tests {
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use linedesk_core::SenderRole;
    use linedesk_store::ConversationStore;
    use serde_json::json;
    use tower::ServiceExt;

    use crate::testing::{read_json, TestHarness};

    fn agent_test(body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/api/v1/agents/test")
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .expect("request")
    }

    #[tokio::test]
    async fn agents_are_listed_in_registration_order() {
        let harness = TestHarness::new();

        let response = harness
            .app()
            .oneshot(Request::builder().uri("/api/v1/agents").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload[0]["id"], "echo");
        assert_eq!(payload[0]["type"], "EchoAgent");
        assert_eq!(payload[0]["state"], "ready");
    }

    #[tokio::test]
    async fn named_agent_returns_content_and_confidence() {
        let harness = TestHarness::new();

        let response = harness
            .app()
            .oneshot(agent_test(json!({ "user_id": "U1", "message": "hi", "agent_id": "echo" })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            read_json(response).await,
            json!({ "agent_id": "echo", "content": "Echo: hi", "confidence": 1.0 })
        );
        assert!(harness.messaging.sent().is_empty());
        assert!(harness.store.get_user_conversations("U1").await.is_empty());
    }

    #[tokio::test]
    async fn omitted_agent_uses_default_id_which_may_be_missing() {
        let harness = TestHarness::new();

        let response = harness
            .app()
            .oneshot(agent_test(json!({ "user_id": "U1", "message": "hi" })))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let payload = read_json(response).await;
        assert!(payload["error"].as_str().unwrap_or_default().contains("llm"));
    }

    #[tokio::test]
    async fn conversation_log_is_exposed_per_user() {
        let harness = TestHarness::new();
        let conversation = harness.store.get_active_conversation("U5").await;
        harness.store.add_message(&conversation.id, "hello", SenderRole::User).await;

        let response = harness
            .app()
            .oneshot(Request::builder().uri("/api/v1/conversations/U5").body(Body::empty()).expect("request"))
            .await
            .expect("response");

        assert_eq!(response.status(), StatusCode::OK);
        let payload = read_json(response).await;
        assert_eq!(payload[0]["user_id"], "U5");
        assert_eq!(payload[0]["messages"][0]["content"], "hello");
        assert_eq!(payload[0]["messages"][0]["sender"], "user");
    }
}
