use std::sync::Arc;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json, Router,
};
use linedesk_agent::AgentRouter;
use linedesk_core::InterfaceError;
use linedesk_line::{MessagingApi, WebhookVerifier};
use linedesk_store::ConversationStore;
use serde::Serialize;
use tower_http::cors::{Any, CorsLayer};

use crate::{diagnostics, gateway, gateway::EventQueue, health};

/// Shared handles for every HTTP handler.
#[derive(Clone)]
pub struct AppState {
    pub agents: Arc<AgentRouter>,
    pub conversations: Arc<dyn ConversationStore>,
    pub messaging: Arc<dyn MessagingApi>,
    pub verifier: Arc<WebhookVerifier>,
    pub events: EventQueue,
}

#[derive(Debug)]
pub struct ApiError(pub InterfaceError);

impl From<InterfaceError> for ApiError {
    fn from(error: InterfaceError) -> Self {
        Self(error)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    correlation_id: &'a str,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self.0 {
            InterfaceError::BadRequest { message, .. } => (StatusCode::BAD_REQUEST, message),
            InterfaceError::NotFound { message, .. } => (StatusCode::NOT_FOUND, message),
            InterfaceError::ServiceUnavailable { message, .. } => {
                (StatusCode::SERVICE_UNAVAILABLE, message)
            }
            InterfaceError::Internal { message, .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };

        let body = ErrorBody { error: message, correlation_id: self.0.correlation_id() };
        (status, Json(body)).into_response()
    }
}

/// Any origin may call the API; the webhook is still guarded by its signature.
fn cors_layer() -> CorsLayer {
    CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(health::routes())
        .merge(gateway::routes())
        .merge(diagnostics::routes())
        .layer(cors_layer())
        .with_state(state)
}
