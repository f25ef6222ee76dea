use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::Utc;
use linedesk_agent::{AgentState, RegisteredAgent};
use serde::Serialize;

use crate::api::AppState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ServiceInfo {
    pub name: &'static str,
    pub version: &'static str,
    pub status: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub agents: Vec<AgentHealth>,
    pub checked_at: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AgentHealth {
    pub id: String,
    pub state: AgentState,
}

impl From<RegisteredAgent> for AgentHealth {
    fn from(agent: RegisteredAgent) -> Self {
        Self { id: agent.id, state: agent.metadata.state }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct EchoResponse {
    pub message: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(root))
        .route("/api/v1/healthz", get(health))
        .route("/api/v1/echo/{message}", get(echo))
}

pub async fn root() -> Json<ServiceInfo> {
    Json(ServiceInfo {
        name: "LINE Customer Service API",
        version: env!("CARGO_PKG_VERSION"),
        status: "active",
    })
}

/// Liveness only: a `Failed` agent is reported but does not make the process unhealthy.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let payload = HealthResponse {
        status: "healthy",
        agents: state.agents.list_agents().into_iter().map(AgentHealth::from).collect(),
        checked_at: Utc::now().to_rfc3339(),
    };
    (StatusCode::OK, Json(payload))
}

pub async fn echo(Path(message): Path<String>) -> Json<EchoResponse> {
    Json(EchoResponse { message })
}
