//! LINE webhook ingress and the event worker behind it.
//!
//! The webhook handler only authenticates, parses and enqueues; each text
//! event is then handled on its own task by the worker, which joins every
//! task it spawns so failures and panics end up in the logs.

use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    routing::{get, post},
    Json, Router,
};
use linedesk_agent::AgentRouter;
use linedesk_core::{ApplicationError, DomainError, InterfaceError, SenderRole};
use linedesk_line::{LineEvent, MessagingApi, TextMessageEvent};
use linedesk_store::ConversationStore;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::{
    sync::mpsc,
    task::{JoinError, JoinHandle, JoinSet},
};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::api::{ApiError, AppState};

pub const SIGNATURE_HEADER: &str = "x-line-signature";
pub const EVENT_QUEUE_CAPACITY: usize = 256;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/linebot/webhook", post(webhook))
        .route("/api/v1/linebot/verify", get(verify))
        .route("/api/v1/linebot/test/push", post(test_push))
}

pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<Value>, ApiError> {
    let request_id = Uuid::new_v4().to_string();
    let signature = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
    info!(
        event_name = "ingress.line.webhook_received",
        correlation_id = %request_id,
        body_bytes = body.len(),
        "webhook delivery received"
    );

    let events = state.verifier.verify_and_parse(&body, signature).map_err(|error| {
        warn!(
            event_name = "ingress.line.webhook_rejected",
            correlation_id = %request_id,
            error = %error,
            "webhook delivery rejected"
        );
        InterfaceError::BadRequest { message: error.to_string(), correlation_id: request_id.clone() }
    })?;

    // A dead worker is reported before anything is queued, so a redelivered
    // batch never duplicates events that were already accepted.
    if !state.events.is_accepting() {
        error!(
            event_name = "ingress.line.worker_unavailable",
            correlation_id = %request_id,
            "event worker is not running; delivery refused"
        );
        return Err(ApplicationError::Integration("event worker is not running".to_string())
            .into_interface(&request_id)
            .into());
    }

    for event in events {
        match event {
            LineEvent::TextMessage(event) => {
                let event_id = event.correlation_id().to_string();
                if let Err(error) = state.events.enqueue(event).await {
                    error!(
                        event_name = "ingress.line.event_dropped",
                        correlation_id = %request_id,
                        event_id = %event_id,
                        error = %error,
                        "event could not be queued after the batch was accepted"
                    );
                }
            }
            LineEvent::Unsupported { event_type } => debug!(
                event_name = "ingress.line.event_ignored",
                correlation_id = %request_id,
                event_type = %event_type,
                "unsupported webhook event ignored"
            ),
        }
    }

    Ok(Json(json!({ "status": "ok" })))
}

pub async fn verify() -> Json<Value> {
    Json(json!({ "status": "ok", "message": "LINE Webhook URL is valid" }))
}

#[derive(Debug, Deserialize)]
pub struct PushRequest {
    pub user_id: String,
    pub message: String,
}

pub async fn test_push(
    State(state): State<AppState>,
    Json(request): Json<PushRequest>,
) -> Result<Json<Value>, ApiError> {
    let correlation_id = Uuid::new_v4().to_string();
    state.messaging.push_text(&request.user_id, &request.message).await.map_err(|error| {
        error!(
            event_name = "delivery.line.test_push_failed",
            correlation_id = %correlation_id,
            user_id = %request.user_id,
            error = %error,
            "manual push failed"
        );
        InterfaceError::Internal {
            message: format!("Failed to send message: {error}"),
            correlation_id: correlation_id.clone(),
        }
    })?;

    info!(
        event_name = "delivery.line.test_push_sent",
        correlation_id = %correlation_id,
        user_id = %request.user_id,
        "manual push delivered"
    );
    Ok(Json(json!({ "status": "ok" })))
}

/// Producer side of the event worker.
#[derive(Clone)]
pub struct EventQueue {
    sender: mpsc::Sender<TextMessageEvent>,
}

impl EventQueue {
    /// `false` once the worker has stopped receiving.
    pub fn is_accepting(&self) -> bool {
        !self.sender.is_closed()
    }

    pub async fn enqueue(&self, event: TextMessageEvent) -> Result<(), ApplicationError> {
        self.sender
            .send(event)
            .await
            .map_err(|_| ApplicationError::Integration("event worker is not running".to_string()))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    Reply,
    Push,
}

/// Runs one text message through conversation tracking, routing and delivery.
#[derive(Clone)]
pub struct EventProcessor {
    agents: Arc<AgentRouter>,
    conversations: Arc<dyn ConversationStore>,
    messaging: Arc<dyn MessagingApi>,
}

impl EventProcessor {
    pub fn new(
        agents: Arc<AgentRouter>,
        conversations: Arc<dyn ConversationStore>,
        messaging: Arc<dyn MessagingApi>,
    ) -> Self {
        Self { agents, conversations, messaging }
    }

    pub async fn handle(&self, event: &TextMessageEvent) -> Result<Delivery, ApplicationError> {
        let correlation_id = event.correlation_id();
        let conversation = self.conversations.get_active_conversation(&event.user_id).await;

        self.conversations
            .add_message(&conversation.id, &event.text, SenderRole::User)
            .await
            .ok_or(DomainError::UnknownConversation(conversation.id))?;

        let reply = self.agents.route_and_process(&event.user_id, &event.text).await;

        self.conversations
            .add_message(&conversation.id, &reply, SenderRole::Bot)
            .await
            .ok_or(DomainError::UnknownConversation(conversation.id))?;

        match self.messaging.reply_text(&event.reply_token, &reply).await {
            Ok(()) => Ok(Delivery::Reply),
            Err(reply_error) => {
                // Reply tokens expire; a push still reaches the user.
                warn!(
                    event_name = "delivery.line.reply_failed",
                    correlation_id,
                    user_id = %event.user_id,
                    error = %reply_error,
                    "reply failed, falling back to push"
                );
                self.messaging.push_text(&event.user_id, &reply).await.map_err(|push_error| {
                    ApplicationError::Delivery(format!(
                        "reply failed: {reply_error}; push failed: {push_error}"
                    ))
                })?;
                Ok(Delivery::Push)
            }
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerSummary {
    pub handled: usize,
    pub failed: usize,
}

type EventOutcome = (String, Result<Delivery, ApplicationError>);

impl WorkerSummary {
    fn record(&mut self, joined: Result<EventOutcome, JoinError>) {
        match joined {
            Ok((correlation_id, Ok(delivery))) => {
                self.handled += 1;
                debug!(
                    event_name = "worker.event.handled",
                    correlation_id = %correlation_id,
                    delivery = ?delivery,
                    "event handled"
                );
            }
            Ok((correlation_id, Err(error))) => {
                self.failed += 1;
                error!(
                    event_name = "worker.event.failed",
                    correlation_id = %correlation_id,
                    error = %error,
                    "event handling failed"
                );
            }
            Err(join_error) => {
                self.failed += 1;
                error!(
                    event_name = "worker.event.panicked",
                    panicked = join_error.is_panic(),
                    error = %join_error,
                    "event task did not complete"
                );
            }
        }
    }
}

/// Starts the worker. It stops once every `EventQueue` clone is dropped and
/// all in-flight events are finished; the handle yields what it processed.
pub fn spawn_event_worker(
    processor: EventProcessor,
    capacity: usize,
) -> (EventQueue, JoinHandle<WorkerSummary>) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    let handle = tokio::spawn(run_worker(processor, receiver));
    (EventQueue { sender }, handle)
}

async fn run_worker(
    processor: EventProcessor,
    mut receiver: mpsc::Receiver<TextMessageEvent>,
) -> WorkerSummary {
    let mut tasks: JoinSet<EventOutcome> = JoinSet::new();
    let mut summary = WorkerSummary::default();
    info!(event_name = "worker.started", "event worker started");

    loop {
        tokio::select! {
            received = receiver.recv() => match received {
                Some(event) => {
                    let processor = processor.clone();
                    tasks.spawn(async move {
                        let outcome = processor.handle(&event).await;
                        (event.correlation_id().to_string(), outcome)
                    });
                }
                None => break,
            },
            Some(joined) = tasks.join_next(), if !tasks.is_empty() => summary.record(joined),
        }
    }

    while let Some(joined) = tasks.join_next().await {
        summary.record(joined);
    }

    info!(
        event_name = "worker.stopped",
        handled = summary.handled,
        failed = summary.failed,
        "event worker drained"
    );
    summary
}
