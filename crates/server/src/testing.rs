use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{body::to_bytes, response::Response, Router};
use linedesk_agent::{AgentRouter, EchoAgent, FALLBACK_AGENT_ID};
use linedesk_line::{DeliveryError, MessagingApi, TextMessageEvent, WebhookVerifier};
use linedesk_store::InMemoryConversationStore;
use serde_json::Value;
use tokio::task::JoinHandle;

use crate::api::{router, AppState};
use crate::gateway::{spawn_event_worker, EventProcessor, WorkerSummary};

pub const CHANNEL_SECRET: &str = "test-channel-secret";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Sent {
    Reply(String, String),
    Push(String, String),
}

#[derive(Default)]
pub struct FakeMessaging {
    sent: Mutex<Vec<Sent>>,
    fail_replies: AtomicBool,
    fail_pushes: AtomicBool,
}

impl FakeMessaging {
    pub fn sent(&self) -> Vec<Sent> {
        self.sent.lock().expect("sent lock").clone()
    }

    pub fn fail_replies(&self) {
        self.fail_replies.store(true, Ordering::SeqCst);
    }

    pub fn fail_pushes(&self) {
        self.fail_pushes.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MessagingApi for FakeMessaging {
    async fn reply_text(&self, reply_token: &str, text: &str) -> Result<(), DeliveryError> {
        if self.fail_replies.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api { status: 400, body: "Invalid reply token".to_string() });
        }
        self.sent.lock().expect("sent lock").push(Sent::Reply(reply_token.into(), text.into()));
        Ok(())
    }

    async fn push_text(&self, user_id: &str, text: &str) -> Result<(), DeliveryError> {
        if self.fail_pushes.load(Ordering::SeqCst) {
            return Err(DeliveryError::Api { status: 500, body: "upstream down".to_string() });
        }
        self.sent.lock().expect("sent lock").push(Sent::Push(user_id.into(), text.into()));
        Ok(())
    }
}

/// App wired with only the echo agent, an in-memory store and a recording messenger.
pub struct TestHarness {
    pub agents: Arc<AgentRouter>,
    pub store: Arc<InMemoryConversationStore>,
    pub messaging: Arc<FakeMessaging>,
    state: Mutex<Option<AppState>>,
    worker: Mutex<Option<JoinHandle<WorkerSummary>>>,
}

impl TestHarness {
    pub fn new() -> Self {
        Self::with_messaging(Arc::new(FakeMessaging::default()))
    }

    pub fn with_messaging(messaging: Arc<FakeMessaging>) -> Self {
        let mut agents = AgentRouter::new();
        agents.register(FALLBACK_AGENT_ID, Arc::new(EchoAgent::new()));
        let agents = Arc::new(agents);
        let store = Arc::new(InMemoryConversationStore::new());

        let processor = EventProcessor::new(agents.clone(), store.clone(), messaging.clone());
        let (events, worker) = spawn_event_worker(processor, 16);
        let state = AppState {
            agents: agents.clone(),
            conversations: store.clone(),
            messaging: messaging.clone(),
            verifier: Arc::new(WebhookVerifier::new(CHANNEL_SECRET.to_string().into())),
            events,
        };

        Self {
            agents,
            store,
            messaging,
            state: Mutex::new(Some(state)),
            worker: Mutex::new(Some(worker)),
        }
    }

    pub fn app(&self) -> Router {
        let state = self.state.lock().expect("state lock").clone().expect("harness not drained");
        router(state)
    }

    /// Closes the event queue and waits for the worker to finish everything queued.
    pub async fn drain(&self) -> WorkerSummary {
        self.state.lock().expect("state lock").take();
        let worker = self.worker.lock().expect("worker lock").take().expect("worker running");
        worker.await.expect("worker joined")
    }
}

pub fn text_event(user_id: &str, text: &str) -> TextMessageEvent {
    TextMessageEvent {
        webhook_event_id: Some(format!("evt-{user_id}")),
        reply_token: format!("reply-{user_id}"),
        user_id: user_id.to_string(),
        message_id: "1".to_string(),
        text: text.to_string(),
        timestamp: 0,
    }
}

pub async fn read_json(response: Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
    serde_json::from_slice(&bytes).expect("json body")
}
