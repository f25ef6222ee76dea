//! LINE Messaging API channel
//!
//! - **Signatures** (`signature`) - `X-Line-Signature` HMAC verification
//! - **Events** (`events`) - webhook body parsing into typed events
//! - **Messaging** (`messaging`) - reply/push delivery client
//!
//! # Architecture
//!
//! ```text
//! POST /webhook → WebhookVerifier → LineEvent::TextMessage → (server) → MessagingApi
//! ```

pub mod events;
pub mod messaging;
pub mod signature;

pub use events::{parse_webhook, LineEvent, TextMessageEvent, WebhookError, WebhookVerifier};
pub use messaging::{DeliveryError, LineMessagingClient, MessagingApi};
pub use signature::verify_signature;
