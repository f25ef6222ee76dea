//! Conversation history - process-local message log per user
//!
//! The store exclusively owns every [`Conversation`] and [`Message`]; callers
//! receive cloned snapshots and refer back to conversations by id or user key.
//! Nothing is persisted: a restart loses all history.

use async_trait::async_trait;

use linedesk_core::domain::conversation::{Conversation, ConversationId, Message, SenderRole};

pub mod memory;

pub use memory::InMemoryConversationStore;

#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create_conversation(&self, user_id: &str) -> Conversation;

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Option<Conversation>;

    /// Returns the user's newest active conversation, creating one when none exists.
    async fn get_active_conversation(&self, user_id: &str) -> Conversation;

    /// Appends to the conversation; `None` when the id is unknown.
    async fn add_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        sender: SenderRole,
    ) -> Option<Message>;

    async fn close_conversation(&self, conversation_id: &ConversationId) -> bool;

    async fn get_user_conversations(&self, user_id: &str) -> Vec<Conversation>;
}
