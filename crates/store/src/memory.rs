use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::debug;

use linedesk_core::domain::conversation::{Conversation, ConversationId, Message, SenderRole};

use super::ConversationStore;

#[derive(Default)]
pub struct InMemoryConversationStore {
    state: RwLock<StoreState>,
}

#[derive(Default)]
struct StoreState {
    conversations: HashMap<ConversationId, Conversation>,
    user_conversations: HashMap<String, Vec<ConversationId>>,
}

impl StoreState {
    fn create(&mut self, user_id: &str) -> Conversation {
        let conversation = Conversation::start(user_id);
        self.user_conversations.entry(user_id.to_string()).or_default().push(conversation.id);
        self.conversations.insert(conversation.id, conversation.clone());

        debug!(
            event_name = "store.conversation.created",
            conversation_id = %conversation.id,
            user_id,
            "conversation created"
        );
        conversation
    }

    fn newest_active(&self, user_id: &str) -> Option<&Conversation> {
        self.user_conversations
            .get(user_id)?
            .iter()
            .rev()
            .filter_map(|id| self.conversations.get(id))
            .find(|conversation| conversation.is_active())
    }
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }
}

#[async_trait::async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create_conversation(&self, user_id: &str) -> Conversation {
        let mut state = self.state.write().await;
        state.create(user_id)
    }

    async fn get_conversation(&self, conversation_id: &ConversationId) -> Option<Conversation> {
        let state = self.state.read().await;
        state.conversations.get(conversation_id).cloned()
    }

    async fn get_active_conversation(&self, user_id: &str) -> Conversation {
        {
            let state = self.state.read().await;
            if let Some(conversation) = state.newest_active(user_id) {
                return conversation.clone();
            }
        }

        // Re-check under the write lock so concurrent first contacts share one conversation.
        let mut state = self.state.write().await;
        if let Some(conversation) = state.newest_active(user_id) {
            return conversation.clone();
        }
        state.create(user_id)
    }

    async fn add_message(
        &self,
        conversation_id: &ConversationId,
        content: &str,
        sender: SenderRole,
    ) -> Option<Message> {
        let mut state = self.state.write().await;
        let Some(conversation) = state.conversations.get_mut(conversation_id) else {
            debug!(
                event_name = "store.message.unknown_conversation",
                conversation_id = %conversation_id,
                "message dropped for unknown conversation"
            );
            return None;
        };

        let message = conversation.add_message(content, sender);
        debug!(
            event_name = "store.message.appended",
            conversation_id = %conversation_id,
            sender = sender.as_str(),
            message_count = conversation.messages.len(),
            "message appended"
        );
        Some(message)
    }

    async fn close_conversation(&self, conversation_id: &ConversationId) -> bool {
        let mut state = self.state.write().await;
        match state.conversations.get_mut(conversation_id) {
            Some(conversation) => {
                conversation.close();
                true
            }
            None => false,
        }
    }

    async fn get_user_conversations(&self, user_id: &str) -> Vec<Conversation> {
        let state = self.state.read().await;
        state
            .user_conversations
            .get(user_id)
            .map(|ids| ids.iter().filter_map(|id| state.conversations.get(id).cloned()).collect())
            .unwrap_or_default()
    }
}
