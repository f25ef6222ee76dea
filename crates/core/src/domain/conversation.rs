use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::DomainError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ConversationId(pub Uuid);

impl ConversationId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ConversationId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for ConversationId {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(value.trim()).map(Self).map_err(|_| {
            DomainError::InvariantViolation(format!("`{value}` is not a valid conversation id"))
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MessageId {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Active,
    Closed,
}

/// Who authored a message inside a conversation.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderRole {
    User,
    Bot,
    Agent,
}

impl SenderRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Bot => "bot",
            Self::Agent => "agent",
        }
    }
}

impl std::str::FromStr for SenderRole {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Self::User),
            "bot" => Ok(Self::Bot),
            "agent" => Ok(Self::Agent),
            other => Err(DomainError::InvariantViolation(format!(
                "unsupported sender role `{other}` (expected user|bot|agent)"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub content: String,
    pub sender: SenderRole,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only log of messages between one user and the bot.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub user_id: String,
    pub start_time: DateTime<Utc>,
    pub end_time: Option<DateTime<Utc>>,
    pub status: ConversationStatus,
    pub messages: Vec<Message>,
}

impl Conversation {
    pub fn start(user_id: impl Into<String>) -> Self {
        Self {
            id: ConversationId::new(),
            user_id: user_id.into(),
            start_time: Utc::now(),
            end_time: None,
            status: ConversationStatus::Active,
            messages: Vec::new(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.status == ConversationStatus::Active
    }

    pub fn add_message(&mut self, content: impl Into<String>, sender: SenderRole) -> Message {
        let message = Message {
            id: MessageId::new(),
            conversation_id: self.id,
            content: content.into(),
            sender,
            timestamp: Utc::now(),
        };
        self.messages.push(message.clone());
        message
    }

    pub fn close(&mut self) {
        self.status = ConversationStatus::Closed;
        self.end_time = Some(Utc::now());
    }
}

#[cfg(test)]
mod tests {
    use super::{Conversation, ConversationId, ConversationStatus, SenderRole};

    #[test]
    fn new_conversation_starts_active_and_empty() {
        let conversation = Conversation::start("U1");

        assert_eq!(conversation.user_id, "U1");
        assert_eq!(conversation.status, ConversationStatus::Active);
        assert!(conversation.end_time.is_none());
        assert!(conversation.messages.is_empty());
    }

    #[test]
    fn messages_keep_insertion_order_and_parent_id() {
        let mut conversation = Conversation::start("U1");
        conversation.add_message("hi", SenderRole::User);
        conversation.add_message("hello!", SenderRole::Bot);

        let contents =
            conversation.messages.iter().map(|message| message.content.as_str()).collect::<Vec<_>>();
        assert_eq!(contents, vec!["hi", "hello!"]);
        assert!(conversation.messages.iter().all(|message| message.conversation_id == conversation.id));
        assert_eq!(conversation.messages[1].sender, SenderRole::Bot);
    }

    #[test]
    fn close_stamps_end_time() {
        let mut conversation = Conversation::start("U1");
        conversation.close();

        assert_eq!(conversation.status, ConversationStatus::Closed);
        assert!(conversation.end_time.is_some());
        assert!(!conversation.is_active());
    }

    #[test]
    fn sender_role_parses_known_values_only() {
        assert_eq!("Agent".parse::<SenderRole>().expect("agent role"), SenderRole::Agent);
        assert!("system".parse::<SenderRole>().is_err());
        for role in [SenderRole::User, SenderRole::Bot, SenderRole::Agent] {
            assert_eq!(role.as_str().parse::<SenderRole>().expect("own label parses"), role);
        }
    }

    #[test]
    fn conversation_id_round_trips_through_display() {
        let id = ConversationId::new();
        let parsed = id.to_string().parse::<ConversationId>().expect("valid id");
        assert_eq!(parsed, id);
        assert!("not-a-uuid".parse::<ConversationId>().is_err());
    }

    #[test]
    fn status_serializes_in_snake_case() {
        let json = serde_json::to_string(&ConversationStatus::Closed).expect("serialize");
        assert_eq!(json, "\"closed\"");
    }
}
