pub mod config;
pub mod domain;
pub mod errors;

pub use domain::conversation::{
    Conversation, ConversationId, ConversationStatus, Message, MessageId, SenderRole,
};
pub use errors::{ApplicationError, DomainError, InterfaceError};
