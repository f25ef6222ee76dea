//! Agents and message routing.
//!
//! Every inbound chat message ends up here as a `(user_id, text)` pair and
//! leaves as reply text:
//!
//! 1. **Routing** (`router`) - `/agent <id> <text>` overrides, otherwise the
//!    default agent with the echo agent as fallback
//! 2. **Agents** (`agent`, `echo`, `assistant`) - pluggable responders behind
//!    one trait; they never fail, they degrade to low-confidence replies
//! 3. **LLM backend** (`llm`) - chat-completion client with per-user history
//!
//! # Key Types
//!
//! - `AgentRouter` - registry and dispatch
//! - `Agent` - responder capability (`initialize`, `process`, `metadata`)
//! - `LlmClient` - seam between the assistant agent and its model backend

pub mod agent;
pub mod assistant;
pub mod echo;
pub mod llm;
pub mod router;

pub use agent::{Agent, AgentMetadata, AgentResponse, AgentState};
pub use assistant::LlmAgent;
pub use echo::EchoAgent;
pub use llm::{LlmClient, LlmSettings, OpenAiChatClient};
pub use router::{AgentRouter, RegisteredAgent, DEFAULT_AGENT_ID, FALLBACK_AGENT_ID};
