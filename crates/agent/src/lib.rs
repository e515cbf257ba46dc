//! Conversational layer for Cartwise.
//!
//! - `conversation` classifies chat text into a [`ChatIntent`]
//! - `router` dispatches intents to the core estimators and the AI capability
//! - `llm` is the AI port plus its HTTP adapter
//! - `prompts` renders the AI prompts, `advice` the local fallbacks
//!
//! The AI capability only phrases answers. Restock dates, brand rankings and
//! usage statistics always come from `cartwise-core`.

pub mod advice;
pub mod conversation;
pub mod llm;
pub mod prompts;
pub mod router;

pub use conversation::{ChatIntent, IntentClassifier, UsageKind};
pub use llm::{build_client, AiUnavailableError, HttpLlmClient, LlmClient};
pub use router::{ChatReply, ChatRouter, RouterSettings};
