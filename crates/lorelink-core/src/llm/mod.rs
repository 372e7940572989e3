//! LLM integration - OpenRouter API
//!
//! Used only to disambiguate relationship types the rule cascade cannot
//! decide on its own.
//!
//! - `client`: one request per ambiguous pair, with bounded 429 backoff
//! - `types`: the slice of the chat-completions format a classification uses
//! - `classifier`: the [`TypeClassifier`](crate::prediction::TypeClassifier) over the client

mod classifier;
mod client;
mod types;

pub use classifier::LlmTypeClassifier;
pub use client::LlmClient;
pub use types::{Answer, Message, MessageRole};
