//! Proxy module
//!
//! Forwards authenticated, metered chat turns to the hosted completion API.

pub mod gateway;
pub mod handlers;
pub mod provider;

pub use gateway::{ChatDefaults, ChatGateway, ChatOutcome, ChatRequest};
pub use provider::{ChatTurn, Completion, CompletionProvider, CompletionRequest, Role, TogetherProvider};
