//! LLM client module
//!
//! Provides the minimal "chat with tools" contract the engine requires of
//! any backend, plus the Anthropic implementation.

use std::sync::Arc;

use tracing::debug;

mod anthropic;
pub mod client;
mod error;
mod types;

pub use anthropic::AnthropicClient;
pub use client::LlmClient;
pub use error::LlmError;
pub use types::{
    CompletionRequest, CompletionResponse, ContentBlock, Message, MessageContent, Role, StopReason, SystemBlock,
    TokenUsage, ToolCall, ToolDefinition,
};

use crate::config::LlmConfig;

/// Create an LLM client for a specific model and output-token cap
///
/// The cap is per tier (strong vs light), so callers pass the matching
/// field from config. Currently only the "anthropic" provider is
/// supported.
pub fn create_client(config: &LlmConfig, model: &str, max_tokens: u32) -> Result<Arc<dyn LlmClient>, LlmError> {
    debug!(provider = %config.provider, %model, max_tokens, "create_client: called");
    match config.provider.as_str() {
        "anthropic" => Ok(Arc::new(AnthropicClient::from_config(config, model, max_tokens)?)),
        other => Err(LlmError::InvalidResponse(format!(
            "Unknown LLM provider: '{}'. Supported: anthropic",
            other
        ))),
    }
}
