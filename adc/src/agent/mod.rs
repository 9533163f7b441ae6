//! Agent invocation engine
//!
//! One agent invocation = identity + prompt + workspace, driven through
//! the LLM tool-use loop to a final text response with full token
//! accounting.

mod identity;
mod runner;

pub use identity::{AgentId, Tier, TierTable};
pub use runner::{AgentOutcome, AgentRunner};
