//! ADC - Agent Design Contract workflow engine
//!
//! A deterministic controller that drives a team of LLM agents through
//! nested refinement loops until generated code satisfies written
//! contracts and passes its test suite. Users supply a natural-language
//! task; the engine emits contracts, implementation files, and a
//! compliance report.
//!
//! # Core Concepts
//!
//! - **Two-level loop**: an inner implementation loop (auditor <-> code
//!   generator) with graduated acceptance thresholds and stagnation
//!   detection, inside an outer refinement loop (evaluator -> refiner).
//! - **Cached context prefix**: role prompts and the contract digest are
//!   byte-stable cacheable system segments, so every invocation after the
//!   first pays cache-read prices for them.
//! - **Per-file fan-out**: the code generator is invoked once per file
//!   with a fresh tool budget; one model turn can never rewrite the tree.
//! - **Structured terminals**: the scheduler never raises; every outcome
//!   is a `WorkflowResult` with a stable reason string.
//!
//! # Modules
//!
//! - [`llm`] - LLM client trait and Anthropic implementation
//! - [`agent`] - agent identities, model tiers, and the tool-use loop
//! - [`tools`] - the five workspace tools
//! - [`scheduler`] - the two-level loop engine
//! - [`digest`] - contract summarization for the cacheable prefix
//! - [`progress`] - stagnation detection and graduated targets
//! - [`verify`] - compliance verification through the `ull` crate

pub mod agent;
pub mod cancel;
pub mod cli;
pub mod config;
pub mod digest;
pub mod domain;
pub mod llm;
pub mod progress;
pub mod prompts;
pub mod scheduler;
pub mod tools;
pub mod verify;

// Re-export commonly used types
pub use agent::{AgentId, AgentOutcome, AgentRunner, Tier, TierTable};
pub use cancel::CancelFlag;
pub use config::{Config, LlmConfig, VerificationConfig, WorkflowConfig};
pub use digest::{ContractDigest, ContractSummarizer};
pub use domain::{PhaseRecord, RunState, RunStatus, Task, TerminalReason, WorkflowResult};
pub use llm::{AnthropicClient, CompletionRequest, CompletionResponse, LlmClient, LlmError, TokenUsage, create_client};
pub use progress::{ProgressTracker, graduated_target};
pub use prompts::PromptLoader;
pub use scheduler::WorkflowEngine;
pub use tools::{Tool, ToolContext, ToolExecutor, ToolResult};
