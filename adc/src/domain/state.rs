//! Run state, phase records, and workflow results
//!
//! `RunState` is the moving head of a run: created at run start, mutated
//! only by the scheduler, read by the token accountant. `PhaseRecord`s are
//! append-only; replaying the list reproduces the token totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::agent::AgentOutcome;
use crate::domain::Task;
use crate::llm::TokenUsage;

/// One LLM invocation's accounting slot, immutable after recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhaseRecord {
    /// Agent identity string (e.g. "auditor", "code_generator")
    pub agent: String,

    /// Wall-clock timestamp of the invocation
    pub timestamp: DateTime<Utc>,

    /// Outer iteration coordinate
    pub outer_iteration: u32,

    /// Inner iteration coordinate (None outside the inner loop)
    pub inner_iteration: Option<u32>,

    /// Regular input tokens (cache reads tracked separately)
    pub input_tokens: u64,

    /// Output tokens
    pub output_tokens: u64,

    /// Tokens written to the provider cache
    pub cache_creation_tokens: u64,

    /// Tokens read from the provider cache
    pub cache_read_tokens: u64,

    /// Compact summary of the phase result
    pub result_summary: String,
}

impl PhaseRecord {
    /// The four token counters as one usage value
    pub fn usage(&self) -> TokenUsage {
        TokenUsage {
            input_tokens: self.input_tokens,
            output_tokens: self.output_tokens,
            cache_creation_tokens: self.cache_creation_tokens,
            cache_read_tokens: self.cache_read_tokens,
        }
    }

    /// Regular tokens consumed: input + output
    pub fn tokens_used(&self) -> u64 {
        self.usage().tokens_used()
    }
}

/// Terminal reasons, exposed to callers as stable strings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminalReason {
    TestsPassed,
    MaxInnerIterationsReached,
    MaxOuterIterationsReached,
    ContractWriterFailed,
    EvaluatorFailed,
    RefinerFailed,
    Cancelled,
}

impl TerminalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminalReason::TestsPassed => "tests_passed",
            TerminalReason::MaxInnerIterationsReached => "max_inner_iterations_reached",
            TerminalReason::MaxOuterIterationsReached => "max_outer_iterations_reached",
            TerminalReason::ContractWriterFailed => "contract_writer_failed",
            TerminalReason::EvaluatorFailed => "evaluator_failed",
            TerminalReason::RefinerFailed => "refiner_failed",
            TerminalReason::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for TerminalReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The moving head of a run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    /// Run identifier
    pub run_id: String,

    /// The task being executed
    pub task: Task,

    /// Current refinement-loop iteration (never decreases)
    pub outer_iteration: u32,

    /// Current implementation-loop iteration (resets each outer step)
    pub inner_iteration: u32,

    /// Latest audit compliance score
    pub compliance_score: f64,

    /// Latest implementation issues from the auditor
    pub implementation_issues: Vec<String>,

    /// Whether the system evaluator is satisfied
    pub evaluator_satisfied: bool,

    /// Latest evaluator feedback
    pub evaluator_feedback: String,

    /// Whether the inner loop is currently active
    pub inner_loop_active: bool,

    /// Append-only invocation history
    pub phase_history: Vec<PhaseRecord>,
}

impl RunState {
    /// Initialize state from a task
    pub fn from_task(task: Task) -> Self {
        Self {
            run_id: uuid::Uuid::now_v7().to_string(),
            task,
            outer_iteration: 0,
            inner_iteration: 0,
            compliance_score: 0.0,
            implementation_issues: Vec::new(),
            evaluator_satisfied: false,
            evaluator_feedback: String::new(),
            inner_loop_active: false,
            phase_history: Vec::new(),
        }
    }

    /// Append a phase record for one agent invocation
    pub fn record_phase(&mut self, agent: &str, outcome: &AgentOutcome, result_summary: impl Into<String>) {
        self.phase_history.push(PhaseRecord {
            agent: agent.to_string(),
            timestamp: Utc::now(),
            outer_iteration: self.outer_iteration,
            inner_iteration: if self.inner_loop_active { Some(self.inner_iteration) } else { None },
            input_tokens: outcome.usage.input_tokens,
            output_tokens: outcome.usage.output_tokens,
            cache_creation_tokens: outcome.usage.cache_creation_tokens,
            cache_read_tokens: outcome.usage.cache_read_tokens,
            result_summary: result_summary.into(),
        });
    }

    /// Total regular tokens across all phases (the token accountant replay)
    pub fn total_tokens(&self) -> u64 {
        self.phase_history.iter().map(|p| p.tokens_used()).sum()
    }

    /// Total cost with cache-aware pricing
    ///
    /// Delegates to [`TokenUsage::cost_usd`] per phase record. Sonnet
    /// rates for simplicity - most agents run on the strong tier.
    pub fn total_cost_usd(&self) -> f64 {
        self.phase_history.iter().map(|p| p.usage().cost_usd("sonnet")).sum()
    }
}

/// Run status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Success,
    Failed,
}

/// Structured result of a workflow run
///
/// The scheduler never raises to its caller; every terminal state becomes
/// one of these.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowResult {
    pub status: RunStatus,
    pub reason: TerminalReason,
    pub final_state: RunState,
    pub total_tokens: u64,
    pub total_cost_usd: f64,
    pub execution_time_seconds: f64,

    /// PR orchestrator output on the success path
    pub pr_text: String,
}

impl WorkflowResult {
    pub fn success(reason: TerminalReason, pr_text: String, state: RunState) -> Self {
        let total_tokens = state.total_tokens();
        let total_cost_usd = state.total_cost_usd();
        Self {
            status: RunStatus::Success,
            reason,
            final_state: state,
            total_tokens,
            total_cost_usd,
            execution_time_seconds: 0.0,
            pr_text,
        }
    }

    pub fn failed(reason: TerminalReason, state: RunState) -> Self {
        let total_tokens = state.total_tokens();
        let total_cost_usd = state.total_cost_usd();
        Self {
            status: RunStatus::Failed,
            reason,
            final_state: state,
            total_tokens,
            total_cost_usd,
            execution_time_seconds: 0.0,
            pr_text: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == RunStatus::Success
    }
}
