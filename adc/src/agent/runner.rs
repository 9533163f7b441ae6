//! AgentRunner - one LLM invocation to final text
//!
//! Runs the tool-use protocol: issue a prompt, execute every tool request
//! the model returns, feed results back, repeat until the model ends its
//! turn or a budget trips. Token usage is accumulated across every round
//! of the loop.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::cancel::CancelFlag;
use crate::digest::ContractDigest;
use crate::llm::{
    CompletionRequest, CompletionResponse, ContentBlock, LlmClient, Message, StopReason, SystemBlock, TokenUsage,
};
use crate::prompts::PromptLoader;
use crate::tools::{ToolContext, ToolExecutor, ToolResult};

use super::identity::{AgentId, TierTable};

/// Hard cap on tool-use rounds per invocation, independent of the model's
/// stop reason
const MAX_TOOL_ROUNDS: u32 = 40;

/// Outcome of one agent invocation
#[derive(Debug, Clone)]
pub struct AgentOutcome {
    pub success: bool,

    /// Final text response (may be empty on failure)
    pub response: String,

    /// Cumulative usage across every round of the loop
    pub usage: TokenUsage,

    /// Wall-clock duration of the invocation
    pub duration_seconds: f64,

    pub error: Option<String>,
}

impl AgentOutcome {
    fn failure(message: impl Into<String>, usage: TokenUsage, started: Instant) -> Self {
        Self {
            success: false,
            response: String::new(),
            usage,
            duration_seconds: started.elapsed().as_secs_f64(),
            error: Some(message.into()),
        }
    }
}

/// Executes single agent invocations against a workspace
pub struct AgentRunner {
    llm_strong: Arc<dyn LlmClient>,
    llm_light: Arc<dyn LlmClient>,
    tiers: TierTable,
    prompts: Arc<PromptLoader>,
    tools: ToolExecutor,
    cancel: CancelFlag,
}

impl AgentRunner {
    /// Create a runner with per-tier clients and a tier table
    pub fn new(
        llm_strong: Arc<dyn LlmClient>,
        llm_light: Arc<dyn LlmClient>,
        tiers: TierTable,
        prompts: Arc<PromptLoader>,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            llm_strong,
            llm_light,
            tiers,
            prompts,
            tools: ToolExecutor::standard(),
            cancel,
        }
    }

    /// Create a runner backed by one client for both tiers (tests, or
    /// single-model deployments)
    pub fn single_client(llm: Arc<dyn LlmClient>, tiers: TierTable, prompts: Arc<PromptLoader>) -> Self {
        Self {
            llm_light: llm.clone(),
            llm_strong: llm,
            tiers,
            prompts,
            tools: ToolExecutor::standard(),
            cancel: CancelFlag::new(),
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Build the ordered system segments for an invocation
    ///
    /// 1. the agent's role definition (cacheable),
    /// 2. the contract digest with its header (cacheable),
    /// 3. the workspace introduction (not cached).
    fn system_blocks(&self, agent: AgentId, digest: Option<&ContractDigest>, workspace: &Path) -> Vec<SystemBlock> {
        let mut blocks = Vec::with_capacity(3);

        match self.prompts.role(agent) {
            Ok(role) => blocks.push(SystemBlock::cached(role)),
            Err(_) => {
                // Fallback: generic description keeps the invocation alive
                blocks.push(SystemBlock::plain(format!(
                    "You are {}, an expert agent in an agent-design-contract workflow.",
                    agent
                )));
            }
        }

        if let Some(digest) = digest
            && !digest.is_empty()
        {
            blocks.push(SystemBlock::cached(format!("## Contracts Context\n\n{}", digest.render())));
        }

        blocks.push(SystemBlock::plain(format!(
            "## Workspace\n\nWorking directory: {}\n\nUse the provided tools to read files, write files, edit files, run commands, and list directories. All file paths can be relative to the workspace or absolute.",
            workspace.display()
        )));

        blocks
    }

    /// Run one agent invocation to completion
    pub async fn invoke(
        &self,
        agent: AgentId,
        prompt: &str,
        workspace: &Path,
        digest: Option<&ContractDigest>,
    ) -> AgentOutcome {
        let started = Instant::now();
        let tier = self.tiers.tier(agent);
        debug!(%agent, ?tier, prompt_len = prompt.len(), "AgentRunner::invoke: called");

        let llm = match tier {
            super::identity::Tier::Strong => &self.llm_strong,
            super::identity::Tier::Light => &self.llm_light,
        };

        let system = self.system_blocks(agent, digest, workspace);
        let tool_defs = self.tools.definitions();
        let tool_ctx = ToolContext::new(workspace.to_path_buf());
        tool_ctx.clear_reads().await;

        let mut messages = vec![Message::user(prompt)];
        let mut usage = TokenUsage::default();
        let mut round = 0u32;

        loop {
            round += 1;
            if round > MAX_TOOL_ROUNDS {
                warn!(%agent, max_rounds = MAX_TOOL_ROUNDS, "AgentRunner::invoke: round cap exceeded");
                return AgentOutcome::failure(
                    format!("Max tool-use iterations ({}) reached", MAX_TOOL_ROUNDS),
                    usage,
                    started,
                );
            }

            // Cancellation polled before each network call
            if self.cancel.is_cancelled() {
                return AgentOutcome::failure("Invocation cancelled", usage, started);
            }

            let request = CompletionRequest {
                system: system.clone(),
                messages: messages.clone(),
                tools: tool_defs.clone(),
                max_tokens: tier.max_output_tokens(),
            };

            debug!(%agent, round, "AgentRunner::invoke: calling LLM");
            let response = match llm.complete(request).await {
                Ok(response) => {
                    usage.accumulate(&response.usage);
                    response
                }
                Err(e) => {
                    debug!(%agent, round, error = %e, "AgentRunner::invoke: LLM error");
                    return AgentOutcome::failure(e.to_string(), usage, started);
                }
            };

            match response.stop_reason {
                StopReason::EndTurn => {
                    let text = response.content.clone().unwrap_or_default();
                    info!(%agent, round, duration_s = started.elapsed().as_secs_f64(), "AgentRunner::invoke: complete");
                    return AgentOutcome {
                        success: true,
                        response: text,
                        usage,
                        duration_seconds: started.elapsed().as_secs_f64(),
                        error: None,
                    };
                }
                StopReason::ToolUse => {
                    debug!(%agent, round, tool_count = response.tool_calls.len(), "AgentRunner::invoke: tool use");

                    // Cancellation polled before tool execution; a partial
                    // turn is abandoned rather than half-applied
                    if self.cancel.is_cancelled() {
                        return AgentOutcome::failure("Invocation cancelled", usage, started);
                    }

                    messages.push(build_assistant_message(&response));

                    let results = self.tools.execute_all(&response.tool_calls, &tool_ctx).await;
                    messages.push(build_tool_result_message(&results));
                }
                StopReason::Other(ref reason) => {
                    debug!(%agent, round, %reason, "AgentRunner::invoke: unexpected stop reason");
                    return AgentOutcome::failure(format!("Unexpected stop reason: {}", reason), usage, started);
                }
            }
        }
    }
}

/// Assistant message carrying the reply's text and tool-use blocks
fn build_assistant_message(response: &CompletionResponse) -> Message {
    let mut blocks = Vec::new();

    if let Some(text) = &response.content {
        blocks.push(ContentBlock::text(text));
    }

    for call in &response.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: call.input.clone(),
        });
    }

    Message::assistant_blocks(blocks)
}

/// User message carrying one tool_result per executed tool, in order
fn build_tool_result_message(results: &[(String, ToolResult)]) -> Message {
    let blocks: Vec<ContentBlock> = results
        .iter()
        .map(|(id, result)| ContentBlock::tool_result(id, &result.content, result.is_error))
        .collect();

    Message::user_blocks(blocks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::ToolCall;
    use tempfile::tempdir;

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 10,
                output_tokens: 5,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            },
        }
    }

    fn tool_response(id: &str, name: &str, input: serde_json::Value) -> CompletionResponse {
        CompletionResponse {
            content: None,
            tool_calls: vec![ToolCall {
                id: id.to_string(),
                name: name.to_string(),
                input,
            }],
            stop_reason: StopReason::ToolUse,
            usage: TokenUsage {
                input_tokens: 20,
                output_tokens: 10,
                cache_creation_tokens: 100,
                cache_read_tokens: 0,
            },
        }
    }

    fn runner(responses: Vec<CompletionResponse>) -> (AgentRunner, Arc<MockLlmClient>) {
        let mock = Arc::new(MockLlmClient::new(responses));
        let runner = AgentRunner::single_client(
            mock.clone(),
            TierTable::strong(),
            Arc::new(PromptLoader::embedded_only()),
        );
        (runner, mock)
    }

    #[tokio::test]
    async fn test_invoke_end_turn_returns_text() {
        let temp = tempdir().unwrap();
        let (runner, mock) = runner(vec![text_response("done")]);

        let outcome = runner.invoke(AgentId::Auditor, "audit please", temp.path(), None).await;

        assert!(outcome.success);
        assert_eq!(outcome.response, "done");
        assert_eq!(outcome.usage.input_tokens, 10);
        assert_eq!(outcome.usage.output_tokens, 5);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_invoke_executes_tools_then_finishes() {
        let temp = tempdir().unwrap();
        let (runner, mock) = runner(vec![
            tool_response(
                "t1",
                "write_file",
                serde_json::json!({"file_path": "hello.txt", "content": "hi"}),
            ),
            text_response("wrote the file"),
        ]);

        let outcome = runner.invoke(AgentId::CodeGenerator, "write hello.txt", temp.path(), None).await;

        assert!(outcome.success);
        assert_eq!(outcome.response, "wrote the file");
        // The tool actually ran in the workspace
        assert_eq!(std::fs::read_to_string(temp.path().join("hello.txt")).unwrap(), "hi");
        // Usage accumulated across both rounds
        assert_eq!(outcome.usage.input_tokens, 30);
        assert_eq!(outcome.usage.output_tokens, 15);
        assert_eq!(outcome.usage.cache_creation_tokens, 100);

        // Second request carried the assistant reply + tool results
        let requests = mock.requests();
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[1].messages.len(), 3);
    }

    #[tokio::test]
    async fn test_invoke_round_cap_is_failure() {
        let temp = tempdir().unwrap();
        // A model that never stops asking for tools
        let responses: Vec<CompletionResponse> = (0..50)
            .map(|i| tool_response(&format!("t{}", i), "list_directory", serde_json::json!({})))
            .collect();
        let (runner, mock) = runner(responses);

        let outcome = runner.invoke(AgentId::Auditor, "loop forever", temp.path(), None).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("Max tool-use iterations"));
        assert_eq!(mock.call_count(), 40);
    }

    #[tokio::test]
    async fn test_invoke_unexpected_stop_reason_is_failure() {
        let temp = tempdir().unwrap();
        let (runner, _) = runner(vec![CompletionResponse {
            content: Some("truncated".to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::Other("max_tokens".to_string()),
            usage: TokenUsage::default(),
        }]);

        let outcome = runner.invoke(AgentId::Auditor, "x", temp.path(), None).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("max_tokens"));
    }

    #[tokio::test]
    async fn test_invoke_llm_error_is_failure() {
        let temp = tempdir().unwrap();
        let (runner, _) = runner(vec![]);

        let outcome = runner.invoke(AgentId::Auditor, "x", temp.path(), None).await;

        assert!(!outcome.success);
        assert!(outcome.error.is_some());
    }

    #[tokio::test]
    async fn test_system_segments_order_and_caching() {
        let temp = tempdir().unwrap();
        let (runner, mock) = runner(vec![text_response("ok")]);

        let digest = ContractDigest {
            contracts: vec![crate::digest::ContractSummary {
                file_name: "main.qmd".to_string(),
                contract_id: Some("main-001".to_string()),
                parity_files: vec![],
                requirements: vec![],
            }],
        };

        runner.invoke(AgentId::Auditor, "x", temp.path(), Some(&digest)).await;

        let requests = mock.requests();
        let system = &requests[0].system;
        assert_eq!(system.len(), 3);
        // Role first, cached
        assert!(system[0].cacheable);
        // Digest second, cached, with its header
        assert!(system[1].cacheable);
        assert!(system[1].text.starts_with("## Contracts Context"));
        assert!(system[1].text.contains("# Contracts (1)"));
        // Workspace intro last, uncached
        assert!(!system[2].cacheable);
        assert!(system[2].text.contains("Working directory"));
    }

    #[tokio::test]
    async fn test_cancellation_before_network_call() {
        let temp = tempdir().unwrap();
        let mock = Arc::new(MockLlmClient::new(vec![text_response("never sent")]));
        let cancel = CancelFlag::new();
        cancel.cancel();

        let runner = AgentRunner::single_client(
            mock.clone(),
            TierTable::strong(),
            Arc::new(PromptLoader::embedded_only()),
        )
        .with_cancel(cancel);

        let outcome = runner.invoke(AgentId::Auditor, "x", temp.path(), None).await;

        assert!(!outcome.success);
        assert!(outcome.error.as_deref().unwrap().contains("cancelled"));
        assert_eq!(mock.call_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_digest_omitted_from_system() {
        let temp = tempdir().unwrap();
        let (runner, mock) = runner(vec![text_response("ok")]);

        let digest = ContractDigest::default();
        runner.invoke(AgentId::Auditor, "x", temp.path(), Some(&digest)).await;

        let requests = mock.requests();
        assert_eq!(requests[0].system.len(), 2);
    }
}
