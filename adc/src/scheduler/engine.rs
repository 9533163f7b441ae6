//! WorkflowEngine - the two-level loop scheduler
//!
//! Drives a run through contract bootstrap, the inner implementation loop
//! (auditor <-> per-file code generator with graduated acceptance and
//! stagnation detection), and the outer refinement loop (evaluator ->
//! refiner). Owns the RunState; never raises to its caller - every
//! terminal state becomes a structured WorkflowResult.

use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::agent::{AgentId, AgentRunner};
use crate::cancel::CancelFlag;
use crate::digest::{ContractDigest, ContractSummarizer};
use crate::domain::{RunState, Task, TerminalReason, WorkflowResult};
use crate::progress::{ProgressTracker, graduated_target};
use crate::prompts::PromptLoader;

use super::bootstrap::{create_stubs_from_parity, list_workspace_files, stub_candidates};
use super::parse::{AuditReport, JsonExtraction, extract_json, extract_json_list, issues_by_file, parse_evaluator};

/// Contract-writer retries (timeouts only)
const WRITER_RETRIES: u32 = 3;

/// Back-off between contract-writer retries
const WRITER_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Outer-loop acceptance gate on the inner loop's final score
const OUTER_GATE: f64 = 0.80;

const PLAN_TEMPLATE: &str = r#"Analyze this task and output ONLY a JSON array of contract names needed.

Task: {{{task}}}

Output ONLY a JSON array like: ["main", "database", "testing"]

Requirements:
- Create 1-3 focused contract names (no file extensions)
- DO NOT create documentation contracts (README, INDEX, SUMMARY, MANIFEST, VERIFICATION)
- Contract names should be descriptive but concise (e.g., "main", "api", "database", "testing")

Output ONLY the JSON array. No explanations, no markdown, just the array.
"#;

const WRITER_TEMPLATE: &str = r#"Write ONLY the '{{{name}}}.qmd' contract for this task.

Task: {{{task}}}

Existing workspace files:
{{{files}}}

Other contracts that exist/will be created: {{{all_contracts}}}

IMPORTANT CONSTRAINTS:
- Focus ONLY on writing {{{name}}}.qmd
- DO NOT write other contracts (they will be created separately)
- Keep the contract concise
- Include YAML front matter with a contract_id field
- Save to contracts/{{{name}}}.qmd using the write_file tool

CRITICAL REQUIREMENT - Parity Section:
You MUST include a Parity section specifying which files will implement this contract, with one **File:** entry per implementation file:

**File:** `src/example.py`
- What the file provides
- `ADC-IMPLEMENTS: <{{{name}}}-example-01>`

Paths are relative to the workspace root and include file extensions.
Without a proper Parity section, stub file creation will fail and code generators won't know which files to create.
"#;

const AUDIT_TEMPLATE: &str = r#"Audit the implementation against the contracts in workspace: {{{workspace}}}

CRITICAL OUTPUT REQUIREMENT:
Your response MUST be ONLY valid JSON. No explanatory text, preamble, or markdown formatting.

If you cannot complete the audit due to errors, return:
{"compliance_score": 0.0, "error": "explanation of what went wrong"}

Audit in three phases: implementation discovery (do the files from the contract Parity sections exist?), marker verification (do classes/functions carry ADC-IMPLEMENTS markers?), and implementation quality (does the structure match the contracts?).

Distinguish environment issues (import paths, missing external dependencies - do NOT penalize compliance) from implementation issues (missing functions, wrong signatures, missing markers - DO penalize compliance). Reference a file path in every issue.

Return JSON of this shape:
{
  "compliance_score": 0.85,
  "phase_scores": {"implementation_discovery": 40, "marker_verification": 35, "implementation_quality": 10},
  "files_checked": ["src/main.py"],
  "implementation_exists": true,
  "markers_present": 12,
  "markers_missing": 3,
  "environment_issues": ["..."],
  "implementation_issues": ["Missing ADC-IMPLEMENTS marker in src/main.py:15"]
}
"#;

const CODEGEN_FILE_TEMPLATE: &str = r#"{{{action}}} ONLY {{{file}}}.

Existing workspace files:
{{{files}}}

Requirements for THIS FILE ONLY:
{{{issues}}}
{{{env_context}}}
IMPORTANT CONSTRAINTS:
- Focus ONLY on {{{file}}}
- {{{marker_instruction}}}
- Follow the contract specifications exactly
- Maintain existing functionality in this file
- DO NOT modify other files (they will be processed separately)
- DO NOT try to fix import errors or environment issues
"#;

const EVALUATOR_TEMPLATE: &str = r#"Evaluate the implementation against the contracts.

Workspace: {{{workspace}}}

Requirements:
1. Run all tests
2. Check performance constraints
3. Verify feature completeness
{{{verification}}}
Return result in JSON format:
{
  "satisfied": true/false,
  "failures": ["test failure 1"],
  "feedback": "Summary of issues"
}
"#;

const REFINER_TEMPLATE: &str = r#"Refine contracts based on test failures.

Evaluation Feedback:
{{{feedback}}}

Update the contracts under contracts/ to fix root cause issues.
"#;

#[derive(Serialize)]
struct PlanContext {
    task: String,
}

#[derive(Serialize)]
struct WriterContext {
    name: String,
    task: String,
    files: String,
    all_contracts: String,
}

#[derive(Serialize)]
struct AuditContext {
    workspace: String,
}

#[derive(Serialize)]
struct CodegenContext {
    action: String,
    file: String,
    files: String,
    issues: String,
    env_context: String,
    marker_instruction: String,
}

#[derive(Serialize)]
struct EvaluatorContext {
    workspace: String,
    verification: String,
}

#[derive(Serialize)]
struct RefinerContext {
    feedback: String,
}

/// The top-level workflow controller
pub struct WorkflowEngine {
    runner: AgentRunner,
    prompts: Arc<PromptLoader>,
    summarizer: ContractSummarizer,
    digest: ContractDigest,
    progress: ProgressTracker,
    cancel: CancelFlag,
    ull_enabled: bool,
    strict_verification: bool,
}

impl WorkflowEngine {
    pub fn new(runner: AgentRunner, prompts: Arc<PromptLoader>, ull_enabled: bool, strict_verification: bool) -> Self {
        Self {
            runner,
            prompts,
            summarizer: ContractSummarizer::new(),
            digest: ContractDigest::default(),
            progress: ProgressTracker::new(),
            cancel: CancelFlag::new(),
            ull_enabled,
            strict_verification,
        }
    }

    pub fn with_cancel(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Execute the workflow for one task
    pub async fn run(&mut self, task: Task) -> WorkflowResult {
        let started = Instant::now();
        info!(task = %task.description, workspace = %task.workspace.display(), "WorkflowEngine::run: starting");

        let state = RunState::from_task(task);
        let mut result = self.outer_loop(state).await;
        result.execution_time_seconds = started.elapsed().as_secs_f64();

        info!(
            status = ?result.status,
            reason = %result.reason,
            total_tokens = result.total_tokens,
            "WorkflowEngine::run: finished"
        );
        result
    }

    /// Whether the workspace has any contract files
    fn has_contracts(workspace: &Path) -> bool {
        let contracts_dir = workspace.join("contracts");
        if !contracts_dir.exists() {
            return false;
        }
        WalkDir::new(&contracts_dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .any(|e| {
                e.path().is_file()
                    && matches!(e.path().extension().and_then(|x| x.to_str()), Some("qmd") | Some("md"))
            })
    }

    /// Contract creation sub-flow: plan, write each contract separately,
    /// materialize stubs from parity sections
    async fn bootstrap_contracts(&mut self, state: &mut RunState) -> Option<TerminalReason> {
        let workspace = state.task.workspace.clone();
        info!("WorkflowEngine::bootstrap_contracts: no contracts, creating");

        // Phase 1: plan - a short list of logical contract names
        let plan_prompt = self
            .prompts
            .render(PLAN_TEMPLATE, &PlanContext { task: state.task.description.clone() })
            .unwrap_or_else(|_| PLAN_TEMPLATE.to_string());
        let planning = self.runner.invoke(AgentId::ContractWriter, &plan_prompt, &workspace, None).await;

        let mut contracts_needed = if planning.success {
            extract_json_list(&planning.response).unwrap_or_default()
        } else {
            Vec::new()
        };
        if contracts_needed.is_empty() {
            warn!("WorkflowEngine::bootstrap_contracts: planning failed, defaulting to ['main']");
            contracts_needed = vec!["main".to_string()];
        }
        debug!(?contracts_needed, "WorkflowEngine::bootstrap_contracts: planned");

        state.record_phase(
            AgentId::ContractWriter.as_str(),
            &planning,
            format!("Planned {} contracts", contracts_needed.len()),
        );

        // Phase 2: write each contract in a separate invocation
        let mut contracts_created = 0usize;
        for contract_name in &contracts_needed {
            info!(%contract_name, "WorkflowEngine::bootstrap_contracts: writing contract");

            let writer_prompt = self
                .prompts
                .render(
                    WRITER_TEMPLATE,
                    &WriterContext {
                        name: contract_name.clone(),
                        task: state.task.description.clone(),
                        files: list_workspace_files(&workspace),
                        all_contracts: format!("{:?}", contracts_needed),
                    },
                )
                .unwrap_or_default();

            // Retry only errors whose message mentions "timeout"
            let mut writer_outcome = None;
            for attempt in 1..=WRITER_RETRIES {
                if attempt > 1 {
                    debug!(attempt, "WorkflowEngine::bootstrap_contracts: retrying after back-off");
                    tokio::time::sleep(WRITER_RETRY_DELAY).await;
                }

                let outcome = self.runner.invoke(AgentId::ContractWriter, &writer_prompt, &workspace, None).await;
                let retryable = !outcome.success
                    && outcome
                        .error
                        .as_deref()
                        .is_some_and(|e| e.to_lowercase().contains("timeout"));
                let success = outcome.success;
                writer_outcome = Some(outcome);

                if success || !retryable {
                    break;
                }
                warn!(%contract_name, attempt, "WorkflowEngine::bootstrap_contracts: writer timed out");
            }

            let outcome = writer_outcome.expect("at least one attempt");
            if !outcome.success {
                warn!(%contract_name, error = ?outcome.error, "WorkflowEngine::bootstrap_contracts: writer failed");
                continue;
            }

            contracts_created += 1;
            state.record_phase(
                AgentId::ContractWriter.as_str(),
                &outcome,
                format!("Created {}.qmd", contract_name),
            );
        }

        if contracts_created == 0 {
            return Some(TerminalReason::ContractWriterFailed);
        }
        info!(contracts_created, total = contracts_needed.len(), "WorkflowEngine::bootstrap_contracts: contracts written");

        // Stub materialization is pure local post-processing - no LLM calls
        let mut all_stubs = Vec::new();
        for contract_name in &contracts_needed {
            for extension in ["md", "qmd"] {
                let contract_path = workspace.join("contracts").join(format!("{}.{}", contract_name, extension));
                if contract_path.exists() {
                    all_stubs.extend(create_stubs_from_parity(&workspace, &contract_path));
                    break;
                }
            }
        }
        if all_stubs.is_empty() {
            info!("WorkflowEngine::bootstrap_contracts: no stubs created (parity sections may not specify files)");
        } else {
            info!(?all_stubs, "WorkflowEngine::bootstrap_contracts: stubs created");
        }

        None
    }

    /// Inner loop: auditor <-> per-file code generator
    ///
    /// Returns the final compliance score. Exit order per audit: graduated
    /// target met, then stagnation, then the iteration cap - the success
    /// check deliberately runs before the stuck check.
    async fn inner_loop(&mut self, state: &mut RunState) -> f64 {
        let workspace = state.task.workspace.clone();
        state.inner_loop_active = true;

        loop {
            if self.cancel.is_cancelled() {
                state.inner_loop_active = false;
                return state.compliance_score;
            }

            // 1. Audit
            info!(inner = state.inner_iteration, "WorkflowEngine::inner_loop: running audit");
            let audit_prompt = self
                .prompts
                .render(AUDIT_TEMPLATE, &AuditContext { workspace: workspace.display().to_string() })
                .unwrap_or_default();
            let audit_outcome = self.runner.invoke(AgentId::Auditor, &audit_prompt, &workspace, Some(&self.digest)).await;

            if !audit_outcome.success {
                warn!(error = ?audit_outcome.error, "WorkflowEngine::inner_loop: auditor failed");
                state.inner_loop_active = false;
                return state.compliance_score;
            }

            let report = match extract_json(&audit_outcome.response) {
                JsonExtraction::Parsed(data) => AuditReport::from_json(&data),
                JsonExtraction::Failed(diagnostics) => {
                    // Keep the previous score; log excerpts for debugging
                    warn!(
                        response_len = diagnostics.response_len,
                        head = %diagnostics.head,
                        tail = %diagnostics.tail,
                        hint = %diagnostics.hint,
                        "WorkflowEngine::inner_loop: failed to extract audit JSON"
                    );
                    AuditReport {
                        compliance_score: state.compliance_score,
                        ..AuditReport::default()
                    }
                }
            };

            let compliance = report.compliance_score;
            state.compliance_score = compliance;
            state.implementation_issues = report.implementation_issues.clone();
            state.record_phase(
                AgentId::Auditor.as_str(),
                &audit_outcome,
                format!("Compliance: {:.0}%", compliance * 100.0),
            );
            self.progress.add_score(compliance);
            info!(
                compliance,
                environment_issues = report.environment_issues.len(),
                implementation_issues = report.implementation_issues.len(),
                "WorkflowEngine::inner_loop: audit complete"
            );

            self.write_audit_report(state, &report, &audit_outcome.response);

            // 2. Graduated target met -> hand over to the evaluator
            let target = graduated_target(state.inner_iteration + 1);
            if compliance >= target {
                info!(compliance, target, "WorkflowEngine::inner_loop: target met");
                state.inner_loop_active = false;
                return compliance;
            }

            // 3. Stagnation -> exit regardless of threshold
            if self.progress.is_stuck() {
                info!("WorkflowEngine::inner_loop: no progress in last three audits, exiting");
                state.inner_loop_active = false;
                return compliance;
            }

            // 4. Iteration cap
            if state.inner_iteration >= state.task.max_inner {
                info!(max_inner = state.task.max_inner, "WorkflowEngine::inner_loop: iteration cap reached");
                state.inner_loop_active = false;
                return compliance;
            }

            // 5. Build the per-file work list
            let mut work_list: Vec<(String, Vec<String>)> = issues_by_file(&report.implementation_issues)
                .into_iter()
                .collect();
            let mut completing_stubs = false;

            if work_list.is_empty() {
                let stubs = stub_candidates(&workspace);
                if !stubs.is_empty() {
                    debug!(stub_count = stubs.len(), "WorkflowEngine::inner_loop: using stub work list");
                    completing_stubs = true;
                    work_list = stubs
                        .into_iter()
                        .map(|p| (p.display().to_string(), vec!["Complete the stub implementation".to_string()]))
                        .collect();
                }
            }

            let env_context = if report.environment_issues.is_empty() {
                String::new()
            } else {
                format!(
                    "\nNOTE: The following environment issues were detected but DO NOT need code changes:\n{}\nFocus ONLY on fixing the implementation issues listed above.\n",
                    report
                        .environment_issues
                        .iter()
                        .take(3)
                        .map(|i| format!("- {}", i))
                        .collect::<Vec<_>>()
                        .join("\n")
                )
            };

            if !work_list.is_empty() {
                // 6. One invocation per file: fresh tool budget, and no
                // single model turn can rewrite the whole tree
                info!(files = work_list.len(), "WorkflowEngine::inner_loop: per-file code generation");
                let mut files_processed = 0usize;

                for (file_path, issues) in &work_list {
                    if self.cancel.is_cancelled() {
                        state.inner_loop_active = false;
                        return compliance;
                    }

                    debug!(%file_path, issue_count = issues.len(), "WorkflowEngine::inner_loop: generating file");
                    let prompt = self
                        .prompts
                        .render(
                            CODEGEN_FILE_TEMPLATE,
                            &CodegenContext {
                                action: if completing_stubs { "Complete stub file".to_string() } else { "Generate/fix".to_string() },
                                file: file_path.clone(),
                                files: list_workspace_files(&workspace),
                                issues: issues.iter().map(|i| format!("- {}", i)).collect::<Vec<_>>().join("\n"),
                                env_context: env_context.clone(),
                                marker_instruction: if completing_stubs {
                                    "The file already exists as a stub with ADC-IMPLEMENTS markers - complete the implementations".to_string()
                                } else {
                                    "Add ADC-IMPLEMENTS markers before each class/function".to_string()
                                },
                            },
                        )
                        .unwrap_or_default();

                    let outcome = self.runner.invoke(AgentId::CodeGenerator, &prompt, &workspace, Some(&self.digest)).await;
                    if !outcome.success {
                        // Individual file failures are tolerated
                        warn!(%file_path, error = ?outcome.error, "WorkflowEngine::inner_loop: code generation failed for file");
                        continue;
                    }

                    files_processed += 1;
                    state.record_phase(AgentId::CodeGenerator.as_str(), &outcome, format!("Generated {}", file_path));
                }

                info!(files_processed, total = work_list.len(), "WorkflowEngine::inner_loop: generation pass done");
                if files_processed == 0 {
                    warn!("WorkflowEngine::inner_loop: failed to process any files");
                    state.inner_loop_active = false;
                    return compliance;
                }
            } else {
                // Fallback: one global fix when nothing names a file and no
                // stubs exist
                info!("WorkflowEngine::inner_loop: no file-scoped work, using global fix");
                let issues_summary = report
                    .implementation_issues
                    .iter()
                    .take(10)
                    .map(|i| format!("- {}", i))
                    .collect::<Vec<_>>()
                    .join("\n");
                let prompt = format!(
                    "Fix contract compliance implementation issues.\n\nImplementation issues to fix:\n{}\n{}\nAdd ADC-IMPLEMENTS markers before each class/function and follow the contract specifications exactly.",
                    issues_summary, env_context
                );

                let outcome = self.runner.invoke(AgentId::CodeGenerator, &prompt, &workspace, Some(&self.digest)).await;
                if !outcome.success {
                    warn!(error = ?outcome.error, "WorkflowEngine::inner_loop: global code generation failed");
                    state.inner_loop_active = false;
                    return compliance;
                }
                state.record_phase(
                    AgentId::CodeGenerator.as_str(),
                    &outcome,
                    format!("Fixed {} implementation issues", report.implementation_issues.len()),
                );
            }

            state.inner_iteration += 1;
            // Loop back to the auditor
        }
    }

    /// Outer loop: refinement until the evaluator is satisfied
    async fn outer_loop(&mut self, mut state: RunState) -> WorkflowResult {
        let workspace = state.task.workspace.clone();

        // Initial contract creation if the workspace has none
        if !Self::has_contracts(&workspace) {
            if let Some(reason) = self.bootstrap_contracts(&mut state).await {
                return WorkflowResult::failed(reason, state);
            }
        }

        // Summarize once per outer iteration; the digest seeds the cached
        // prefix of every later agent invocation
        self.digest = self.summarizer.summarize(&workspace).unwrap_or_default();

        while state.outer_iteration < state.task.max_outer {
            if self.cancel.is_cancelled() {
                return WorkflowResult::failed(TerminalReason::Cancelled, state);
            }

            info!(
                outer = state.outer_iteration + 1,
                max_outer = state.task.max_outer,
                "WorkflowEngine::outer_loop: iteration start"
            );

            // Fresh progress history per outer step
            self.progress = ProgressTracker::new();
            state.inner_iteration = 0;

            let compliance = self.inner_loop(&mut state).await;

            if compliance < OUTER_GATE {
                info!(compliance, "WorkflowEngine::outer_loop: inner loop below gate");
                return WorkflowResult::failed(TerminalReason::MaxInnerIterationsReached, state);
            }

            // Optional library verification enriches the evaluator context
            let verification = if self.ull_enabled {
                let ws = workspace.clone();
                let strict = self.strict_verification;
                match tokio::task::spawn_blocking(move || crate::verify::verification_summary(&ws, strict)).await {
                    Ok(Some(summary)) => format!("\nLibrary verification results:\n{}\n", summary),
                    _ => String::new(),
                }
            } else {
                String::new()
            };

            // System evaluator
            info!("WorkflowEngine::outer_loop: running evaluator");
            let evaluator_prompt = self
                .prompts
                .render(
                    EVALUATOR_TEMPLATE,
                    &EvaluatorContext {
                        workspace: workspace.display().to_string(),
                        verification,
                    },
                )
                .unwrap_or_default();
            let evaluator_outcome = self.runner.invoke(AgentId::Evaluator, &evaluator_prompt, &workspace, Some(&self.digest)).await;

            if !evaluator_outcome.success {
                warn!(error = ?evaluator_outcome.error, "WorkflowEngine::outer_loop: evaluator failed");
                return WorkflowResult::failed(TerminalReason::EvaluatorFailed, state);
            }

            let verdict = parse_evaluator(&evaluator_outcome.response);
            state.evaluator_satisfied = verdict.satisfied;
            state.evaluator_feedback = verdict.feedback.clone();
            state.record_phase(
                AgentId::Evaluator.as_str(),
                &evaluator_outcome,
                format!("Satisfied: {}", verdict.satisfied),
            );

            if verdict.satisfied {
                // Success path: hand off to the PR orchestrator
                info!("WorkflowEngine::outer_loop: evaluator satisfied, creating PR");
                let pr_outcome = self
                    .runner
                    .invoke(
                        AgentId::PrOrchestrator,
                        "Create pull request for this implementation.",
                        &workspace,
                        Some(&self.digest),
                    )
                    .await;
                let pr_text = pr_outcome.response.clone();
                state.record_phase(AgentId::PrOrchestrator.as_str(), &pr_outcome, "PR created");

                return WorkflowResult::success(TerminalReason::TestsPassed, pr_text, state);
            }

            // Failure path: refine contracts and go around again
            info!("WorkflowEngine::outer_loop: evaluator not satisfied, refining contracts");
            let refiner_prompt = self
                .prompts
                .render(REFINER_TEMPLATE, &RefinerContext { feedback: verdict.feedback })
                .unwrap_or_default();
            let refiner_outcome = self.runner.invoke(AgentId::Refiner, &refiner_prompt, &workspace, Some(&self.digest)).await;

            if !refiner_outcome.success {
                warn!(error = ?refiner_outcome.error, "WorkflowEngine::outer_loop: refiner failed");
                return WorkflowResult::failed(TerminalReason::RefinerFailed, state);
            }
            state.record_phase(AgentId::Refiner.as_str(), &refiner_outcome, "Contracts refined");

            // The refiner edited contracts; the digest is replaced wholesale
            self.digest = self.summarizer.summarize(&workspace).unwrap_or_default();

            state.outer_iteration += 1;
        }

        WorkflowResult::failed(TerminalReason::MaxOuterIterationsReached, state)
    }

    /// Dump the per-iteration diagnostic report to a dotfile
    ///
    /// `.audit_report_<outer>_<inner>.json` - dotted so it never collides
    /// with generated source.
    fn write_audit_report(&self, state: &RunState, report: &AuditReport, raw_response: &str) {
        let path = state
            .task
            .workspace
            .join(format!(".audit_report_{}_{}.json", state.outer_iteration, state.inner_iteration));

        let payload = serde_json::json!({
            "iteration": {"outer": state.outer_iteration, "inner": state.inner_iteration},
            "compliance_score": report.compliance_score,
            "phase_scores": report.phase_scores,
            "implementation_exists": report.implementation_exists,
            "markers_present": report.markers_present,
            "markers_missing": report.markers_missing,
            "files_checked": report.files_checked,
            "environment_issues": report.environment_issues,
            "implementation_issues": report.implementation_issues,
            "violations": report.violations,
            "raw_response": raw_response,
        });

        match serde_json::to_string_pretty(&payload) {
            Ok(json) => {
                if let Err(e) = std::fs::write(&path, json) {
                    warn!(?path, error = %e, "Failed to save audit report");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize audit report"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::TierTable;
    use crate::llm::client::mock::MockLlmClient;
    use crate::llm::{CompletionResponse, StopReason, TokenUsage};
    use std::fs;
    use tempfile::tempdir;

    fn text_response(text: &str) -> CompletionResponse {
        CompletionResponse {
            content: Some(text.to_string()),
            tool_calls: vec![],
            stop_reason: StopReason::EndTurn,
            usage: TokenUsage {
                input_tokens: 100,
                output_tokens: 50,
                cache_creation_tokens: 0,
                cache_read_tokens: 0,
            },
        }
    }

    fn audit_response(score: f64, issues: &[&str]) -> CompletionResponse {
        text_response(
            &serde_json::json!({
                "compliance_score": score,
                "files_checked": [],
                "environment_issues": [],
                "implementation_issues": issues,
            })
            .to_string(),
        )
    }

    fn failed_response() -> CompletionResponse {
        CompletionResponse {
            content: None,
            tool_calls: vec![],
            stop_reason: StopReason::Other("max_tokens".to_string()),
            usage: TokenUsage::default(),
        }
    }

    fn engine_with(responses: Vec<CompletionResponse>) -> (WorkflowEngine, Arc<MockLlmClient>) {
        let mock = Arc::new(MockLlmClient::new(responses));
        let prompts = Arc::new(PromptLoader::embedded_only());
        let runner = AgentRunner::single_client(mock.clone(), TierTable::strong(), prompts.clone());
        (WorkflowEngine::new(runner, prompts, false, false), mock)
    }

    fn seeded_workspace() -> tempfile::TempDir {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("contracts")).unwrap();
        fs::write(
            temp.path().join("contracts/main.qmd"),
            "---\ncontract_id: main-001\n---\n\n# Main\n\n## Parity\n\n**File:** `src/app.py`\n- `ADC-IMPLEMENTS: <app-01>`\n",
        )
        .unwrap();
        temp
    }

    #[tokio::test]
    async fn test_immediate_success_path() {
        let temp = seeded_workspace();
        let (mut engine, mock) = engine_with(vec![
            audit_response(0.9, &[]),
            text_response(r#"{"satisfied": true, "feedback": "all tests pass"}"#),
            text_response("PR: add main implementation"),
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(result.is_success());
        assert_eq!(result.reason, TerminalReason::TestsPassed);
        assert_eq!(result.pr_text, "PR: add main implementation");
        assert_eq!(mock.call_count(), 3);
        // auditor + evaluator + pr phases recorded
        assert_eq!(result.final_state.phase_history.len(), 3);
        assert_eq!(result.total_tokens, 3 * 150);
    }

    #[tokio::test]
    async fn test_stagnation_exits_after_third_audit() {
        let temp = seeded_workspace();
        // Seed a stub so the work list is never empty
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/app.py"), "# ADC-IMPLEMENTS: <app-01>\n").unwrap();

        let issue = ["Missing function in src/app.py:1"];
        let (mut engine, mock) = engine_with(vec![
            audit_response(0.30, &issue),
            text_response("generated"),
            audit_response(0.30, &issue),
            text_response("generated"),
            audit_response(0.30, &issue),
            // Nothing after the third audit: stagnation must exit the loop
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::MaxInnerIterationsReached);
        // Exactly three audits and two code-gen calls - no fourth code-gen
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn test_inner_success_below_outer_gate_fails_run() {
        let temp = seeded_workspace();
        // 0.65 meets the first-iteration target (0.60) but not the 0.80 gate
        let (mut engine, mock) = engine_with(vec![audit_response(0.65, &[])]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::MaxInnerIterationsReached);
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn test_refiner_round_then_success() {
        let temp = seeded_workspace();
        let (mut engine, mock) = engine_with(vec![
            // Outer iteration 0
            audit_response(0.9, &[]),
            text_response(r#"{"satisfied": false, "feedback": "edge cases untested"}"#),
            text_response("contracts refined"),
            // Outer iteration 1
            audit_response(0.95, &[]),
            text_response(r#"{"satisfied": true, "feedback": "good"}"#),
            text_response("PR text"),
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(result.is_success());
        assert_eq!(result.final_state.outer_iteration, 1);
        assert_eq!(result.final_state.evaluator_feedback, "good");
        assert_eq!(mock.call_count(), 6);
    }

    #[tokio::test]
    async fn test_evaluator_failure_is_terminal() {
        let temp = seeded_workspace();
        let (mut engine, _) = engine_with(vec![
            audit_response(0.9, &[]),
            failed_response(), // evaluator dies
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::EvaluatorFailed);
    }

    #[tokio::test]
    async fn test_refiner_failure_is_terminal() {
        let temp = seeded_workspace();
        let (mut engine, _) = engine_with(vec![
            audit_response(0.9, &[]),
            text_response(r#"{"satisfied": false, "feedback": "nope"}"#),
            failed_response(), // refiner dies
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::RefinerFailed);
    }

    #[tokio::test]
    async fn test_zero_codegen_successes_exits_inner_loop() {
        let temp = seeded_workspace();
        let (mut engine, mock) = engine_with(vec![
            audit_response(0.3, &["Missing function in src/app.py:1"]),
            failed_response(), // the only code-gen invocation fails
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::MaxInnerIterationsReached);
        assert_eq!(mock.call_count(), 2);
    }

    #[tokio::test]
    async fn test_audit_report_dotfile_written() {
        let temp = seeded_workspace();
        let (mut engine, _) = engine_with(vec![
            audit_response(0.9, &[]),
            text_response(r#"{"satisfied": true, "feedback": ""}"#),
            text_response("PR"),
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        engine.run(task).await;

        let report_path = temp.path().join(".audit_report_0_0.json");
        assert!(report_path.exists());
        let report: serde_json::Value = serde_json::from_str(&fs::read_to_string(report_path).unwrap()).unwrap();
        assert_eq!(report["compliance_score"], 0.9);
        assert_eq!(report["iteration"]["outer"], 0);
        assert_eq!(report["iteration"]["inner"], 0);
        assert!(report["raw_response"].as_str().is_some());
    }

    #[tokio::test]
    async fn test_unparseable_audit_keeps_previous_score() {
        let temp = seeded_workspace();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src/app.py"), "# stub\n").unwrap();

        let (mut engine, mock) = engine_with(vec![
            text_response("I am sorry, I cannot produce JSON today"),
            text_response("generated"), // stub fallback work list
            audit_response(0.9, &[]),
            text_response(r#"{"satisfied": true, "feedback": ""}"#),
            text_response("PR"),
        ]);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        // First audit unparseable -> previous score 0.0 -> continues through
        // code-gen and recovers on the second audit
        assert!(result.is_success());
        assert_eq!(mock.call_count(), 5);
    }

    #[tokio::test]
    async fn test_outer_cap_reached() {
        let temp = seeded_workspace();
        // Every outer iteration: audit passes gate, evaluator unsatisfied,
        // refiner succeeds. max_outer=2 -> 2 full rounds then cap.
        let mut responses = Vec::new();
        for _ in 0..2 {
            responses.push(audit_response(0.9, &[]));
            responses.push(text_response(r#"{"satisfied": false, "feedback": "not yet"}"#));
            responses.push(text_response("refined"));
        }
        let (mut engine, mock) = engine_with(responses);

        let task = Task::new("build it", temp.path().to_path_buf()).with_caps(2, 10);
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::MaxOuterIterationsReached);
        assert_eq!(mock.call_count(), 6);
        assert_eq!(result.final_state.outer_iteration, 2);
    }

    #[tokio::test]
    async fn test_cancellation_between_phases() {
        let temp = seeded_workspace();
        let (engine, mock) = engine_with(vec![audit_response(0.9, &[])]);
        let cancel = CancelFlag::new();
        cancel.cancel();
        let mut engine = engine.with_cancel(cancel);

        let task = Task::new("build it", temp.path().to_path_buf());
        let result = engine.run(task).await;

        assert!(!result.is_success());
        assert_eq!(result.reason, TerminalReason::Cancelled);
        assert_eq!(mock.call_count(), 0);
    }

    #[test]
    fn test_has_contracts_detection() {
        let temp = tempdir().unwrap();
        assert!(!WorkflowEngine::has_contracts(temp.path()));

        fs::create_dir_all(temp.path().join("contracts")).unwrap();
        assert!(!WorkflowEngine::has_contracts(temp.path()));

        fs::write(temp.path().join("contracts/main.qmd"), "x").unwrap();
        assert!(WorkflowEngine::has_contracts(temp.path()));
    }
}
