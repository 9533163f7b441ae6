//! ADC - CLI entry point
//!
//! Exit codes: 0 on success, 1 on generic failure, 130 on user interrupt.

use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tracing::{debug, info};

use adc::agent::{AgentRunner, TierTable};
use adc::cancel::CancelFlag;
use adc::cli::{Cli, Command};
use adc::config::{Config, verbose_enabled};
use adc::digest::ContractSummarizer;
use adc::domain::Task;
use adc::llm::create_client;
use adc::prompts::PromptLoader;
use adc::scheduler::WorkflowEngine;

/// Exit code reported on user interrupt
const EXIT_INTERRUPTED: i32 = 130;

fn setup_logging(cli_log_level: Option<&str>) -> Result<()> {
    // Priority: CLI --log-level > ADC_VERBOSE > INFO default
    let level = if let Some(s) = cli_log_level {
        match s.to_uppercase().as_str() {
            "TRACE" => tracing::Level::TRACE,
            "DEBUG" => tracing::Level::DEBUG,
            "INFO" => tracing::Level::INFO,
            "WARN" | "WARNING" => tracing::Level::WARN,
            "ERROR" => tracing::Level::ERROR,
            other => {
                eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", other);
                tracing::Level::INFO
            }
        }
    } else if verbose_enabled() {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()))
        .init();

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

fn resolve_workspace(workspace: Option<PathBuf>) -> Result<PathBuf> {
    match workspace {
        Some(path) => Ok(path),
        None => std::env::current_dir().context("Failed to get current directory"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging(cli.log_level.as_deref()).context("Failed to setup logging")?;

    let config = Config::load(cli.config.as_ref()).context("Failed to load configuration")?;

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command {
        Command::Run {
            task,
            workspace,
            max_outer,
            max_inner,
            tier_preset,
        } => cmd_run(&config, &task, workspace, max_outer, max_inner, tier_preset).await,
        Command::Verify { workspace, strict } => cmd_verify(&config, workspace, strict),
        Command::Summarize { workspace } => cmd_summarize(workspace),
    }
}

/// Run the workflow for one task
async fn cmd_run(
    config: &Config,
    task_description: &str,
    workspace: Option<PathBuf>,
    max_outer: Option<u32>,
    max_inner: Option<u32>,
    tier_preset: Option<String>,
) -> Result<()> {
    debug!(%task_description, "cmd_run: called");

    // Validate the API key early, before any workspace mutation
    config.llm.require_api_key().context("LLM API key not found")?;

    let workspace = resolve_workspace(workspace)?;
    std::fs::create_dir_all(&workspace).context("Failed to create workspace directory")?;

    let mut task = Task::new(task_description, workspace.clone());
    task.max_outer = max_outer.unwrap_or(config.workflow.max_outer);
    task.max_inner = max_inner.unwrap_or(config.workflow.max_inner);

    let preset = tier_preset.as_deref().unwrap_or(&config.workflow.tier_preset);
    let tiers = TierTable::from_preset(preset);

    println!("Running ADC workflow");
    println!("  Task: {}", task.description);
    println!("  Workspace: {}", workspace.display());
    println!("  Max iterations: {} outer x {} inner", task.max_outer, task.max_inner);
    println!();

    let llm_strong = create_client(&config.llm, &config.llm.strong_model, config.llm.strong_max_tokens)
        .context("Failed to create LLM client")?;
    let llm_light = create_client(&config.llm, &config.llm.light_model, config.llm.light_max_tokens)
        .context("Failed to create LLM client")?;

    let prompts = Arc::new(PromptLoader::new(&workspace));
    let cancel = CancelFlag::new();
    let runner = AgentRunner::new(llm_strong, llm_light, tiers, prompts.clone(), cancel.clone());

    let mut engine = WorkflowEngine::new(
        runner,
        prompts,
        config.verification.ull_effective(),
        config.verification.strict,
    )
    .with_cancel(cancel.clone());

    // Ctrl-C requests cooperative cancellation; a second one force-exits
    let signal_cancel = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\nInterrupt received, cancelling after the current phase...");
            signal_cancel.cancel();
            if tokio::signal::ctrl_c().await.is_ok() {
                std::process::exit(EXIT_INTERRUPTED);
            }
        }
    });

    let result = engine.run(task).await;

    println!();
    if result.is_success() {
        println!("{} {}", "OK".green().bold(), result.reason);
    } else {
        println!("{} {}", "FAILED".red().bold(), result.reason);
    }
    println!("  Outer iterations: {}", result.final_state.outer_iteration);
    println!("  Phases recorded: {}", result.final_state.phase_history.len());
    println!("  Total tokens: {}", result.total_tokens);
    println!("  Total cost: ${:.2}", result.total_cost_usd);
    println!("  Execution time: {:.1}s", result.execution_time_seconds);
    if !result.pr_text.is_empty() {
        println!();
        println!("{}", result.pr_text);
    }

    if !result.is_success() {
        if result.reason == adc::domain::TerminalReason::Cancelled {
            std::process::exit(EXIT_INTERRUPTED);
        }
        std::process::exit(1);
    }
    Ok(())
}

/// Verify the workspace library against its contracts
fn cmd_verify(config: &Config, workspace: Option<PathBuf>, strict: bool) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    debug!(?workspace, strict, "cmd_verify: called");

    let strict = strict || config.verification.strict;
    let verifications = match adc::verify::verify_workspace(&workspace, strict) {
        Ok(v) => v,
        Err(e) => {
            println!("{} {}", "FAILED".red().bold(), e);
            std::process::exit(1);
        }
    };

    if verifications.is_empty() {
        println!("No contracts found under {}", workspace.join("contracts").display());
        return Ok(());
    }

    let mut all_compliant = true;
    for v in &verifications {
        let status = if v.result.is_compliant {
            "OK".green().bold()
        } else {
            all_compliant = false;
            "NONCOMPLIANT".red().bold()
        };
        println!(
            "{} {} (level: {}, score: {:.2})",
            status,
            v.contract_file,
            v.result.verification_level,
            v.result.compliance_score()
        );
        for missing in &v.result.required_functions_missing {
            println!("    missing function: {}", missing);
        }
        for missing in &v.result.markers_missing {
            println!("    missing marker: <{}>", missing);
        }
        for error in &v.result.verification_errors {
            println!("    error: {}", error);
        }
    }

    if !all_compliant {
        std::process::exit(1);
    }
    Ok(())
}

/// Print the contract digest for a workspace
fn cmd_summarize(workspace: Option<PathBuf>) -> Result<()> {
    let workspace = resolve_workspace(workspace)?;
    debug!(?workspace, "cmd_summarize: called");

    let digest = ContractSummarizer::new().summarize(&workspace)?;
    if digest.is_empty() {
        println!("No contracts found under {}", workspace.join("contracts").display());
    } else {
        println!("{}", digest.render());
    }
    Ok(())
}
