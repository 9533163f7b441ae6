//! CLI fallback bridge
//!
//! Last-resort wrapper around a built binary. Can verify that commands
//! exist and capture their stdout; cannot see signatures, types, or docs.

use std::collections::BTreeMap;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::UllError;
use crate::metadata::BridgeKind;

use super::proc::run_with_timeout;
use super::{Bridge, FunctionDescription};

/// Per-command execution timeout
const COMMAND_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for `--help` existence probes
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared-library suffixes that disqualify a file from being the CLI entry
const LIBRARY_SUFFIXES: &[&str] = &["so", "dylib", "dll", "a"];

/// CLI bridge around a discovered executable
#[derive(Debug)]
pub struct CliFallbackBridge {
    workspace: PathBuf,
    executable: Option<PathBuf>,
}

impl CliFallbackBridge {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            executable: None,
        }
    }

    /// Conventional output directories scanned for the executable
    fn search_dirs(&self) -> Vec<PathBuf> {
        vec![
            self.workspace.join("bin"),
            self.workspace.join("build"),
            self.workspace.join("target").join("release"),
            self.workspace.join("target").join("debug"),
            self.workspace.join("dist"),
            self.workspace.clone(),
        ]
    }

    /// Find the first executable-bit file that is not a shared library
    pub fn detect_executable(&self) -> Result<PathBuf, UllError> {
        for dir in self.search_dirs() {
            if !dir.exists() {
                continue;
            }
            let Ok(entries) = std::fs::read_dir(&dir) else {
                continue;
            };
            let mut files: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
            files.sort();
            for file in files {
                if !file.is_file() {
                    continue;
                }
                let Ok(meta) = file.metadata() else {
                    continue;
                };
                if meta.permissions().mode() & 0o111 == 0 {
                    continue;
                }
                let suffix = file.extension().and_then(|e| e.to_str()).unwrap_or("");
                if LIBRARY_SUFFIXES.contains(&suffix) {
                    continue;
                }
                debug!(?file, "CliFallbackBridge::detect_executable: found");
                return Ok(file);
            }
        }

        let searched: Vec<String> = self
            .search_dirs()
            .iter()
            .filter(|d| d.exists())
            .map(|d| d.display().to_string())
            .collect();
        Err(UllError::Load(format!(
            "No CLI executable found in {}\n  Searched: {}\n  Fix: Build your project first, or provide an RPC entry point",
            self.workspace.display(),
            searched.join(", ")
        )))
    }

    /// Discover the executable if not already cached
    pub fn load(&mut self) -> Result<(), UllError> {
        if self.executable.is_none() {
            self.executable = Some(self.detect_executable()?);
        }
        Ok(())
    }

    fn executable(&self) -> Result<&Path, UllError> {
        self.executable
            .as_deref()
            .ok_or_else(|| UllError::Load("CLI bridge not loaded - call load first".to_string()))
    }

    /// Probe whether `<exe> <command> --help` looks like a real subcommand
    pub fn verify_commands_exist(&mut self, required: &[String]) -> Result<BTreeMap<String, bool>, UllError> {
        self.load()?;
        let executable = self.executable()?.to_path_buf();

        let mut results = BTreeMap::new();
        for command in required {
            let mut cmd = Command::new(&executable);
            cmd.args([command.as_str(), "--help"]).current_dir(&self.workspace);

            let exists = match run_with_timeout(cmd, PROBE_TIMEOUT) {
                Ok(output) => {
                    let stdout = String::from_utf8_lossy(&output.stdout).to_lowercase();
                    output.status.success() || stdout.contains("usage") || stdout.contains("help")
                }
                Err(_) => false,
            };
            debug!(%command, exists, "CliFallbackBridge::verify_commands_exist: probed");
            results.insert(command.clone(), exists);
        }

        Ok(results)
    }
}

impl Bridge for CliFallbackBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::CliFallback
    }

    fn invoke(&mut self, method: &str, args: &serde_json::Map<String, Value>) -> Result<Value, UllError> {
        self.load()?;
        let executable = self.executable()?.to_path_buf();

        let mut cli_args: Vec<String> = vec![method.to_string()];
        for (key, value) in args {
            // Keyword arguments become --key value, underscores to hyphens
            cli_args.push(format!("--{}", key.replace('_', "-")));
            let rendered = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            cli_args.push(rendered);
        }

        debug!(?executable, ?cli_args, "CliFallbackBridge::invoke: running");
        let mut cmd = Command::new(&executable);
        cmd.args(&cli_args).current_dir(&self.workspace);

        let output = run_with_timeout(cmd, COMMAND_TIMEOUT).map_err(|e| {
            if e.is_timeout() {
                UllError::Conformance(format!(
                    "CLI command timed out after 30 seconds: {}\n  Command: {} {}",
                    method,
                    executable.display(),
                    cli_args.join(" ")
                ))
            } else {
                e
            }
        })?;

        if !output.status.success() {
            return Err(UllError::Conformance(format!(
                "CLI command failed: {}\n  Command: {} {}\n  Exit code: {}\n  Error: {}",
                method,
                executable.display(),
                cli_args.join(" "),
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        Ok(Value::String(String::from_utf8_lossy(&output.stdout).into_owned()))
    }

    fn has_function(&mut self, name: &str) -> bool {
        match self.verify_commands_exist(std::slice::from_ref(&name.to_string())) {
            Ok(results) => results.get(name).copied().unwrap_or(false),
            Err(_) => false,
        }
    }

    fn describe(&mut self) -> Option<BTreeMap<String, FunctionDescription>> {
        // Opaque binaries cannot self-describe
        None
    }

    fn close(&mut self) {
        self.executable = None;
    }
}
