//! ADC-IMPLEMENTS marker scanning
//!
//! Searches workspace text files for marker comments of the form
//! `ADC-IMPLEMENTS: <block-id>` and returns the captured block IDs.
//! Prefers ripgrep, falls back to portable grep, and fails with an
//! installation hint when neither is present.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use regex::Regex;
use tracing::debug;

use crate::bridges::proc::run_with_timeout;
use crate::error::UllError;

/// Marker grammar shared by the scanner and the stub writer
pub const MARKER_PATTERN: &str = r"ADC-IMPLEMENTS:\s*<([a-zA-Z0-9_-]+)>";

/// Scan deadline; exceeding it is a reported failure, never silent
const SCAN_TIMEOUT: Duration = Duration::from_secs(10);

/// Scans a workspace for marker comments
pub struct MarkerScanner {
    workspace: PathBuf,
}

impl MarkerScanner {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
        }
    }

    /// Find every marker block ID in the workspace
    ///
    /// `extensions` restricts the scan to matching files (e.g. `[".py",
    /// ".rs"]`); None scans all text files.
    pub fn find_markers(&self, extensions: Option<&[&str]>) -> Result<BTreeSet<String>, UllError> {
        debug!(workspace = ?self.workspace, ?extensions, "MarkerScanner::find_markers: called");
        match self.scan_with_rg(extensions) {
            Ok(markers) => Ok(markers),
            Err(UllError::Timeout(t)) => Err(UllError::MarkerScan(format!(
                "Marker search timed out after {}s\n  Workspace: {}\n  Fix: Reduce workspace size",
                t.as_secs(),
                self.workspace.display()
            ))),
            Err(e) => {
                debug!(error = %e, "MarkerScanner::find_markers: rg unavailable, falling back to grep");
                self.scan_with_grep(extensions)
            }
        }
    }

    fn scan_with_rg(&self, extensions: Option<&[&str]>) -> Result<BTreeSet<String>, UllError> {
        let mut cmd = Command::new("rg");
        cmd.args(["--no-heading", "--no-filename", "--only-matching", "--replace", "$1"])
            .arg(MARKER_PATTERN);
        if let Some(extensions) = extensions {
            for ext in extensions {
                cmd.args(["--glob", &format!("*{}", ext)]);
            }
        }
        cmd.arg(&self.workspace);

        let output = run_with_timeout(cmd, SCAN_TIMEOUT)?;
        // rg exits 1 on zero matches; only 2+ signals a real error
        if let Some(code) = output.status.code()
            && code > 1
        {
            return Err(UllError::MarkerScan(format!(
                "ripgrep failed (exit {}): {}",
                code,
                String::from_utf8_lossy(&output.stderr)
            )));
        }

        let markers = String::from_utf8_lossy(&output.stdout)
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect();
        Ok(markers)
    }

    fn scan_with_grep(&self, extensions: Option<&[&str]>) -> Result<BTreeSet<String>, UllError> {
        let mut cmd = Command::new("grep");
        cmd.args(["-r", "-h", "-o", "-E", MARKER_PATTERN]);
        if let Some(extensions) = extensions {
            for ext in extensions {
                cmd.arg(format!("--include=*{}", ext));
            }
        }
        cmd.arg(&self.workspace);

        let output = match run_with_timeout(cmd, SCAN_TIMEOUT) {
            Ok(output) => output,
            Err(UllError::Timeout(t)) => {
                return Err(UllError::MarkerScan(format!(
                    "Marker search timed out after {}s\n  Workspace: {}\n  Fix: Reduce workspace size or install ripgrep (rg)",
                    t.as_secs(),
                    self.workspace.display()
                )));
            }
            Err(_) => {
                return Err(UllError::MarkerScan(
                    "Neither ripgrep (rg) nor grep found\n  Fix: Install ripgrep (brew install ripgrep / apt install ripgrep) or ensure grep is in PATH"
                        .to_string(),
                ));
            }
        };

        // grep emits the full match; extract the captured block ID
        let pattern = Regex::new(MARKER_PATTERN).expect("static regex");
        let markers = String::from_utf8_lossy(&output.stdout)
            .lines()
            .filter_map(|line| pattern.captures(line).map(|c| c[1].to_string()))
            .collect();
        Ok(markers)
    }

    /// Compare required block IDs against discovered markers
    ///
    /// Returns (is_complete, missing). A block ID never appears in both the
    /// found and missing sets.
    pub fn verify_coverage(required: &BTreeSet<String>, found: &BTreeSet<String>) -> (bool, BTreeSet<String>) {
        let missing: BTreeSet<String> = required.difference(found).cloned().collect();
        (missing.is_empty(), missing)
    }
}
