//! Contract bootstrap helpers
//!
//! Pure local operations around contract creation: stub materialization
//! from parity sections and workspace file listings. No LLM calls here.

use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

/// Directories excluded from work lists and file listings
const EXCLUDED_DIRS: &[&str] = &[
    "contracts",
    ".git",
    ".hg",
    ".svn",
    ".adc",
    ".venv",
    "venv",
    "__pycache__",
    "node_modules",
    "target",
];

/// Source extensions eligible for the stub work list
const SOURCE_EXTENSIONS: &[&str] = &["py", "rs", "go", "js", "ts", "java"];

/// Comment prefix for a stub file, chosen by its extension
fn comment_prefix(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).unwrap_or("") {
        "rs" | "go" | "js" | "ts" | "java" | "c" | "cc" | "cpp" | "h" | "hpp" | "dart" => "//",
        "lua" | "sql" => "--",
        _ => "#",
    }
}

fn is_excluded(relative: &Path) -> bool {
    relative
        .components()
        .any(|c| EXCLUDED_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
}

/// Create stub files from a contract's parity section
///
/// Finds `## Parity` (or `### Parity`) sections, extracts `**File:**`
/// entries and their backticked `ADC-IMPLEMENTS:` markers, and writes an
/// empty placeholder per file so the code generator always has a concrete
/// file to edit. Existing files are never touched.
///
/// Returns the workspace-relative paths of the stubs created.
pub fn create_stubs_from_parity(workspace: &Path, contract_path: &Path) -> Vec<String> {
    debug!(?contract_path, "create_stubs_from_parity: called");
    let mut created = Vec::new();

    let content = match std::fs::read_to_string(contract_path) {
        Ok(content) => content,
        Err(e) => {
            warn!(?contract_path, error = %e, "Failed to read contract");
            return created;
        }
    };

    let heading = Regex::new(r"(?m)^(#{1,3})\s+(.*)$").expect("static regex");
    let file_entry = Regex::new(r"\*\*File:\*\*\s+`([^`]+)`").expect("static regex");
    let implements = Regex::new(r"`(ADC-IMPLEMENTS:\s+[^`]+)`").expect("static regex");

    // Slice the contract into sections by heading; keep the parity ones
    let mut sections: Vec<&str> = Vec::new();
    let headings: Vec<(usize, usize, String)> = heading
        .captures_iter(&content)
        .map(|c| {
            let m = c.get(0).expect("whole match");
            (m.start(), m.end(), c[2].to_string())
        })
        .collect();

    for (i, (_, body_start, title)) in headings.iter().enumerate() {
        if !title.to_lowercase().contains("parity") {
            continue;
        }
        let body_end = headings.get(i + 1).map(|(s, _, _)| *s).unwrap_or(content.len());
        sections.push(&content[*body_start..body_end]);
    }

    for section in sections {
        // A parity section can name several files; markers between one
        // **File:** entry and the next belong to that file.
        let entries: Vec<(usize, String)> = file_entry
            .captures_iter(section)
            .map(|c| (c.get(0).expect("whole match").start(), c[1].to_string()))
            .collect();

        for (i, (start, file_path)) in entries.iter().enumerate() {
            let end = entries.get(i + 1).map(|(s, _)| *s).unwrap_or(section.len());
            let slice = &section[*start..end];

            let markers: Vec<String> = implements.captures_iter(slice).map(|c| c[1].to_string()).collect();
            if markers.is_empty() {
                continue;
            }

            let target = workspace.join(file_path);
            if target.exists() {
                debug!(%file_path, "create_stubs_from_parity: file exists, skipping");
                continue;
            }

            if let Some(parent) = target.parent()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                warn!(%file_path, error = %e, "Failed to create stub directories");
                continue;
            }

            let prefix = comment_prefix(&target);
            let mut lines = vec![
                format!("{} {}", prefix, markers[0]),
                format!("{} Stub for {} generated from the contract parity section.", prefix, file_path),
                format!("{} Complete the implementations below.", prefix),
                String::new(),
            ];
            for marker in &markers[1..] {
                lines.push(format!("{} {}", prefix, marker));
                lines.push(String::new());
            }

            match std::fs::write(&target, lines.join("\n")) {
                Ok(()) => {
                    debug!(%file_path, "create_stubs_from_parity: stub created");
                    created.push(file_path.clone());
                }
                Err(e) => {
                    warn!(%file_path, error = %e, "Failed to create stub");
                }
            }
        }
    }

    created
}

/// List workspace files for prompt context
///
/// Sorted, workspace-relative, dotfiles and excluded directories skipped.
pub fn list_workspace_files(workspace: &Path) -> String {
    let mut files = Vec::new();
    for entry in WalkDir::new(workspace).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(workspace) else {
            continue;
        };
        if is_excluded(relative) {
            continue;
        }
        if relative
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true)
        {
            continue;
        }
        files.push(relative.display().to_string());
    }

    files.sort();
    if files.is_empty() {
        return "  (no files yet)".to_string();
    }
    files.iter().map(|f| format!("  - {}", f)).collect::<Vec<_>>().join("\n")
}

/// Source files usable as the fallback work list
///
/// When the auditor's issues name no files, the stubs materialized at
/// contract-creation time become the work list. Excludes contracts, VCS
/// directories, caches, and virtual envs.
pub fn stub_candidates(workspace: &Path) -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    for entry in WalkDir::new(workspace).into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Ok(relative) = path.strip_prefix(workspace) else {
            continue;
        };
        if is_excluded(relative) {
            continue;
        }
        if relative
            .file_name()
            .map(|n| n.to_string_lossy().starts_with('.'))
            .unwrap_or(true)
        {
            continue;
        }
        let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
            continue;
        };
        if SOURCE_EXTENSIONS.contains(&extension) {
            candidates.push(relative.to_path_buf());
        }
    }
    candidates.sort();
    candidates
}
