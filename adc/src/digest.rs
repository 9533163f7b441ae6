//! Contract Summarizer
//!
//! Turns the corpus of contract files into a small structured digest that
//! is cached on the LLM provider and reused across every agent invocation.
//! Stability across iterations is what makes the caching economical: the
//! digest only changes when the refiner edits contracts.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use eyre::Result;
use regex::Regex;
use tracing::debug;
use walkdir::WalkDir;

/// Cap on parity file paths extracted per contract
const MAX_PARITY_FILES: usize = 10;

/// Cap on requirement bullets extracted per contract
const MAX_REQUIREMENTS: usize = 3;

/// Summary of one contract file
#[derive(Debug, Clone)]
pub struct ContractSummary {
    /// Contract file name (e.g. "main.qmd")
    pub file_name: String,

    /// Contract ID from the YAML front matter, if present
    pub contract_id: Option<String>,

    /// Implementation file paths from the parity section
    pub parity_files: Vec<String>,

    /// Leading requirement bullets
    pub requirements: Vec<String>,
}

/// Compact, stable summary of all contracts
///
/// Replaced wholesale when the refiner edits contracts.
#[derive(Debug, Clone, Default)]
pub struct ContractDigest {
    pub contracts: Vec<ContractSummary>,
}

impl ContractDigest {
    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }

    /// Render the digest to the cacheable context string
    pub fn render(&self) -> String {
        let mut lines = vec![format!("# Contracts ({})", self.contracts.len()), String::new()];

        for contract in &self.contracts {
            lines.push(format!("## {}", contract.file_name));
            if let Some(id) = &contract.contract_id {
                lines.push(format!("ID: {}", id));
            }
            if !contract.parity_files.is_empty() {
                lines.push(format!("Files: {}", contract.parity_files.join(", ")));
            }
            for requirement in &contract.requirements {
                lines.push(format!("- {}", requirement));
            }
            lines.push(String::new());
        }

        lines.join("\n")
    }
}

/// Builds digests from the contracts directory
pub struct ContractSummarizer {
    contract_id: Regex,
    parity_file: Regex,
    bullet: Regex,
}

impl Default for ContractSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractSummarizer {
    pub fn new() -> Self {
        Self {
            contract_id: Regex::new(r"(?m)^contract_id:\s*(.+)$").expect("static regex"),
            parity_file: Regex::new(r"\*\*File:\*\*\s+`([^`]+)`").expect("static regex"),
            bullet: Regex::new(r"(?m)^\s*[-*]\s+(.+)$").expect("static regex"),
        }
    }

    /// Summarize every contract under `<workspace>/contracts/`
    ///
    /// Accepts both `.qmd` and `.md` extensions; when both exist for the
    /// same base name, `.md` wins. Missing directory yields an empty
    /// digest.
    pub fn summarize(&self, workspace: &Path) -> Result<ContractDigest> {
        let contracts_dir = workspace.join("contracts");
        debug!(?contracts_dir, "ContractSummarizer::summarize: called");

        if !contracts_dir.exists() {
            return Ok(ContractDigest::default());
        }

        // base name -> chosen path (.md beats .qmd)
        let mut chosen: BTreeMap<String, PathBuf> = BTreeMap::new();
        for entry in WalkDir::new(&contracts_dir).into_iter().filter_map(|e| e.ok()) {
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let Some(extension) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if extension != "qmd" && extension != "md" {
                continue;
            }
            let base = path.with_extension("").display().to_string();
            match chosen.get(&base) {
                Some(existing) if existing.extension().and_then(|e| e.to_str()) == Some("md") => {}
                _ => {
                    if extension == "md" || !chosen.contains_key(&base) {
                        chosen.insert(base, path.to_path_buf());
                    }
                }
            }
        }

        let mut contracts = Vec::new();
        for path in chosen.values() {
            let content = std::fs::read_to_string(path)?;
            contracts.push(self.summarize_one(path, &content));
        }

        debug!(count = contracts.len(), "ContractSummarizer::summarize: complete");
        Ok(ContractDigest { contracts })
    }

    fn summarize_one(&self, path: &Path, content: &str) -> ContractSummary {
        let contract_id = self.contract_id.captures(content).map(|c| c[1].trim().to_string());

        let parity_files: Vec<String> = self
            .parity_file
            .captures_iter(content)
            .map(|c| c[1].to_string())
            .take(MAX_PARITY_FILES)
            .collect();

        // First bullets under a "Requirements" heading
        let requirements = match content.find("## Requirements") {
            Some(offset) => {
                let section = &content[offset..];
                let section_end = section[2..].find("\n## ").map(|i| i + 2).unwrap_or(section.len());
                self.bullet
                    .captures_iter(&section[..section_end])
                    .map(|c| c[1].trim().to_string())
                    .take(MAX_REQUIREMENTS)
                    .collect()
            }
            None => Vec::new(),
        };

        ContractSummary {
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_default(),
            contract_id,
            parity_files,
            requirements,
        }
    }
}
