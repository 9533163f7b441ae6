//! Contract interface extraction
//!
//! Parses an ADC contract file (YAML front matter + markdown) into the
//! expected-interface specification the verifier checks against.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use regex::Regex;
use tracing::debug;

use crate::error::UllError;

/// Expected function signature declared by a contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionSignature {
    pub name: String,
    /// Parameter name -> type annotation (empty when the contract does not
    /// annotate)
    pub parameters: BTreeMap<String, String>,
    pub return_type: Option<String>,
    pub is_required: bool,
}

/// Expected interface extracted from one ADC contract
#[derive(Debug, Clone)]
pub struct ExpectedInterface {
    pub contract_id: String,

    /// Functions the implementation must expose
    pub required_functions: BTreeMap<String, FunctionSignature>,

    /// Block IDs that must carry ADC-IMPLEMENTS markers in source
    pub required_block_ids: BTreeSet<String>,
}

/// Extracts expected interfaces from contract files
pub struct ContractInterfaceExtractor {
    front_matter: Regex,
    contract_id: Regex,
    block_id: Regex,
    fenced_code: Regex,
    function_def: Regex,
}

impl Default for ContractInterfaceExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl ContractInterfaceExtractor {
    pub fn new() -> Self {
        Self {
            front_matter: Regex::new(r"(?s)\A---\n(.*?)\n---").expect("static regex"),
            contract_id: Regex::new(r"(?m)^contract_id:\s*(.+)$").expect("static regex"),
            block_id: Regex::new(r"<([a-zA-Z0-9_-]+)>").expect("static regex"),
            fenced_code: Regex::new(r"(?s)```[a-zA-Z+]*\n(.*?)\n```").expect("static regex"),
            function_def: Regex::new(r"(?:def|fn)\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*\(").expect("static regex"),
        }
    }

    /// Parse a contract file into its expected interface
    pub fn extract(&self, contract_path: &Path) -> Result<ExpectedInterface, UllError> {
        debug!(?contract_path, "ContractInterfaceExtractor::extract: called");
        if !contract_path.exists() {
            return Err(UllError::ContractNotFound(contract_path.to_path_buf()));
        }

        let contract_text = std::fs::read_to_string(contract_path)?;
        let contract_id = self.extract_contract_id(&contract_text)?;
        let required_block_ids = self.extract_block_ids(&contract_text);
        let required_functions = self.extract_functions(&contract_text);

        debug!(
            %contract_id,
            blocks = required_block_ids.len(),
            functions = required_functions.len(),
            "ContractInterfaceExtractor::extract: parsed"
        );
        Ok(ExpectedInterface {
            contract_id,
            required_functions,
            required_block_ids,
        })
    }

    fn extract_contract_id(&self, contract_text: &str) -> Result<String, UllError> {
        if let Some(front_matter) = self.front_matter.captures(contract_text)
            && let Some(id) = self.contract_id.captures(&front_matter[1])
        {
            return Ok(id[1].trim().to_string());
        }

        Err(UllError::Load(
            "Could not find contract_id in contract YAML front matter\n  Fix: Ensure contract has YAML front matter with contract_id field"
                .to_string(),
        ))
    }

    /// Block IDs appear as `<block-id>` tokens anywhere in the contract
    fn extract_block_ids(&self, contract_text: &str) -> BTreeSet<String> {
        self.block_id
            .captures_iter(contract_text)
            .map(|c| c[1].to_string())
            .collect()
    }

    /// Required functions come from fenced code blocks (`def name(` and
    /// `fn name(` forms); detailed signature parsing is left to the
    /// self-describing bridges.
    fn extract_functions(&self, contract_text: &str) -> BTreeMap<String, FunctionSignature> {
        let mut functions = BTreeMap::new();
        for block in self.fenced_code.captures_iter(contract_text) {
            for def in self.function_def.captures_iter(&block[1]) {
                let name = def[1].to_string();
                functions.insert(
                    name.clone(),
                    FunctionSignature {
                        name,
                        parameters: BTreeMap::new(),
                        return_type: None,
                        is_required: true,
                    },
                );
            }
        }
        functions
    }
}
