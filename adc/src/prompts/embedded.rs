//! Embedded role prompts
//!
//! Compiled into the binary from prompts/*.md at build time.

use tracing::debug;

pub const CONTRACT_WRITER: &str = include_str!("../../prompts/contract_writer.md");
pub const AUDITOR: &str = include_str!("../../prompts/auditor.md");
pub const CODE_GENERATOR: &str = include_str!("../../prompts/code_generator.md");
pub const SYSTEM_EVALUATOR: &str = include_str!("../../prompts/system_evaluator.md");
pub const REFINER: &str = include_str!("../../prompts/refiner.md");
pub const PR_ORCHESTRATOR: &str = include_str!("../../prompts/pr_orchestrator.md");

/// Get the embedded role prompt by file stem
pub fn get_embedded(name: &str) -> Option<&'static str> {
    debug!(%name, "get_embedded: called");
    match name {
        "contract_writer" => Some(CONTRACT_WRITER),
        "auditor" => Some(AUDITOR),
        "code_generator" => Some(CODE_GENERATOR),
        "system_evaluator" => Some(SYSTEM_EVALUATOR),
        "refiner" => Some(REFINER),
        "pr_orchestrator" => Some(PR_ORCHESTRATOR),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_roles_embedded() {
        for name in [
            "contract_writer",
            "auditor",
            "code_generator",
            "system_evaluator",
            "refiner",
            "pr_orchestrator",
        ] {
            let prompt = get_embedded(name);
            assert!(prompt.is_some(), "missing embedded prompt: {}", name);
            assert!(!prompt.unwrap().is_empty());
        }
    }

    #[test]
    fn test_unknown_role_is_none() {
        assert!(get_embedded("mystery_agent").is_none());
    }

    #[test]
    fn test_auditor_mentions_json_output() {
        assert!(AUDITOR.contains("compliance_score"));
    }
}
