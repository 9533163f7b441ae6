//! Library verification seam
//!
//! Bridges the workflow engine to the ULL crate: extract every contract's
//! expected interface, load the workspace library through the best
//! available bridge, verify compliance, and render a compact report.
//! Verification failures are reported, never fatal to a run.

use std::path::Path;

use tracing::{debug, warn};
use ull::{ContractInterfaceExtractor, VerificationResult, load_library, verify_compliance};
use walkdir::WalkDir;

/// Per-contract verification outcome
#[derive(Debug)]
pub struct ContractVerification {
    pub contract_file: String,
    pub result: VerificationResult,
}

/// Verify the workspace library against every contract
///
/// Synchronous (the ULL crate blocks on subprocess I/O); the engine calls
/// this through `spawn_blocking`. Returns None when the workspace has no
/// contracts.
pub fn verify_workspace(workspace: &Path, strict: bool) -> Result<Vec<ContractVerification>, ull::UllError> {
    debug!(?workspace, strict, "verify_workspace: called");

    let contracts_dir = workspace.join("contracts");
    let mut contract_files: Vec<_> = WalkDir::new(&contracts_dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.path().is_file()
                && matches!(e.path().extension().and_then(|x| x.to_str()), Some("qmd") | Some("md"))
        })
        .map(|e| e.path().to_path_buf())
        .collect();
    contract_files.sort();

    if contract_files.is_empty() {
        return Ok(Vec::new());
    }

    let (mut bridge, metadata) = load_library(workspace, None, strict)?;
    let extractor = ContractInterfaceExtractor::new();

    let mut verifications = Vec::new();
    for contract_file in &contract_files {
        let expected = match extractor.extract(contract_file) {
            Ok(expected) => expected,
            Err(e) => {
                warn!(?contract_file, error = %e, "verify_workspace: contract extraction failed");
                continue;
            }
        };

        let result = verify_compliance(&expected, bridge.as_mut(), &metadata, workspace);
        verifications.push(ContractVerification {
            contract_file: contract_file.display().to_string(),
            result,
        });
    }

    bridge.close();
    Ok(verifications)
}

/// Render a compact verification summary for the evaluator prompt
///
/// None when verification could not run at all (no library, no contracts);
/// load blockers are logged and swallowed - fatal to the verification
/// phase, not to the run.
pub fn verification_summary(workspace: &Path, strict: bool) -> Option<String> {
    let verifications = match verify_workspace(workspace, strict) {
        Ok(v) if !v.is_empty() => v,
        Ok(_) => return None,
        Err(e) => {
            warn!(error = %e, "verification_summary: library verification unavailable");
            return None;
        }
    };

    let mut lines = Vec::new();
    for v in &verifications {
        let verdict = if v.result.is_passing() { "PASS" } else { "FAIL" };
        lines.push(format!(
            "- {}: {} (level {}, score {:.2}), {} functions found, {} missing, markers missing: [{}]",
            v.contract_file,
            verdict,
            v.result.verification_level,
            v.result.compliance_score(),
            v.result.required_functions_found.len(),
            v.result.required_functions_missing.len(),
            v.result.markers_missing.join(", "),
        ));
    }
    Some(lines.join("\n"))
}
