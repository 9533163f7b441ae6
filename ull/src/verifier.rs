//! Compliance verification
//!
//! Checks a loaded library against a contract's expected interface:
//! function presence, signature comparison where the bridge allows it,
//! and ADC-IMPLEMENTS marker coverage.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::bridges::Bridge;
use crate::extract::ExpectedInterface;
use crate::marker::MarkerScanner;
use crate::metadata::{BridgeKind, LibraryMetadata, VerificationLevel};

/// Details of one signature mismatch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureMismatch {
    pub function_name: String,
    pub expected_signature: String,
    pub found_signature: String,
    pub mismatch_details: Vec<String>,
}

/// Result of verifying a library against one contract
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationResult {
    pub is_compliant: bool,
    pub verification_level: VerificationLevel,

    pub required_functions_found: Vec<String>,
    pub required_functions_missing: Vec<String>,

    pub signature_matches: BTreeMap<String, bool>,
    pub signature_mismatches: Vec<SignatureMismatch>,

    pub markers_found: Vec<String>,
    pub markers_missing: Vec<String>,

    pub verification_errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl VerificationResult {
    /// Compliance score in [0, 1]
    ///
    /// (found - signature mismatches - missing markers) / (found + missing),
    /// clamped.
    pub fn compliance_score(&self) -> f64 {
        let total = self.required_functions_found.len() + self.required_functions_missing.len();
        if total == 0 {
            return 0.0;
        }

        let passed = self.required_functions_found.len() as f64
            - self.signature_mismatches.len() as f64
            - self.markers_missing.len() as f64;

        (passed / total as f64).clamp(0.0, 1.0)
    }

    /// Whether verification meets the minimum bar for acceptance
    pub fn is_passing(&self) -> bool {
        self.is_compliant
            && self.required_functions_missing.is_empty()
            && self.markers_missing.is_empty()
            && self.compliance_score() >= 0.8
    }
}

/// Verify a loaded library against an expected interface
///
/// Marker-scan and bridge failures land on the result's error list; this
/// function itself never fails.
pub fn verify_compliance(
    expected: &ExpectedInterface,
    bridge: &mut dyn Bridge,
    metadata: &LibraryMetadata,
    workspace: &Path,
) -> VerificationResult {
    debug!(contract_id = %expected.contract_id, "verify_compliance: called");

    let mut found = Vec::new();
    let mut missing = Vec::new();
    let mut signature_matches = BTreeMap::new();
    let mut signature_mismatches = Vec::new();
    let mut verification_errors = Vec::new();
    let mut warnings = Vec::new();

    // Step 1: function presence
    for name in expected.required_functions.keys() {
        if bridge.has_function(name) {
            found.push(name.clone());
            signature_matches.insert(name.clone(), true);
        } else {
            missing.push(name.clone());
            signature_matches.insert(name.clone(), false);
        }
    }

    // Step 2: signature comparison, where the bridge can self-describe
    if metadata.supports_signature_verification {
        match bridge.describe() {
            Some(descriptions) => {
                for name in &found {
                    let Some(description) = descriptions.get(name) else {
                        continue;
                    };
                    let expected_sig = &expected.required_functions[name];
                    let mut details = Vec::new();
                    for param in expected_sig.parameters.keys() {
                        if !description.parameters.contains_key(param) {
                            details.push(format!("Missing parameter '{}'", param));
                        }
                    }
                    for (param, expected_type) in &expected_sig.parameters {
                        if let Some(found_type) = description.parameters.get(param)
                            && !expected_type.is_empty()
                            && found_type != expected_type
                        {
                            details.push(format!(
                                "Parameter '{}' type mismatch: expected {}, found {}",
                                param, expected_type, found_type
                            ));
                        }
                    }
                    if !details.is_empty() {
                        signature_matches.insert(name.clone(), false);
                        signature_mismatches.push(SignatureMismatch {
                            function_name: name.clone(),
                            expected_signature: format!("{:?}", expected_sig.parameters),
                            found_signature: format!("{:?}", description.parameters),
                            mismatch_details: details,
                        });
                    }
                }
            }
            None => {
                warnings.push("Signature verification supported but the library did not describe itself".to_string());
            }
        }
    } else {
        warnings.push(format!(
            "Limited verification - signature checking not available for {}",
            metadata.bridge_kind
        ));
    }

    // Step 3: marker coverage, scoped to the detected language's extensions
    let scanner = MarkerScanner::new(workspace);
    let extensions = metadata.detected_language.source_extensions();
    let (markers_found, markers_missing) = match scanner.find_markers(Some(extensions)) {
        Ok(discovered) => {
            let (_, missing_ids) = MarkerScanner::verify_coverage(&expected.required_block_ids, &discovered);
            let found_ids: BTreeSet<String> =
                expected.required_block_ids.intersection(&discovered).cloned().collect();
            (
                found_ids.into_iter().collect::<Vec<_>>(),
                missing_ids.into_iter().collect::<Vec<_>>(),
            )
        }
        Err(e) => {
            warn!(error = %e, "verify_compliance: marker scan failed");
            verification_errors.push(format!("Marker verification failed: {}", e));
            (Vec::new(), expected.required_block_ids.iter().cloned().collect())
        }
    };

    // Step 4: overall compliance
    let is_compliant = missing.is_empty() && markers_missing.is_empty();

    // Step 5: verification level from bridge capabilities
    let verification_level = if metadata.supports_signature_verification {
        VerificationLevel::Full
    } else if metadata.bridge_kind == BridgeKind::CliFallback {
        VerificationLevel::Limited
    } else {
        VerificationLevel::MarkerOnly
    };

    debug!(
        contract_id = %expected.contract_id,
        is_compliant,
        %verification_level,
        found = found.len(),
        missing = missing.len(),
        "verify_compliance: complete"
    );

    VerificationResult {
        is_compliant,
        verification_level,
        required_functions_found: found,
        required_functions_missing: missing,
        signature_matches,
        signature_mismatches,
        markers_found,
        markers_missing,
        verification_errors,
        warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bridges::FunctionDescription;
    use crate::extract::FunctionSignature;
    use crate::metadata::Language;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    /// Test double standing in for a loaded library
    #[derive(Debug)]
    struct FakeBridge {
        kind: BridgeKind,
        functions: Vec<String>,
        descriptions: Option<BTreeMap<String, FunctionDescription>>,
    }

    impl Bridge for FakeBridge {
        fn kind(&self) -> BridgeKind {
            self.kind
        }

        fn invoke(&mut self, _method: &str, _args: &serde_json::Map<String, Value>) -> Result<Value, crate::UllError> {
            Ok(Value::Null)
        }

        fn has_function(&mut self, name: &str) -> bool {
            self.functions.iter().any(|f| f == name)
        }

        fn describe(&mut self) -> Option<BTreeMap<String, FunctionDescription>> {
            self.descriptions.clone()
        }

        fn close(&mut self) {}
    }

    fn metadata(kind: BridgeKind, signatures: bool) -> LibraryMetadata {
        LibraryMetadata {
            workspace_path: "/tmp/ws".into(),
            detected_language: Language::Python,
            bridge_kind: kind,
            language_indicators: BTreeMap::new(),
            supports_signature_verification: signatures,
            supports_type_introspection: signatures,
            supports_docstring_verification: false,
            load_time_ms: 0.0,
            load_errors: vec![],
        }
    }

    fn interface(functions: &[&str], blocks: &[&str]) -> ExpectedInterface {
        ExpectedInterface {
            contract_id: "test-001".to_string(),
            required_functions: functions
                .iter()
                .map(|name| {
                    (
                        name.to_string(),
                        FunctionSignature {
                            name: name.to_string(),
                            parameters: BTreeMap::new(),
                            return_type: None,
                            is_required: true,
                        },
                    )
                })
                .collect(),
            required_block_ids: blocks.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_found_and_missing_are_disjoint() {
        let temp = tempdir().unwrap();
        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["create".to_string()],
            descriptions: None,
        };

        let result = verify_compliance(
            &interface(&["create", "delete"], &[]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );

        assert_eq!(result.required_functions_found, vec!["create"]);
        assert_eq!(result.required_functions_missing, vec!["delete"]);
        for name in &result.required_functions_found {
            assert!(!result.required_functions_missing.contains(name));
        }
    }

    #[test]
    fn test_marker_coverage_drives_compliance() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("impl.py"), "# ADC-IMPLEMENTS: <alpha>\n# ADC-IMPLEMENTS: <beta>\n").unwrap();

        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["f".to_string()],
            descriptions: None,
        };

        let result = verify_compliance(
            &interface(&["f"], &["alpha", "beta", "gamma"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );

        assert_eq!(result.markers_found, vec!["alpha", "beta"]);
        assert_eq!(result.markers_missing, vec!["gamma"]);
        assert!(!result.is_compliant);
    }

    #[test]
    fn test_fully_compliant() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("impl.py"), "# ADC-IMPLEMENTS: <alpha>\n").unwrap();

        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["f".to_string()],
            descriptions: None,
        };

        let result = verify_compliance(
            &interface(&["f"], &["alpha"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );

        assert!(result.is_compliant);
        assert!((result.compliance_score() - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_verification_levels() {
        let temp = tempdir().unwrap();
        let mut bridge = FakeBridge {
            kind: BridgeKind::CliFallback,
            functions: vec![],
            descriptions: None,
        };

        let result = verify_compliance(
            &interface(&[], &[]),
            &mut bridge,
            &metadata(BridgeKind::CliFallback, false),
            temp.path(),
        );
        assert_eq!(result.verification_level, VerificationLevel::Limited);

        let result = verify_compliance(
            &interface(&[], &[]),
            &mut bridge,
            &metadata(BridgeKind::Direct, true),
            temp.path(),
        );
        assert_eq!(result.verification_level, VerificationLevel::Full);

        let result = verify_compliance(
            &interface(&[], &[]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert_eq!(result.verification_level, VerificationLevel::MarkerOnly);
    }

    #[test]
    fn test_score_deducts_missing_markers() {
        let temp = tempdir().unwrap();
        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["a".to_string(), "b".to_string()],
            descriptions: None,
        };

        // 2 found, 0 missing functions, 1 missing marker -> (2 - 1) / 2
        let result = verify_compliance(
            &interface(&["a", "b"], &["ghost"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert!((result.compliance_score() - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn test_score_clamped_at_zero() {
        let temp = tempdir().unwrap();
        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["a".to_string()],
            descriptions: None,
        };

        let result = verify_compliance(
            &interface(&["a"], &["g1", "g2", "g3"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert_eq!(result.compliance_score(), 0.0);
    }

    #[test]
    fn test_is_passing_requires_compliance_and_score() {
        let temp = tempdir().unwrap();
        std::fs::write(temp.path().join("impl.py"), "# ADC-IMPLEMENTS: <alpha>\n").unwrap();

        let mut bridge = FakeBridge {
            kind: BridgeKind::Rpc,
            functions: vec!["f".to_string()],
            descriptions: None,
        };

        // Fully compliant with score 1.0 passes
        let result = verify_compliance(
            &interface(&["f"], &["alpha"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert!(result.is_passing());

        // A missing function fails even though markers are covered
        let result = verify_compliance(
            &interface(&["f", "g"], &["alpha"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert!(!result.is_passing());

        // A missing marker fails even with every function present
        let result = verify_compliance(
            &interface(&["f"], &["alpha", "ghost"]),
            &mut bridge,
            &metadata(BridgeKind::Rpc, false),
            temp.path(),
        );
        assert!(!result.is_passing());
    }

    #[test]
    fn test_signature_mismatch_deducted() {
        let temp = tempdir().unwrap();

        let mut expected = interface(&["create"], &[]);
        expected
            .required_functions
            .get_mut("create")
            .unwrap()
            .parameters
            .insert("title".to_string(), "str".to_string());

        let mut descriptions = BTreeMap::new();
        descriptions.insert(
            "create".to_string(),
            FunctionDescription {
                parameters: BTreeMap::new(), // missing 'title'
                returns: None,
                doc: None,
            },
        );

        let mut bridge = FakeBridge {
            kind: BridgeKind::Direct,
            functions: vec!["create".to_string()],
            descriptions: Some(descriptions),
        };

        let result = verify_compliance(&expected, &mut bridge, &metadata(BridgeKind::Direct, true), temp.path());

        assert_eq!(result.signature_matches.get("create"), Some(&false));
        assert_eq!(result.signature_mismatches.len(), 1);
        assert!(result.signature_mismatches[0].mismatch_details[0].contains("title"));
        // 1 found - 1 mismatch - 0 missing markers over 1 total
        assert_eq!(result.compliance_score(), 0.0);
    }
}
