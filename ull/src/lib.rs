//! ULL - Universal Library Loader
//!
//! Polyglot library introspection for contract verification. Given a
//! workspace, the loader detects the implementation language, selects a
//! bridge (direct in-process load, MessagePack RPC subprocess, or CLI
//! shell-out), and reports how much verification that bridge can support.
//!
//! # Main API
//!
//! ```no_run
//! use ull::load_library;
//!
//! let (mut bridge, metadata) = load_library("./workspace".as_ref(), None, false).unwrap();
//! let result = bridge.invoke("create_task", &serde_json::Map::new()).unwrap();
//! println!("level: {}", metadata.verification_level());
//! ```

use std::path::Path;
use std::time::Instant;

use tracing::{debug, info};

pub mod bridges;
pub mod detect;
pub mod error;
pub mod extract;
pub mod marker;
pub mod metadata;
pub mod verifier;

pub use bridges::{Bridge, CliFallbackBridge, DirectBridge, FunctionDescription, RpcBridge, RpcTransport};
pub use detect::detect_language;
pub use error::UllError;
pub use extract::{ContractInterfaceExtractor, ExpectedInterface, FunctionSignature};
pub use marker::{MARKER_PATTERN, MarkerScanner};
pub use metadata::{BridgeKind, Language, LibraryMetadata, VerificationLevel};
pub use verifier::{SignatureMismatch, VerificationResult, verify_compliance};

/// RPC server entry-point filenames, checked per language
fn rpc_entry_point(workspace: &Path, language: Language) -> Option<Vec<String>> {
    let candidates: &[(&str, &[&str])] = match language {
        Language::Python => &[("bin/serve.py", &["python3"] as &[&str])],
        Language::Nodejs => &[("bin/serve.js", &["node"] as &[&str]), ("bin/serve.mjs", &["node"] as &[&str])],
        Language::Dart => &[("bin/serve.dart", &["dart", "run"] as &[&str])],
        _ => &[],
    };

    for (entry, runner) in candidates {
        let path = workspace.join(entry);
        if path.exists() {
            let mut command: Vec<String> = runner.iter().map(|s| s.to_string()).collect();
            command.push(path.display().to_string());
            return Some(command);
        }
    }
    None
}

/// Load a library from a workspace and return its bridge plus metadata
///
/// Bridge selection: direct in-process load for Rust (the orchestrator's
/// own language), RPC when the workspace declares a `bin/serve.*` entry
/// point next to its manifest, CLI fallback for everything else. Pass
/// `strict` to refuse limited-verification bridges.
pub fn load_library(
    workspace: &Path,
    expected_language: Option<&str>,
    strict: bool,
) -> Result<(Box<dyn Bridge>, LibraryMetadata), UllError> {
    debug!(?workspace, ?expected_language, strict, "load_library: called");

    // 1. Detect language (or trust the caller's label)
    let (detected_language, language_indicators) = match expected_language {
        Some(label) => {
            let language = Language::parse(label)
                .ok_or_else(|| UllError::Load(format!("Unknown expected language: '{}'", label)))?;
            (language, Default::default())
        }
        None => detect_language(workspace)?,
    };

    // 2. Select and load the bridge
    let start = Instant::now();
    let (bridge, bridge_kind): (Box<dyn Bridge>, BridgeKind) = if detected_language == Language::Rust {
        let mut direct = DirectBridge::new(workspace);
        direct.load()?;
        (Box::new(direct), BridgeKind::Direct)
    } else if let Some(command) = rpc_entry_point(workspace, detected_language) {
        let rpc = RpcBridge::spawn(&command, Some(workspace))?;
        (Box::new(rpc), BridgeKind::Rpc)
    } else {
        let mut cli = CliFallbackBridge::new(workspace);
        cli.load()?;
        (Box::new(cli), BridgeKind::CliFallback)
    };
    let load_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    // 3. Capability flags follow the bridge variant
    let supports_signatures = matches!(bridge_kind, BridgeKind::Direct | BridgeKind::Rpc);
    let metadata = LibraryMetadata {
        workspace_path: workspace.to_path_buf(),
        detected_language,
        bridge_kind,
        language_indicators,
        supports_signature_verification: supports_signatures,
        supports_type_introspection: supports_signatures,
        supports_docstring_verification: bridge_kind == BridgeKind::Direct,
        load_time_ms,
        load_errors: vec![],
    };

    // 4. Strict mode refuses limited verification
    if strict && !metadata.supports_signature_verification {
        return Err(UllError::Load(format!(
            "Library only supports LIMITED verification (CLI fallback)\n  Language: {}\n  Bridge: {}\n  Fix: Provide an RPC entry point (bin/serve.*) for full verification",
            detected_language, bridge_kind
        )));
    }

    info!(
        language = %detected_language,
        bridge = %bridge_kind,
        load_time_ms,
        "load_library: loaded"
    );
    Ok((bridge, metadata))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::tempdir;

    #[test]
    fn test_load_library_undetectable_fails() {
        let temp = tempdir().unwrap();
        let err = load_library(temp.path(), None, false).unwrap_err();
        assert!(err.to_string().contains("Unable to detect"));
    }

    #[test]
    fn test_load_library_cli_fallback_for_go() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("go.mod"), "module example.com/x\n").unwrap();
        let exe = temp.path().join("tool");
        fs::write(&exe, "#!/bin/sh\necho hi\n").unwrap();
        let mut perms = fs::metadata(&exe).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&exe, perms).unwrap();

        let (bridge, metadata) = load_library(temp.path(), None, false).unwrap();
        assert_eq!(bridge.kind(), BridgeKind::CliFallback);
        assert_eq!(metadata.detected_language, Language::Go);
        assert_eq!(metadata.verification_level(), VerificationLevel::Limited);
        assert!(!metadata.supports_signature_verification);
    }

    #[test]
    fn test_load_library_cli_fallback_without_binary_errors() {
        // Rust-style manifest but detection forced elsewhere: a Go manifest
        // with no built binary must enumerate the searched directories.
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("go.mod"), "module example.com/x\n").unwrap();

        let err = load_library(temp.path(), None, false).unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("No CLI executable found"));
        assert!(msg.contains(&temp.path().display().to_string()));
    }

    #[test]
    fn test_load_library_strict_rejects_cli() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("go.mod"), "module example.com/x\n").unwrap();
        let exe = temp.path().join("tool");
        fs::write(&exe, "#!/bin/sh\n").unwrap();
        let mut perms = fs::metadata(&exe).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&exe, perms).unwrap();

        let err = load_library(temp.path(), None, true).unwrap_err();
        assert!(err.to_string().contains("LIMITED verification"));
    }

    #[test]
    fn test_load_library_unknown_expected_language() {
        let temp = tempdir().unwrap();
        let err = load_library(temp.path(), Some("cobol"), false).unwrap_err();
        assert!(err.to_string().contains("Unknown expected language"));
    }

    #[test]
    fn test_rpc_entry_point_detection() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("bin")).unwrap();
        fs::write(temp.path().join("bin/serve.py"), "# server\n").unwrap();

        let command = rpc_entry_point(temp.path(), Language::Python).unwrap();
        assert_eq!(command[0], "python3");
        assert!(command[1].ends_with("bin/serve.py"));

        assert!(rpc_entry_point(temp.path(), Language::Go).is_none());
    }
}
