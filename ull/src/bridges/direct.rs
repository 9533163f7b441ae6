//! Direct in-process bridge
//!
//! Loads a same-language (Rust) library straight into the orchestrator
//! process. The library name is resolved from package metadata, the built
//! cdylib is located in conventional target directories, and introspection
//! beyond symbol presence relies on the library describing itself through
//! an `adc_describe` export:
//!
//! ```text
//! #[no_mangle] extern "C" fn adc_describe() -> *const c_char
//! #[no_mangle] extern "C" fn adc_invoke(method: *const c_char, args_json: *const c_char) -> *const c_char
//! ```
//!
//! Both return NUL-terminated JSON buffers owned by the library.

use std::collections::BTreeMap;
use std::ffi::{CStr, CString, c_char};
use std::path::{Path, PathBuf};

use regex::Regex;
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::UllError;
use crate::metadata::BridgeKind;

use super::{Bridge, FunctionDescription};

type DescribeFn = unsafe extern "C" fn() -> *const c_char;
type InvokeFn = unsafe extern "C" fn(*const c_char, *const c_char) -> *const c_char;

/// Direct bridge around a dynamically loaded library
#[derive(Debug)]
pub struct DirectBridge {
    workspace: PathBuf,
    library: Option<libloading::Library>,
    library_path: Option<PathBuf>,
}

impl DirectBridge {
    pub fn new(workspace: &Path) -> Self {
        Self {
            workspace: workspace.to_path_buf(),
            library: None,
            library_path: None,
        }
    }

    /// Resolve the library name from package metadata
    ///
    /// Strategies, in order: `[lib]` name in the manifest, `[package]`
    /// name, a `src/lib.rs` probe falling back to the workspace directory
    /// name. Hyphens normalize to underscores throughout.
    pub fn detect_library_name(&self) -> Result<String, UllError> {
        let manifest_path = self.workspace.join("Cargo.toml");
        if manifest_path.exists() {
            let content = std::fs::read_to_string(&manifest_path)?;

            // [lib] section name wins over [package] name
            let lib_re = Regex::new(r#"(?s)\[lib\].*?name\s*=\s*"([^"]+)""#).expect("static regex");
            if let Some(captures) = lib_re.captures(&content) {
                return Ok(captures[1].replace('-', "_"));
            }

            let name_re = Regex::new(r#"name\s*=\s*"([^"]+)""#).expect("static regex");
            if let Some(captures) = name_re.captures(&content) {
                return Ok(captures[1].replace('-', "_"));
            }
        }

        if self.workspace.join("src").join("lib.rs").exists() {
            if let Some(dir_name) = self.workspace.file_name().and_then(|n| n.to_str()) {
                return Ok(dir_name.replace('-', "_"));
            }
        }

        Err(UllError::Load(format!(
            "Unable to detect library name in {}\n  Checked: Cargo.toml [lib]/[package] name, src/lib.rs\n  Fix: Ensure workspace has a manifest with a name field",
            self.workspace.display()
        )))
    }

    /// Locate the built shared library for the resolved name
    fn find_artifact(&self, name: &str) -> Result<PathBuf, UllError> {
        let search_dirs = [
            self.workspace.join("target").join("release"),
            self.workspace.join("target").join("debug"),
            self.workspace.clone(),
        ];

        let candidates = [
            format!("lib{}.so", name),
            format!("lib{}.dylib", name),
            format!("{}.dll", name),
        ];

        for dir in &search_dirs {
            for candidate in &candidates {
                let path = dir.join(candidate);
                if path.exists() {
                    debug!(?path, "DirectBridge::find_artifact: found");
                    return Ok(path);
                }
            }
        }

        let searched: Vec<String> = search_dirs.iter().map(|d| d.display().to_string()).collect();
        Err(UllError::Load(format!(
            "No built library artifact for '{}' in {}\n  Searched: {}\n  Fix: Build the workspace with a cdylib crate-type first",
            name,
            self.workspace.display(),
            searched.join(", ")
        )))
    }

    /// Resolve, locate, and load the library
    pub fn load(&mut self) -> Result<(), UllError> {
        let name = self.detect_library_name()?;
        let artifact = self.find_artifact(&name)?;
        debug!(%name, ?artifact, "DirectBridge::load: loading");

        let library = unsafe { libloading::Library::new(&artifact) }.map_err(|e| {
            UllError::Load(format!(
                "Failed to load library '{}'\n  Artifact: {}\n  Error: {}",
                name,
                artifact.display(),
                e
            ))
        })?;

        self.library = Some(library);
        self.library_path = Some(artifact);
        Ok(())
    }

    fn library(&self) -> Result<&libloading::Library, UllError> {
        self.library
            .as_ref()
            .ok_or_else(|| UllError::Load("Direct bridge not loaded or already closed".to_string()))
    }
}

impl Bridge for DirectBridge {
    fn kind(&self) -> BridgeKind {
        BridgeKind::Direct
    }

    fn invoke(&mut self, method: &str, args: &serde_json::Map<String, Value>) -> Result<Value, UllError> {
        let library = self.library()?;

        let invoke: libloading::Symbol<InvokeFn> = unsafe { library.get(b"adc_invoke") }.map_err(|e| {
            UllError::Conformance(format!(
                "Library does not export adc_invoke\n  Error: {}\n  Fix: Export the dispatch entry point from the cdylib",
                e
            ))
        })?;

        let method_c = CString::new(method)
            .map_err(|_| UllError::Conformance(format!("Method name contains NUL: {:?}", method)))?;
        let args_json = serde_json::to_string(&Value::Object(args.clone()))
            .map_err(|e| UllError::Conformance(format!("Failed to encode arguments: {}", e)))?;
        let args_c = CString::new(args_json).expect("serde_json output has no interior NUL");

        let result_ptr = unsafe { invoke(method_c.as_ptr(), args_c.as_ptr()) };
        if result_ptr.is_null() {
            return Err(UllError::Rpc(format!("Library invoke returned null for method '{}'", method)));
        }

        // The library owns the returned buffer; copy out immediately.
        let result_json = unsafe { CStr::from_ptr(result_ptr) }.to_string_lossy().into_owned();
        serde_json::from_str(&result_json)
            .map_err(|e| UllError::Protocol(format!("Library returned invalid JSON for '{}': {}", method, e)))
    }

    fn has_function(&mut self, name: &str) -> bool {
        // Presence by symbol lookup; fall back to the self-description for
        // functions dispatched only through adc_invoke.
        let Ok(library) = self.library() else {
            return false;
        };
        let direct_symbol = unsafe { library.get::<*const ()>(name.as_bytes()) }.is_ok();
        if direct_symbol {
            return true;
        }
        match self.describe() {
            Some(functions) => functions.contains_key(name),
            None => false,
        }
    }

    fn describe(&mut self) -> Option<BTreeMap<String, FunctionDescription>> {
        let library = self.library().ok()?;
        let describe: libloading::Symbol<DescribeFn> = unsafe { library.get(b"adc_describe") }.ok()?;

        let ptr = unsafe { describe() };
        if ptr.is_null() {
            return None;
        }
        let json = unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned();
        match serde_json::from_str(&json) {
            Ok(functions) => Some(functions),
            Err(e) => {
                warn!(error = %e, "DirectBridge::describe: invalid self-description");
                None
            }
        }
    }

    fn close(&mut self) {
        self.library = None;
        self.library_path = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_detect_name_from_package() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"my-lib\"\nversion = \"0.1.0\"\n").unwrap();

        let bridge = DirectBridge::new(temp.path());
        assert_eq!(bridge.detect_library_name().unwrap(), "my_lib");
    }

    #[test]
    fn test_detect_name_lib_section_wins() {
        let temp = tempdir().unwrap();
        fs::write(
            temp.path().join("Cargo.toml"),
            "[package]\nname = \"pkg-name\"\n\n[lib]\nname = \"actual_lib\"\ncrate-type = [\"cdylib\"]\n",
        )
        .unwrap();

        let bridge = DirectBridge::new(temp.path());
        assert_eq!(bridge.detect_library_name().unwrap(), "actual_lib");
    }

    #[test]
    fn test_detect_name_from_src_layout() {
        let temp = tempdir().unwrap();
        fs::create_dir_all(temp.path().join("src")).unwrap();
        fs::write(temp.path().join("src").join("lib.rs"), "").unwrap();

        let bridge = DirectBridge::new(temp.path());
        // Falls back to the directory name
        let name = bridge.detect_library_name().unwrap();
        assert!(!name.is_empty());
        assert!(!name.contains('-'));
    }

    #[test]
    fn test_detect_name_failure_lists_strategies() {
        let temp = tempdir().unwrap();
        let bridge = DirectBridge::new(temp.path());

        let err = bridge.detect_library_name().unwrap_err();
        assert!(err.to_string().contains("Cargo.toml"));
        assert!(err.to_string().contains("src/lib.rs"));
    }

    #[test]
    fn test_load_without_artifact_enumerates_dirs() {
        let temp = tempdir().unwrap();
        fs::write(temp.path().join("Cargo.toml"), "[package]\nname = \"ghost\"\n").unwrap();

        let mut bridge = DirectBridge::new(temp.path());
        let err = bridge.load().unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("target/release"));
        assert!(msg.contains("target/debug"));
    }

    #[test]
    fn test_invoke_before_load_fails() {
        let temp = tempdir().unwrap();
        let mut bridge = DirectBridge::new(temp.path());
        let err = bridge.invoke("anything", &serde_json::Map::new()).unwrap_err();
        assert!(err.to_string().contains("not loaded"));
    }
}
