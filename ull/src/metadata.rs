//! Library metadata and capability reporting
//!
//! Tracks what the loader detected about a workspace and which verification
//! capabilities the selected bridge provides.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Languages the loader can detect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Python,
    Nodejs,
    Dart,
    Rust,
    Go,
    Java,
    Cpp,
}

impl Language {
    /// All detectable languages, in detection priority order
    pub fn all() -> &'static [Language] {
        &[
            Language::Python,
            Language::Nodejs,
            Language::Dart,
            Language::Rust,
            Language::Go,
            Language::Java,
            Language::Cpp,
        ]
    }

    /// Source file extensions for this language (used to scope marker scans)
    pub fn source_extensions(&self) -> &'static [&'static str] {
        match self {
            Language::Python => &[".py"],
            Language::Nodejs => &[".js", ".ts"],
            Language::Dart => &[".dart"],
            Language::Rust => &[".rs"],
            Language::Go => &[".go"],
            Language::Java => &[".java"],
            Language::Cpp => &[".cpp", ".cc", ".h", ".hpp"],
        }
    }

    /// Parse a language label (as accepted by `load_library`'s expected_language)
    pub fn parse(label: &str) -> Option<Language> {
        match label.to_lowercase().as_str() {
            "python" => Some(Language::Python),
            "nodejs" | "node" | "javascript" | "typescript" => Some(Language::Nodejs),
            "dart" => Some(Language::Dart),
            "rust" => Some(Language::Rust),
            "go" => Some(Language::Go),
            "java" => Some(Language::Java),
            "cpp" | "c++" => Some(Language::Cpp),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::Nodejs => "nodejs",
            Language::Dart => "dart",
            Language::Rust => "rust",
            Language::Go => "go",
            Language::Java => "java",
            Language::Cpp => "cpp",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Bridge variants
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeKind {
    /// In-process load of a same-language (Rust) library
    Direct,
    /// Length-prefixed MessagePack RPC over a subprocess's stdio
    Rpc,
    /// Shell-out to a built binary
    CliFallback,
}

impl BridgeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BridgeKind::Direct => "direct",
            BridgeKind::Rpc => "rpc",
            BridgeKind::CliFallback => "cli_fallback",
        }
    }
}

impl std::fmt::Display for BridgeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Verification capability level of a loaded library
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum VerificationLevel {
    Full,
    Limited,
    MarkerOnly,
}

impl VerificationLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            VerificationLevel::Full => "FULL",
            VerificationLevel::Limited => "LIMITED",
            VerificationLevel::MarkerOnly => "MARKER_ONLY",
        }
    }
}

impl std::fmt::Display for VerificationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Metadata about a loaded library
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LibraryMetadata {
    pub workspace_path: PathBuf,
    pub detected_language: Language,
    pub bridge_kind: BridgeKind,

    /// Indicator files checked during detection and whether each existed
    pub language_indicators: BTreeMap<String, bool>,

    /// Verification capabilities of the active bridge
    pub supports_signature_verification: bool,
    pub supports_type_introspection: bool,
    pub supports_docstring_verification: bool,

    /// Load latency
    pub load_time_ms: f64,

    /// Load-time errors (empty on success)
    pub load_errors: Vec<String>,
}

impl LibraryMetadata {
    /// Capability level implied by the active bridge
    pub fn verification_level(&self) -> VerificationLevel {
        if self.supports_signature_verification {
            VerificationLevel::Full
        } else if self.bridge_kind == BridgeKind::CliFallback {
            VerificationLevel::Limited
        } else {
            VerificationLevel::MarkerOnly
        }
    }
}
