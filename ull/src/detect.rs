//! Language detection
//!
//! Detects the programming language of a workspace by scoring
//! language-specific indicator files.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::debug;

use crate::error::UllError;
use crate::metadata::Language;

/// Indicator filenames per language, checked at the workspace root
pub fn indicator_files(language: Language) -> &'static [&'static str] {
    match language {
        Language::Python => &["setup.py", "pyproject.toml", "requirements.txt", "Pipfile", "poetry.lock"],
        Language::Nodejs => &["package.json", "package-lock.json", "yarn.lock", "tsconfig.json"],
        Language::Dart => &["pubspec.yaml", "pubspec.lock"],
        Language::Rust => &["Cargo.toml", "Cargo.lock"],
        Language::Go => &["go.mod", "go.sum"],
        Language::Java => &["pom.xml", "build.gradle", "build.gradle.kts", "settings.gradle"],
        Language::Cpp => &["CMakeLists.txt", "Makefile", "BUILD.bazel"],
    }
}

/// Detect the workspace language by counting indicator-file matches
///
/// Returns the highest-scoring language and the full indicator map checked.
/// Zero matches across every language is a hard failure that names every
/// filename checked.
pub fn detect_language(workspace: &Path) -> Result<(Language, BTreeMap<String, bool>), UllError> {
    debug!(?workspace, "detect_language: called");

    if !workspace.exists() {
        return Err(UllError::Load(format!(
            "Workspace path does not exist: {}\n  Fix: Ensure workspace directory exists",
            workspace.display()
        )));
    }

    if !workspace.is_dir() {
        return Err(UllError::Load(format!(
            "Workspace path is not a directory: {}\n  Fix: Provide path to workspace directory",
            workspace.display()
        )));
    }

    let mut indicators_found = BTreeMap::new();
    let mut best: Option<(Language, usize)> = None;

    for &language in Language::all() {
        let mut score = 0usize;
        for indicator in indicator_files(language) {
            let exists = workspace.join(indicator).exists();
            indicators_found.insert(indicator.to_string(), exists);
            if exists {
                score += 1;
            }
        }
        debug!(%language, score, "detect_language: scored language");
        if best.is_none_or(|(_, s)| score > s) {
            best = Some((language, score));
        }
    }

    match best {
        Some((language, score)) if score > 0 => {
            debug!(%language, score, "detect_language: detected");
            Ok((language, indicators_found))
        }
        _ => {
            let mut all: Vec<&str> = Language::all().iter().flat_map(|l| indicator_files(*l)).copied().collect();
            all.sort_unstable();
            all.dedup();
            Err(UllError::Load(format!(
                "Unable to detect library language in {}\n  Checked for: {}\n  Fix: Ensure workspace contains language indicator file",
                workspace.display(),
                all.join(", ")
            )))
        }
    }
}
