//! Configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Feature toggle enabling the ULL verification path (default enabled)
pub const ULL_ENV_VAR: &str = "ADC_ULL_VERIFICATION";

/// Verbosity toggle (default off)
pub const VERBOSE_ENV_VAR: &str = "ADC_VERBOSE";

/// Main configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// LLM provider configuration
    pub llm: LlmConfig,

    /// Workflow loop caps and tier preset
    pub workflow: WorkflowConfig,

    /// Library verification configuration
    pub verification: VerificationConfig,
}

impl Config {
    /// Load configuration with fallback chain
    ///
    /// Explicit path, then project-local `.adc.yml`, then
    /// `~/.config/adc/adc.yml`, then defaults.
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        let local_config = PathBuf::from(".adc.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("adc").join("adc.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// LLM provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Provider name (currently only "anthropic" supported)
    pub provider: String,

    /// Model for the strong tier (reasoning-heavy agents)
    #[serde(rename = "strong-model")]
    pub strong_model: String,

    /// Model for the light tier (lightweight agents)
    #[serde(rename = "light-model")]
    pub light_model: String,

    /// Environment variable containing the API key
    #[serde(rename = "api-key-env")]
    pub api_key_env: String,

    /// API base URL
    #[serde(rename = "base-url")]
    pub base_url: String,

    /// Hard cap on tokens per response for the strong tier
    #[serde(rename = "strong-max-tokens")]
    pub strong_max_tokens: u32,

    /// Hard cap on tokens per response for the light tier
    #[serde(rename = "light-max-tokens")]
    pub light_max_tokens: u32,

    /// Request timeout in milliseconds
    #[serde(rename = "timeout-ms")]
    pub timeout_ms: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: "anthropic".to_string(),
            strong_model: "claude-sonnet-4-20250514".to_string(),
            light_model: "claude-3-5-haiku-20241022".to_string(),
            api_key_env: "ANTHROPIC_API_KEY".to_string(),
            base_url: "https://api.anthropic.com".to_string(),
            strong_max_tokens: 16_384,
            light_max_tokens: 8_192,
            timeout_ms: 300_000,
        }
    }
}

impl LlmConfig {
    /// Fail fast when the API key env var is unset
    pub fn require_api_key(&self) -> Result<String> {
        std::env::var(&self.api_key_env)
            .context(format!("Environment variable {} not set", self.api_key_env))
    }
}

/// Workflow loop caps and tier preset
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowConfig {
    /// Maximum outer (refinement) iterations
    #[serde(rename = "max-outer")]
    pub max_outer: u32,

    /// Maximum inner (implementation) iterations per outer step
    #[serde(rename = "max-inner")]
    pub max_inner: u32,

    /// Model tier preset: "strong" or "mixed"
    #[serde(rename = "tier-preset")]
    pub tier_preset: String,
}

impl Default for WorkflowConfig {
    fn default() -> Self {
        Self {
            max_outer: 5,
            max_inner: 10,
            tier_preset: "strong".to_string(),
        }
    }
}

/// Library verification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VerificationConfig {
    /// Whether the ULL verification path is enabled
    #[serde(rename = "ull-enabled")]
    pub ull_enabled: bool,

    /// Refuse limited-verification bridges
    pub strict: bool,
}

impl Default for VerificationConfig {
    fn default() -> Self {
        Self {
            ull_enabled: true,
            strict: false,
        }
    }
}

impl VerificationConfig {
    /// Effective toggle: the env var overrides the config file
    ///
    /// `ADC_ULL_VERIFICATION=0|false|off` disables the path.
    pub fn ull_effective(&self) -> bool {
        match std::env::var(ULL_ENV_VAR) {
            Ok(value) => !matches!(value.to_lowercase().as_str(), "0" | "false" | "off" | "no"),
            Err(_) => self.ull_enabled,
        }
    }
}

/// Whether the verbosity toggle is set
pub fn verbose_enabled() -> bool {
    match std::env::var(VERBOSE_ENV_VAR) {
        Ok(value) => matches!(value.to_lowercase().as_str(), "1" | "true" | "on" | "yes"),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use tempfile::tempdir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.workflow.max_outer, 5);
        assert_eq!(config.workflow.max_inner, 10);
        assert_eq!(config.llm.provider, "anthropic");
        assert_eq!(config.llm.api_key_env, "ANTHROPIC_API_KEY");
        // The light tier caps lower than the strong tier
        assert_eq!(config.llm.strong_max_tokens, 16_384);
        assert_eq!(config.llm.light_max_tokens, 8_192);
        assert!(config.verification.ull_enabled);
    }

    #[test]
    fn test_load_from_yaml() {
        let temp = tempdir().unwrap();
        let path = temp.path().join("adc.yml");
        fs::write(
            &path,
            "llm:\n  strong-model: custom-model\n  light-max-tokens: 4096\nworkflow:\n  max-outer: 2\n  tier-preset: mixed\n",
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.llm.strong_model, "custom-model");
        assert_eq!(config.llm.light_max_tokens, 4096);
        assert_eq!(config.workflow.max_outer, 2);
        assert_eq!(config.workflow.tier_preset, "mixed");
        // Unspecified fields keep defaults
        assert_eq!(config.workflow.max_inner, 10);
        assert_eq!(config.llm.strong_max_tokens, 16_384);
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let path = PathBuf::from("/nonexistent/adc.yml");
        assert!(Config::load(Some(&path)).is_err());
    }

    #[test]
    #[serial]
    fn test_ull_effective_env_override() {
        let config = VerificationConfig::default();

        unsafe { std::env::set_var(ULL_ENV_VAR, "0") };
        assert!(!config.ull_effective());

        unsafe { std::env::set_var(ULL_ENV_VAR, "true") };
        assert!(config.ull_effective());

        unsafe { std::env::remove_var(ULL_ENV_VAR) };
        assert!(config.ull_effective());
    }

    #[test]
    #[serial]
    fn test_require_api_key() {
        let mut config = LlmConfig::default();
        config.api_key_env = "ADC_TEST_KEY_VAR".to_string();

        unsafe { std::env::remove_var("ADC_TEST_KEY_VAR") };
        assert!(config.require_api_key().is_err());

        unsafe { std::env::set_var("ADC_TEST_KEY_VAR", "sk-test") };
        assert_eq!(config.require_api_key().unwrap(), "sk-test");
        unsafe { std::env::remove_var("ADC_TEST_KEY_VAR") };
    }
}
