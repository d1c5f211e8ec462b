//! Layered pipeline configuration.
//!
//! Sources, lowest precedence first:
//!
//! 1. Built-in defaults
//! 2. A TOML file (`--config`, or `<config_dir>/auditgate/config.toml` when present)
//! 3. `AUDITGATE__<SECTION>__<KEY>` environment variables
//!
//! ```toml
//! [budget]
//! daily_limit_units = 2000
//! units_per_character = 1.3
//! charge_policy = "input_only"
//!
//! [transport]
//! endpoint = "http://localhost:11434/v1/chat/completions"
//! model = "llama3.1"
//! ```

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::budget::{
    BudgetPolicy, FileLedgerStore, LedgerBook, LedgerResult, QuotaGuard, SystemClock,
    DEFAULT_LEDGER_KEY,
};
use crate::context::DEFAULT_MAX_CONTENT_CHARS;
use crate::gateway::{
    GatewaySettings, DEFAULT_EXPECTED_MAX_OUTPUT_CHARS, DEFAULT_MODEL_ID,
};
use crate::journal::JournalConfig;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "AUDITGATE";

/// Default environment variable holding the provider API key.
pub const DEFAULT_API_KEY_ENV: &str = "AUDITGATE_API_KEY";

/// Default chat completions endpoint.
pub const DEFAULT_ENDPOINT: &str = "https://api.openai.com/v1/chat/completions";

/// Errors raised while loading or rendering configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to render configuration: {0}")]
    Render(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Limits on caller content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContentConfig {
    /// Longest content accepted, in characters.
    pub max_content_chars: usize,
    /// Output allowance added to estimates, in characters.
    pub expected_max_output_chars: usize,
}

impl Default for ContentConfig {
    fn default() -> Self {
        Self {
            max_content_chars: DEFAULT_MAX_CONTENT_CHARS,
            expected_max_output_chars: DEFAULT_EXPECTED_MAX_OUTPUT_CHARS,
        }
    }
}

/// Model provider connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportConfig {
    pub endpoint: String,
    pub model: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub timeout_ms: u64,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            model: DEFAULT_MODEL_ID.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            timeout_ms: 30_000,
        }
    }
}

impl TransportConfig {
    /// API key from the configured environment variable, if set and non-empty.
    pub fn api_key(&self) -> Option<String> {
        env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Where the usage ledger lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Ledger directory. `None` uses the default data directory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Store key the ledger is saved under.
    pub key: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            dir: None,
            key: DEFAULT_LEDGER_KEY.to_string(),
        }
    }
}

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub budget: BudgetPolicy,
    pub content: ContentConfig,
    pub transport: TransportConfig,
    pub ledger: LedgerConfig,
    pub journal: JournalConfig,
}

impl PipelineConfig {
    /// Load defaults, then `path` (or the default config file), then the environment.
    ///
    /// An explicit `path` must exist; the default file is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder();

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml));
            }
            None => {
                if let Some(default_path) = default_config_path() {
                    builder = builder.add_source(
                        File::from(default_path)
                            .format(FileFormat::Toml)
                            .required(false),
                    );
                }
            }
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: PipelineConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML document on top of the defaults, ignoring the environment.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: PipelineConfig = Config::builder()
            .add_source(File::from_str(source, FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let budget = &self.budget;
        if !budget.units_per_character.is_finite() || budget.units_per_character < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "budget.units_per_character must be a non-negative number, got {}",
                budget.units_per_character
            )));
        }
        for (name, value) in [
            ("warning_threshold", budget.warning_threshold),
            ("critical_threshold", budget.critical_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::Invalid(format!(
                    "budget.{} must be between 0.0 and 1.0, got {}",
                    name, value
                )));
            }
        }
        if budget.warning_threshold > budget.critical_threshold {
            return Err(ConfigError::Invalid(
                "budget.warning_threshold must not exceed budget.critical_threshold".into(),
            ));
        }
        if self.content.max_content_chars == 0 {
            return Err(ConfigError::Invalid(
                "content.max_content_chars must be greater than zero".into(),
            ));
        }
        if self.transport.timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "transport.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.ledger.key.trim().is_empty() {
            return Err(ConfigError::Invalid("ledger.key must not be empty".into()));
        }
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.ledger.dir.clone().unwrap_or_else(default_data_dir)
    }

    pub fn journal_dir(&self) -> PathBuf {
        self.journal
            .dir
            .clone()
            .unwrap_or_else(|| default_data_dir().join("journal"))
    }

    /// Quota guard over the file ledger in [`ledger_dir`](Self::ledger_dir).
    ///
    /// Needs no transport, so read-only callers can inspect the budget
    /// without building a gateway.
    pub fn quota_guard(&self) -> LedgerResult<QuotaGuard> {
        let store = FileLedgerStore::new(self.ledger_dir())?;
        let book = LedgerBook::new(Arc::new(store), Arc::new(SystemClock))
            .with_key(self.ledger.key.clone());
        Ok(QuotaGuard::new(self.budget.clone(), book))
    }

    /// Gateway settings derived from the content and transport sections.
    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings::new()
            .with_model_id(self.transport.model.clone())
            .with_expected_max_output_chars(self.content.expected_max_output_chars)
            .with_default_timeout(self.transport.timeout())
    }
}

/// `<data_dir>/auditgate`, falling back to `./.auditgate`.
pub fn default_data_dir() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("auditgate"))
        .unwrap_or_else(|| PathBuf::from(".auditgate"))
}

/// `<config_dir>/auditgate/config.toml`, if a config directory exists.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("auditgate").join("config.toml"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::budget::ChargePolicy;
    use tempfile::TempDir;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.budget.daily_limit_units, 50_000);
        assert_eq!(config.budget.charge_policy, ChargePolicy::Full);
        assert_eq!(config.content.max_content_chars, 20_000);
        assert_eq!(config.content.expected_max_output_chars, 2_000);
        assert_eq!(config.transport.api_key_env, "AUDITGATE_API_KEY");
        assert_eq!(config.transport.timeout(), Duration::from_secs(30));
        assert_eq!(config.ledger.key, "ai_usage_ledger");
        assert!(config.journal.enabled);
        assert_eq!(config.journal.retention_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = PipelineConfig::from_toml_str(
            r#"
            [budget]
            daily_limit_units = 1000
            units_per_character = 1.3
            charge_policy = "input_only"

            [ledger]
            dir = "/tmp/auditgate-ledger"
            "#,
        )
        .unwrap();

        assert_eq!(config.budget.daily_limit_units, 1_000);
        assert_eq!(config.budget.units_per_character, 1.3);
        assert_eq!(config.budget.charge_policy, ChargePolicy::InputOnly);
        assert_eq!(config.budget.warning_threshold, 0.7);
        assert_eq!(config.ledger_dir(), PathBuf::from("/tmp/auditgate-ledger"));
        assert_eq!(config.ledger.key, DEFAULT_LEDGER_KEY);
        assert_eq!(config.content, ContentConfig::default());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let err = PipelineConfig::from_toml_str(
            r#"
            [budget]
            warning_threshold = 0.95
            critical_threshold = 0.9
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_negative_multiplier_rejected() {
        let err = PipelineConfig::from_toml_str("[budget]\nunits_per_character = -1.0\n")
            .unwrap_err();
        assert!(err.to_string().contains("units_per_character"));
    }

    #[test]
    fn test_load_from_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auditgate.toml");
        std::fs::write(
            &path,
            "[content]\nmax_content_chars = 500\n\n[journal]\nretention_days = 7\n",
        )
        .unwrap();

        let config = PipelineConfig::load(Some(&path)).unwrap();
        assert_eq!(config.content.max_content_chars, 500);
        assert_eq!(config.journal.retention_days, 7);
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let result = PipelineConfig::load(Some(&temp_dir.path().join("absent.toml")));
        assert!(matches!(result, Err(ConfigError::Load(_))));
    }

    #[test]
    fn test_env_override() {
        std::env::set_var("AUDITGATE__TRANSPORT__MODEL", "env-model");
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("auditgate.toml");
        std::fs::write(&path, "[transport]\nmodel = \"file-model\"\n").unwrap();

        let config = PipelineConfig::load(Some(&path));
        std::env::remove_var("AUDITGATE__TRANSPORT__MODEL");

        assert_eq!(config.unwrap().transport.model, "env-model");
    }

    #[test]
    fn test_to_toml_round_trips() {
        let mut config = PipelineConfig::default();
        config.budget.daily_limit_units = 1_234;
        config.budget.charge_policy = ChargePolicy::None;

        let rendered = config.to_toml().unwrap();
        assert!(rendered.contains("[budget]"));
        assert!(rendered.contains("daily_limit_units = 1234"));
        assert!(rendered.contains("charge_policy = \"none\""));

        let reparsed = PipelineConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(reparsed, config);
    }

    #[test]
    fn test_gateway_settings() {
        let mut config = PipelineConfig::default();
        config.transport.model = "small".into();
        config.transport.timeout_ms = 1_500;
        config.content.expected_max_output_chars = 300;

        let settings = config.gateway_settings();
        assert_eq!(settings.model_id, "small");
        assert_eq!(settings.default_timeout, Duration::from_millis(1_500));
        assert_eq!(settings.expected_max_output_chars, 300);
    }

    #[test]
    fn test_journal_dir_override() {
        let mut config = PipelineConfig::default();
        assert!(config.journal_dir().ends_with("journal"));

        config.journal = JournalConfig::new(7).with_dir("/var/lib/auditgate/journal");
        assert_eq!(config.journal_dir(), PathBuf::from("/var/lib/auditgate/journal"));
        assert_eq!(config.journal.retention_days, 7);
    }

    #[test]
    fn test_quota_guard_uses_ledger_section() {
        let temp_dir = TempDir::new().unwrap();
        let mut config = PipelineConfig::default();
        config.budget = BudgetPolicy::new().with_daily_limit(500);
        config.ledger.dir = Some(temp_dir.path().to_path_buf());
        config.ledger.key = "ops-ledger".into();

        let guard = config.quota_guard().unwrap();
        guard.commit(120).unwrap();

        assert!(temp_dir.path().join("ops-ledger.json").exists());
        let status = config.quota_guard().unwrap().status().unwrap();
        assert_eq!(status.used, 120);
        assert_eq!(status.limit, 500);
        assert_eq!(status.remaining, 380);
    }

    #[test]
    fn test_api_key_from_env() {
        let mut transport = TransportConfig::default();
        transport.api_key_env = "AUDITGATE_TEST_KEY_FOR_CONFIG".into();
        assert_eq!(transport.api_key(), None);

        std::env::set_var("AUDITGATE_TEST_KEY_FOR_CONFIG", "sk-test");
        assert_eq!(transport.api_key().as_deref(), Some("sk-test"));
        std::env::remove_var("AUDITGATE_TEST_KEY_FOR_CONFIG");
    }
}
