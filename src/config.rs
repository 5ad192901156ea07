// Wizard configuration
// Layering: built-in defaults -> optional violation-wizard.toml -> VIOLATION_WIZARD__SECTION__KEY env.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::utils::logging::mask_sensitive;

pub const DEFAULT_CONFIG_FILE: &str = "violation-wizard.toml";
const ENV_PREFIX: &str = "VIOLATION_WIZARD";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub base_url: String,
    pub timeout_secs: u64,
    pub auth_token: Option<String>,
    /// Collection path for create/update/fetch, relative to `base_url`.
    pub records_path: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:5000/api/".to_string(),
            timeout_secs: 30,
            auth_token: None,
            records_path: "private-violations".to_string(),
        }
    }
}

impl ApiConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DraftConfig {
    /// Namespace of the draft key (`<record_type>_draft_<user>`).
    pub record_type: String,
    pub folder: Option<PathBuf>,
    pub quota_bytes: u64,
}

impl Default for DraftConfig {
    fn default() -> Self {
        Self {
            record_type: "private_violation".to_string(),
            folder: None,
            quota_bytes: 5 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AttachmentConfig {
    pub max_file_bytes: u64,
}

impl Default for AttachmentConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 100 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RehydrationConfig {
    pub max_attempts: u32,
    pub interval_ms: u64,
}

impl Default for RehydrationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            interval_ms: 200,
        }
    }
}

impl RehydrationConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub stdout: bool,
    pub folder: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct WizardConfig {
    pub api: ApiConfig,
    pub drafts: DraftConfig,
    pub attachments: AttachmentConfig,
    pub rehydration: RehydrationConfig,
    pub logging: LoggingConfig,
}

impl WizardConfig {
    /// Load configuration. An explicit path must exist; otherwise `violation-wizard.toml` in the
    /// working directory is used when present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (file, required) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => (PathBuf::from(DEFAULT_CONFIG_FILE), false),
        };

        let settings = config::Config::builder()
            .add_source(config::File::from(file.clone()).required(required))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read configuration from {:?}", file))?;

        let cfg: WizardConfig = settings
            .try_deserialize()
            .context("Configuration has invalid values")?;

        log::debug!(
            "[PHASE: config] Loaded configuration (file={:?}, required={})",
            file,
            required
        );
        Ok(cfg)
    }

    /// Effective configuration as TOML, with the auth token masked.
    pub fn to_toml(&self) -> Result<String> {
        let mut shown = self.clone();
        shown.api.auth_token = shown.api.auth_token.as_deref().map(mask_sensitive);
        toml::to_string_pretty(&shown).context("Failed to render configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = WizardConfig::default();
        assert_eq!(cfg.attachments.max_file_bytes, 104_857_600);
        assert_eq!(cfg.rehydration.max_attempts, 10);
        assert_eq!(cfg.rehydration.interval(), Duration::from_millis(200));
        assert_eq!(cfg.drafts.record_type, "private_violation");
        assert!(!cfg.logging.stdout);
    }

    #[test]
    fn file_values_override_defaults_and_keep_the_rest() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("custom.toml");
        std::fs::write(
            &path,
            "[api]\nbase_url = \"https://records.example.org/api/\"\ntimeout_secs = 5\n\n[rehydration]\nmax_attempts = 3\n",
        )
        .unwrap();

        let cfg = WizardConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.api.base_url, "https://records.example.org/api/");
        assert_eq!(cfg.api.timeout(), Duration::from_secs(5));
        assert_eq!(cfg.rehydration.max_attempts, 3);
        assert_eq!(cfg.rehydration.interval_ms, 200);
        assert_eq!(cfg.api.records_path, "private-violations");
    }

    #[test]
    fn explicit_missing_file_is_an_error() {
        let tmp = tempfile::tempdir().unwrap();
        let missing = tmp.path().join("absent.toml");
        assert!(WizardConfig::load(Some(&missing)).is_err());
    }

    #[test]
    fn rendered_toml_masks_token() {
        let mut cfg = WizardConfig::default();
        cfg.api.auth_token = Some("secret-token-value-1234".to_string());
        let rendered = cfg.to_toml().unwrap();
        assert!(rendered.contains("[api]"));
        assert!(!rendered.contains("secret-token-value-1234"));
        assert!(rendered.contains("secr...1234"));
    }
}
