//! Configuration management for Folio.
//!
//! Handles loading, saving, and validating configuration from
//! platform-specific config directories.

use crate::error::ConfigError;
use crate::glossary::GlossaryMode;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Application name used for config directory.
const APP_NAME: &str = "Folio";

/// Default config filename.
const CONFIG_FILENAME: &str = "config.toml";

/// Placeholder value for unconfigured API keys.
const API_KEY_PLACEHOLDER: &str = "YOUR_API_KEY_HERE";

/// Environment variable consulted for the API key before the config file.
pub const API_KEY_ENV: &str = "GOOGLE_API_KEY";

/// Placeholder in the prompt template replaced by the chapter text.
pub const TEXT_PLACEHOLDER: &str = "{text_to_translate}";

/// Placeholder in the prompt template replaced by glossary instructions.
pub const GLOSSARY_PLACEHOLDER: &str = "{glossary}";

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Generative language API configuration.
    pub api: ApiConfig,

    /// Translation behavior settings.
    pub translation: TranslationConfig,

    /// LLM prompts.
    pub prompts: PromptsConfig,

    /// File paths.
    pub paths: PathsConfig,
}

/// API configuration for the generative language endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// API key (required unless provided another way).
    pub key: String,

    /// Base URL for the API.
    pub base_url: String,

    /// Default model identifier for new projects.
    pub model: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            key: API_KEY_PLACEHOLDER.to_string(),
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
        }
    }
}

impl ApiConfig {
    /// Checks if the API key is configured (not placeholder).
    pub fn is_configured(&self) -> bool {
        is_usable_key(&self.key)
    }
}

fn is_usable_key(key: &str) -> bool {
    !key.trim().is_empty() && key != API_KEY_PLACEHOLDER
}

/// Translation behavior configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    /// Maximum provider calls per chapter.
    pub max_attempts: u32,

    /// First wait after a rate-limited or filtered response, in seconds.
    /// Doubles after every further failure.
    pub initial_retry_delay_sec: u64,

    /// Default pause between chapters for new projects, in seconds.
    pub delay_between_chapters_sec: f64,

    /// Default glossary mode for new projects.
    pub glossary_mode: GlossaryMode,

    /// Timeout for a single generation request, in seconds.
    pub request_timeout_sec: u64,
}

impl Default for TranslationConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_retry_delay_sec: 10,
            delay_between_chapters_sec: 2.0,
            glossary_mode: GlossaryMode::Literal,
            request_timeout_sec: 300,
        }
    }
}

/// LLM prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptsConfig {
    /// Default prompt template for new projects.
    pub translation: String,
}

impl Default for PromptsConfig {
    fn default() -> Self {
        Self {
            translation: "You are a professional literary translator. Translate the following book chapter into Russian. Preserve paragraph breaks, dialogue formatting and the author's tone. Reply with the translation only.\n\n{glossary}\n\n{text_to_translate}".to_string(),
        }
    }
}

/// File path configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    /// Directory for project records and their working files.
    pub projects_directory: Option<PathBuf>,

    /// JSON file holding named API keys.
    pub keys_file: Option<PathBuf>,
}

impl Config {
    /// Returns the platform-specific config directory path.
    pub fn config_dir() -> Result<PathBuf, ConfigError> {
        dirs::config_dir()
            .map(|p| p.join(APP_NAME))
            .ok_or(ConfigError::NoConfigDir)
    }

    /// Returns the full path to the config file.
    pub fn config_path() -> Result<PathBuf, ConfigError> {
        Ok(Self::config_dir()?.join(CONFIG_FILENAME))
    }

    /// Loads configuration from the default location.
    ///
    /// If the config file doesn't exist, creates a default one.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::config_path()?;
        Self::load_from(&path)
    }

    /// Loads configuration from a specific path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Config::default();
            config.save_to(path)?;
            return Ok(config);
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        Ok(config)
    }

    /// Saves configuration to a specific path.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content =
            toml::to_string_pretty(self).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Validates the settings that apply to every run.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.translation.max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "translation.max_attempts".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        validate_delay(
            "translation.delay_between_chapters_sec",
            self.translation.delay_between_chapters_sec,
        )?;
        validate_template("prompts.translation", &self.prompts.translation)?;

        Ok(())
    }

    /// Returns the effective projects directory, using config or default.
    pub fn projects_dir(&self) -> Result<PathBuf, ConfigError> {
        match self.paths.projects_directory {
            Some(ref dir) => Ok(dir.clone()),
            None => Ok(Self::config_dir()?.join("projects")),
        }
    }

    /// Returns the effective API key file, using config or default.
    pub fn keys_path(&self) -> Result<PathBuf, ConfigError> {
        match self.paths.keys_file {
            Some(ref file) => Ok(file.clone()),
            None => Ok(Self::config_dir()?.join("api_keys.json")),
        }
    }

    /// Picks the API key to use: an explicitly named stored key first,
    /// then the environment, then the config file.
    pub fn resolve_api_key(
        &self,
        named: Option<&str>,
        env_value: Option<String>,
    ) -> Result<String, ConfigError> {
        if let Some(key) = named {
            if is_usable_key(key) {
                return Ok(key.to_string());
            }
        }

        if let Some(key) = env_value.filter(|k| is_usable_key(k)) {
            return Ok(key);
        }

        if self.api.is_configured() {
            return Ok(self.api.key.clone());
        }

        Err(ConfigError::MissingValue(format!(
            "api.key (set it in the config file, store a named key, or export {})",
            API_KEY_ENV
        )))
    }
}

/// Converts a delay in seconds, rejecting negative, non-finite or
/// out-of-range values.
pub fn validate_delay(key: &str, delay_sec: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(delay_sec).map_err(|_| ConfigError::InvalidValue {
        key: key.to_string(),
        message: format!("expected a non-negative number of seconds, got {}", delay_sec),
    })
}

/// Rejects prompt templates that would never include the chapter text.
pub fn validate_template(key: &str, template: &str) -> Result<(), ConfigError> {
    if !template.contains(TEXT_PLACEHOLDER) {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("template must contain {}", TEXT_PLACEHOLDER),
        });
    }
    Ok(())
}
