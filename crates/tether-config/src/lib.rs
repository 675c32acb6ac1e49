//! Layered TOML configuration for Tether.
//!
//! Reads configuration from multiple sources with precedence:
//! CLI flags > env vars > `config.toml` > defaults

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tether_mcp::{ProviderConfig, ProviderDescriptor};
use tether_types::{ConfigError, ToolDescriptor, empty_object_schema};

/// The default chat-completions API root.
pub const DEFAULT_API_BASE_URL: &str = "https://api.openai.com/v1";

/// The default model to use.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// The default conversation language.
pub const DEFAULT_LANGUAGE: &str = "english";

/// The default iteration bound for one run.
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Resolved configuration for Tether.
#[derive(Debug, Clone)]
pub struct TetherConfig {
    pub api_key: String,
    pub model: String,
    pub api_base_url: String,
    pub max_iterations: usize,
    pub language: String,
    pub parallel_tool_calls: bool,
    pub system_prompt: String,
    pub providers: ProviderConfig,
    pub host_actions: Vec<ToolDescriptor>,
    pub config_dir: PathBuf,
}

/// Settings that can be read from a TOML config file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsFile {
    #[serde(default)]
    pub model: ModelSettings,
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderDescriptor>,
    #[serde(default)]
    pub host_actions: Vec<HostActionSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelSettings {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub max_iterations: Option<usize>,
    pub language: Option<String>,
    pub parallel_tool_calls: Option<bool>,
    pub system_prompt: Option<String>,
}

/// A host action declared in the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostActionSettings {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub parameters: Option<serde_json::Value>,
}

impl HostActionSettings {
    fn into_descriptor(self) -> ToolDescriptor {
        let description = self
            .description
            .filter(|d| !d.trim().is_empty())
            .unwrap_or_else(|| format!("Tool: {}", self.name));
        let parameters = self
            .parameters
            .filter(serde_json::Value::is_object)
            .unwrap_or_else(empty_object_schema);
        ToolDescriptor::new(self.name, description, parameters)
    }
}

/// CLI overrides that take highest precedence.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub max_iterations: Option<usize>,
    pub language: Option<String>,
    /// Extra provider file (TOML or JSON); its entries win over config.toml.
    pub providers_file: Option<PathBuf>,
}

/// The system prompt used when none is configured.
pub fn system_prompt_for(language: &str) -> String {
    format!("You are a helpful assistant. Talk in {language}.")
}

impl TetherConfig {
    /// Load configuration from all sources, applying precedence rules.
    ///
    /// Precedence (highest to lowest):
    /// 1. CLI flags
    /// 2. Environment variables
    /// 3. Config file (~/.tether/config.toml)
    /// 4. Defaults
    pub fn load(overrides: CliOverrides) -> Result<Self, ConfigError> {
        let config_dir = config_dir();
        let settings = load_settings_file(&config_dir.join("config.toml"));
        Self::resolve(settings, overrides, config_dir, |key| std::env::var(key).ok())
    }

    /// Apply precedence over already-read sources. `env` looks up
    /// environment variables.
    pub fn resolve(
        settings: SettingsFile,
        overrides: CliOverrides,
        config_dir: PathBuf,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        let model_settings = settings.model;

        // Resolve API key: CLI > env > config file
        let api_key = overrides
            .api_key
            .or_else(|| env("OPENAI_API_KEY"))
            .or(model_settings.api_key)
            .ok_or_else(|| ConfigError::MissingKey {
                key: "api_key (set OPENAI_API_KEY or add to ~/.tether/config.toml)".into(),
            })?;

        let model = overrides
            .model
            .or_else(|| env("TETHER_MODEL"))
            .or(model_settings.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let api_base_url = env("TETHER_API_BASE_URL")
            .or(model_settings.base_url)
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());

        let max_iterations = overrides
            .max_iterations
            .or(model_settings.max_iterations)
            .unwrap_or(DEFAULT_MAX_ITERATIONS);
        if max_iterations == 0 {
            return Err(ConfigError::InvalidValue {
                key: "max_iterations".into(),
                message: "must be at least 1".into(),
            });
        }

        let language = overrides
            .language
            .or(model_settings.language)
            .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

        let system_prompt = model_settings
            .system_prompt
            .unwrap_or_else(|| system_prompt_for(&language));

        let mut providers = ProviderConfig {
            providers: settings.providers,
        };
        if let Some(path) = &overrides.providers_file {
            providers.merge(load_provider_file(path)?);
        }

        let host_actions = settings
            .host_actions
            .into_iter()
            .map(HostActionSettings::into_descriptor)
            .collect();

        Ok(TetherConfig {
            api_key,
            model,
            api_base_url,
            max_iterations,
            language,
            parallel_tool_calls: model_settings.parallel_tool_calls.unwrap_or(false),
            system_prompt,
            providers,
            host_actions,
            config_dir,
        })
    }
}

/// Get the Tether config directory path (~/.tether/).
pub fn config_dir() -> PathBuf {
    if let Ok(dir) = std::env::var("TETHER_CONFIG_DIR") {
        return PathBuf::from(dir);
    }
    dirs_next::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tether")
}

/// Load and parse a TOML settings file, returning defaults on any error.
pub fn load_settings_file(path: &Path) -> SettingsFile {
    match std::fs::read_to_string(path) {
        Ok(content) => toml::from_str(&content).unwrap_or_else(|e| {
            tracing::warn!("Failed to parse {}: {}", path.display(), e);
            SettingsFile::default()
        }),
        Err(_) => SettingsFile::default(),
    }
}

/// Load a provider mapping from a TOML or JSON file.
///
/// Accepts either a top-level `providers` table or a bare mapping of
/// provider name to descriptor. Unlike `config.toml`, a file named
/// explicitly must parse.
pub fn load_provider_file(path: &Path) -> Result<ProviderConfig, ConfigError> {
    let parse_err = |message: String| ConfigError::Parse {
        path: path.display().to_string(),
        message,
    };

    let content = std::fs::read_to_string(path).map_err(|e| parse_err(e.to_string()))?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let mut value: serde_json::Value = if is_json {
        serde_json::from_str(&content).map_err(|e| parse_err(e.to_string()))?
    } else {
        toml::from_str(&content).map_err(|e| parse_err(e.to_string()))?
    };

    if let Some(inner) = value.get_mut("providers") {
        value = inner.take();
    }
    let providers: BTreeMap<String, ProviderDescriptor> =
        serde_json::from_value(value).map_err(|e| parse_err(e.to_string()))?;
    Ok(ProviderConfig { providers })
}
