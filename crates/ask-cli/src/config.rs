use std::fmt;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ValueEnum;
use figment::providers::{Data, Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use ask_core::{ReasoningEffort, ReasoningSummary};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// OpenAI Responses API
    #[default]
    #[value(name = "openai")]
    OpenAI,
    /// Google Gemini
    Gemini,
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderKind::OpenAI => f.write_str("openai"),
            ProviderKind::Gemini => f.write_str("gemini"),
        }
    }
}

/// Resolved settings. Plain values come before the backend tables so the
/// struct serializes to valid TOML.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub provider: ProviderKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_summary: Option<ReasoningSummary>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning_effort: Option<ReasoningEffort>,

    /// Gemini only: return thought summaries
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub include_thoughts: Option<bool>,

    /// Gemini only: thinking token budget, -1 for dynamic
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thinking_budget: Option<i32>,

    /// Render deltas as they arrive
    #[serde(default = "default_true")]
    pub stream: bool,

    /// Offer the demo tools to the model
    #[serde(default = "default_true")]
    pub tools: bool,

    #[serde(default)]
    pub openai: BackendConfig,

    #[serde(default)]
    pub gemini: BackendConfig,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BackendConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Sampling temperature. Only Gemini sends one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
}

fn default_true() -> bool {
    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            reasoning_summary: None,
            reasoning_effort: None,
            include_thoughts: None,
            thinking_budget: None,
            stream: true,
            tools: true,
            openai: BackendConfig::default(),
            gemini: BackendConfig::default(),
        }
    }
}

/// Command-line settings applied on top of every other layer.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub provider: Option<ProviderKind>,
    pub model: Option<String>,
    pub base_url: Option<String>,
    pub reasoning_summary: Option<ReasoningSummary>,
    pub reasoning_effort: Option<ReasoningEffort>,
    pub include_thoughts: bool,
    pub thinking_budget: Option<i32>,
    pub no_stream: bool,
    pub no_tools: bool,
}

impl Config {
    /// Load from defaults, then the config file, then the environment.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::config_path()?,
        };
        Self::layered(Toml::file(&path))
            .extract()
            .with_context(|| format!("Invalid configuration in {}", path.display()))
    }

    pub fn config_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("ask").join("config.toml"))
    }

    /// Provider keys read from the backends' conventional variables rank
    /// below the file, and `ASK_*` variables rank above it. Nested keys use
    /// a double underscore: `ASK_OPENAI__MODEL`.
    fn layered(file: Data<Toml>) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "openai.api_key".into()))
            .merge(Env::raw().only(&["GEMINI_API_KEY"]).map(|_| "gemini.api_key".into()))
            .merge(file)
            .merge(Env::prefixed("ASK_").split("__"))
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(provider) = overrides.provider {
            self.provider = provider;
        }
        if let Some(summary) = overrides.reasoning_summary {
            self.reasoning_summary = Some(summary);
        }
        if let Some(effort) = overrides.reasoning_effort {
            self.reasoning_effort = Some(effort);
        }
        if overrides.include_thoughts {
            self.include_thoughts = Some(true);
        }
        if let Some(budget) = overrides.thinking_budget {
            self.thinking_budget = Some(budget);
        }
        if overrides.no_stream {
            self.stream = false;
        }
        if overrides.no_tools {
            self.tools = false;
        }

        let backend = self.backend_mut();
        if let Some(model) = &overrides.model {
            backend.model = Some(model.clone());
        }
        if let Some(base_url) = &overrides.base_url {
            backend.base_url = Some(base_url.clone());
        }
    }

    /// Settings of the selected provider.
    pub fn backend(&self) -> &BackendConfig {
        match self.provider {
            ProviderKind::OpenAI => &self.openai,
            ProviderKind::Gemini => &self.gemini,
        }
    }

    fn backend_mut(&mut self) -> &mut BackendConfig {
        match self.provider {
            ProviderKind::OpenAI => &mut self.openai,
            ProviderKind::Gemini => &mut self.gemini,
        }
    }

    /// The configuration as TOML, with API keys masked.
    pub fn to_masked_toml(&self) -> Result<String> {
        let mut masked = self.clone();
        for backend in [&mut masked.openai, &mut masked.gemini] {
            backend.api_key = backend.api_key.as_deref().map(mask_key);
        }
        toml::to_string_pretty(&masked).context("Failed to serialize configuration")
    }
}

/// Keep the first and last four characters of long keys.
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 12 {
        return "****".to_string();
    }
    let head: String = chars[..4].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}****{}", head, tail)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn from_toml(toml: &str) -> Config {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = from_toml("");
        assert_eq!(config, Config::default());
        assert_eq!(config.provider, ProviderKind::OpenAI);
        assert!(config.stream);
        assert!(config.tools);
    }

    #[test]
    fn test_parse_config() {
        let config = from_toml(
            r#"
            provider = "gemini"
            reasoning_summary = "detailed"
            reasoning_effort = "xhigh"
            thinking_budget = 2048
            tools = false

            [openai]
            api_key = "sk-test"

            [gemini]
            model = "gemini-2.5-pro"
            temperature = 0.5
        "#,
        );

        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.reasoning_summary, Some(ReasoningSummary::Detailed));
        assert_eq!(config.reasoning_effort, Some(ReasoningEffort::XHigh));
        assert_eq!(config.thinking_budget, Some(2048));
        assert!(config.stream);
        assert!(!config.tools);
        assert_eq!(config.openai.api_key.as_deref(), Some("sk-test"));
        assert_eq!(config.backend().model.as_deref(), Some("gemini-2.5-pro"));
        assert_eq!(config.backend().temperature, Some(0.5));
    }

    #[test]
    fn test_file_layer_overrides_defaults() {
        let config: Config = Config::layered(Toml::string("[gemini]\napi_key = \"from-file\"\n"))
            .extract()
            .unwrap();
        assert_eq!(config.gemini.api_key.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_invalid_value_is_rejected() {
        let result: Result<Config, _> = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string("reasoning_effort = \"extreme\""))
            .extract();
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides_target_selected_backend() {
        let mut config = from_toml("[openai]\nmodel = \"gpt-5\"\n");
        config.apply(&Overrides {
            provider: Some(ProviderKind::Gemini),
            model: Some("gemini-2.5-flash".into()),
            base_url: Some("http://localhost:8080".into()),
            include_thoughts: true,
            no_stream: true,
            ..Default::default()
        });

        assert_eq!(config.provider, ProviderKind::Gemini);
        assert_eq!(config.gemini.model.as_deref(), Some("gemini-2.5-flash"));
        assert_eq!(config.gemini.base_url.as_deref(), Some("http://localhost:8080"));
        assert_eq!(config.openai.model.as_deref(), Some("gpt-5"));
        assert_eq!(config.include_thoughts, Some(true));
        assert!(!config.stream);
        assert!(config.tools);
    }

    #[test]
    fn test_empty_overrides_keep_config() {
        let mut config = from_toml("reasoning_summary = \"auto\"\ninclude_thoughts = false\n");
        let before = config.clone();
        config.apply(&Overrides::default());
        assert_eq!(config, before);
    }

    #[test]
    fn test_mask_key() {
        assert_eq!(mask_key("sk-proj-abcdefghijklmnop"), "sk-p****mnop");
        assert_eq!(mask_key("short"), "****");
    }

    #[test]
    fn test_masked_toml() {
        let config = from_toml(
            r#"
            [openai]
            api_key = "sk-proj-abcdefghijklmnop"
            model = "gpt-5-nano"
        "#,
        );

        let output = config.to_masked_toml().unwrap();
        assert!(!output.contains("abcdefghijkl"));
        assert!(output.contains("sk-p****mnop"));
        assert!(output.contains("provider = \"openai\""));

        let reparsed: Config = toml::from_str(&output).unwrap();
        assert_eq!(reparsed.openai.model.as_deref(), Some("gpt-5-nano"));
    }
}
