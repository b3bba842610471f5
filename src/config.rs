use crate::error::{ProxyError, Result};
use crate::providers::UpstreamPreset;
use crate::registry::ModelDescriptor;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    /// Extra registry entries on top of the built-in models.
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
    /// Bearer credential, resolved from the environment once at startup.
    #[serde(skip)]
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_name")]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<UpstreamFormat>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_connect_timeout_secs")]
    pub connect_timeout_secs: u64,
    /// Longest silence tolerated between two reads of an upstream body.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
}

/// Wire shape spoken by the upstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpstreamFormat {
    /// OpenAI-style `/chat/completions`.
    Chat,
    /// Raw prompt generation at `{base_url}/{model}`.
    Prompt,
}

/// Values used when the inbound request omits a field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u64,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default = "default_top_p")]
    pub top_p: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Strip reasoning markup from every response, not only when the client asks.
    #[serde(default)]
    pub always: bool,
}

fn default_port() -> u16 {
    10000
}

fn default_upstream_name() -> String {
    "nvidia".to_string()
}

fn default_api_key_env() -> String {
    "NVIDIA_API_KEY".to_string()
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_connect_timeout_secs() -> u64 {
    10
}

fn default_read_timeout_secs() -> u64 {
    60
}

fn default_model() -> String {
    "deepseek-ai/deepseek-v3_2".to_string()
}

fn default_max_tokens() -> u64 {
    1024
}

fn default_temperature() -> f64 {
    0.7
}

fn default_top_p() -> f64 {
    1.0
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            upstream: UpstreamConfig::default(),
            defaults: DefaultsConfig::default(),
            filter: FilterConfig::default(),
            models: Vec::new(),
            api_key: None,
        }
    }
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            name: default_upstream_name(),
            base_url: None,
            api_key_env: default_api_key_env(),
            format: None,
            timeout_secs: default_timeout_secs(),
            connect_timeout_secs: default_connect_timeout_secs(),
            read_timeout_secs: default_read_timeout_secs(),
        }
    }
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            top_p: default_top_p(),
        }
    }
}

impl ProxyConfig {
    /// Load config from a TOML file. Missing sections fall back to defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ProxyError::config(format!("Failed to read config file {}: {}", path.display(), e))
        })?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Search standard locations for a config file.
    /// Priority: CLI arg > CWD > XDG config > home dir > built-in defaults
    pub fn find_and_load(explicit_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit_path {
            return Self::load(path);
        }

        for candidate in &config_search_paths() {
            if candidate.exists() {
                tracing::info!(path = %candidate.display(), "Loading config");
                return Self::load(candidate);
            }
        }

        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    /// Pull process-environment values into the config: the credential from
    /// `upstream.api_key_env` and the listen port from `PORT`.
    pub fn apply_env(&mut self) -> Result<()> {
        self.api_key = std::env::var(&self.upstream.api_key_env)
            .ok()
            .filter(|k| !k.trim().is_empty());

        if let Ok(port) = std::env::var("PORT") {
            self.port = port
                .trim()
                .parse()
                .map_err(|_| ProxyError::config(format!("Invalid PORT value '{port}'")))?;
        }
        Ok(())
    }

    /// The configured credential, or a configuration error naming the variable.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            ProxyError::config(format!(
                "{} not set: upstream credential configuration missing",
                self.upstream.api_key_env
            ))
        })
    }

    /// Resolve the effective base URL (config override or preset default)
    pub fn effective_base_url(&self) -> Result<String> {
        if let Some(ref url) = self.upstream.base_url {
            return Ok(url.trim_end_matches('/').to_string());
        }

        let preset = UpstreamPreset::from_name(&self.upstream.name).ok_or_else(|| {
            ProxyError::config(format!(
                "Unknown upstream '{}' and no base_url configured. Known upstreams: {}",
                self.upstream.name,
                UpstreamPreset::all()
                    .iter()
                    .map(|p| p.name)
                    .collect::<Vec<_>>()
                    .join(", ")
            ))
        })?;

        Ok(preset.base_url.to_string())
    }

    /// Explicit format, else the preset's, else chat completions.
    #[must_use]
    pub fn effective_format(&self) -> UpstreamFormat {
        if let Some(fmt) = self.upstream.format {
            return fmt;
        }

        UpstreamPreset::from_name(&self.upstream.name)
            .map(|p| p.format)
            .unwrap_or(UpstreamFormat::Chat)
    }

    /// Point the config at another upstream by name. A known preset also
    /// supplies its credential variable; explicit URL and format are cleared.
    pub fn select_upstream(&mut self, name: &str) {
        self.upstream.name = name.to_string();
        self.upstream.base_url = None;
        self.upstream.format = None;
        if let Some(preset) = UpstreamPreset::from_name(name) {
            self.upstream.api_key_env = preset.default_api_key_env.to_string();
        }
    }

    /// Deadline for a whole non-streaming exchange. Streams are bounded only
    /// by the per-read timeout of [`Self::http_client`].
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream.timeout_secs)
    }

    /// HTTP client with the configured connect and per-read timeouts.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(self.upstream.connect_timeout_secs))
            .read_timeout(Duration::from_secs(self.upstream.read_timeout_secs))
            .build()
            .map_err(|e| ProxyError::config(format!("Failed to build HTTP client: {e}")))
    }
}

/// Config file locations, in search order.
pub fn config_search_paths() -> Vec<PathBuf> {
    let mut paths = Vec::new();

    // CWD
    paths.push(PathBuf::from("nim-proxy.toml"));

    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        paths.push(PathBuf::from(xdg).join("nim-proxy").join("config.toml"));
    }

    if let Some(home) = home_dir() {
        paths.push(home.join(".config").join("nim-proxy").join("config.toml"));
        paths.push(home.join(".nim-proxy.toml"));
    }

    paths
}

fn home_dir() -> Option<PathBuf> {
    std::env::var("HOME").ok().map(PathBuf::from)
}
