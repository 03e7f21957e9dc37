use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{ParleyError, Result};
use crate::types::ModelSelector;

/// Top-level configuration for Parley.
///
/// Loaded from a TOML file, then overridden by `PARLEY_*` environment
/// variables. Configuration is read once at startup.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParleyConfig {
    #[serde(default)]
    pub general: GeneralConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub tls: TlsConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub agent: AgentConfig,
    #[serde(default)]
    pub tools: Vec<ToolEndpointConfig>,
    #[serde(default)]
    pub chat: ChatConfig,
}

impl ParleyConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: ParleyConfig = toml::from_str(&content)?;
        info!("Configuration loaded from {}", path.display());
        Ok(config)
    }

    /// Load configuration from a TOML file, or defaults when no file
    /// exists at `path`. A file that exists but cannot be read or parsed is
    /// an error.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("No config file at {}. Using defaults.", path.display());
            return Ok(Self::default());
        }
        Self::load(path)
    }

    /// Apply `PARLEY_*` overrides from the process environment.
    pub fn apply_env(&mut self) -> Result<()> {
        self.apply_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides using `lookup` to resolve variable names.
    ///
    /// Unparseable numeric or boolean values are configuration errors rather
    /// than silently ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("PARLEY_ENVIRONMENT") {
            self.general.environment = v;
        }
        if let Some(v) = lookup("PARLEY_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(v) = lookup("PARLEY_HOST") {
            self.server.host = v;
        }
        if let Some(v) = lookup("PARLEY_PORT") {
            self.server.port = parse_env("PARLEY_PORT", &v)?;
        }
        if let Some(v) = lookup("PARLEY_TLS_ENABLED") {
            self.tls.enabled = parse_bool("PARLEY_TLS_ENABLED", &v)?;
        }
        if let Some(v) = lookup("PARLEY_TLS_CERT") {
            self.tls.cert_path = Some(v);
        }
        if let Some(v) = lookup("PARLEY_TLS_KEY") {
            self.tls.key_path = Some(v);
        }
        if let Some(v) = lookup("PARLEY_DATABASE_URL") {
            self.database.url = v;
        }
        if let Some(v) = lookup("PARLEY_AUTH_PROJECT_ID") {
            self.auth.project_id = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("PARLEY_AUTH_BASE_URI") {
            self.auth.base_uri = v;
        }
        if let Some(v) = lookup("PARLEY_AGENT_ENDPOINT") {
            self.agent.endpoint = if v.trim().is_empty() { None } else { Some(v) };
        }
        if let Some(v) = lookup("PARLEY_AGENT_TIMEOUT_SECS") {
            self.agent.timeout_secs = parse_env("PARLEY_AGENT_TIMEOUT_SECS", &v)?;
        }
        if let Some(v) = lookup("PARLEY_DEFAULT_MODEL") {
            self.agent.default_model = v;
        }
        if let Some(v) = lookup("PARLEY_TOOLS") {
            self.tools = parse_tool_list(&v)?;
        }
        Ok(())
    }

    /// Check cross-field constraints. Called once before the server starts.
    pub fn validate(&self) -> Result<()> {
        match self.general.environment.as_str() {
            "development" | "production" => {}
            other => {
                return Err(ParleyError::Config(format!(
                    "Invalid environment '{}'. Must be one of: development, production",
                    other
                )))
            }
        }

        if self.is_production() && self.auth.project_id.is_none() {
            return Err(ParleyError::Config(
                "No identity provider configured; no-auth mode is not allowed in production"
                    .to_string(),
            ));
        }

        if self.tls.enabled && (self.tls.cert_path.is_none() || self.tls.key_path.is_none()) {
            return Err(ParleyError::Config(
                "TLS is enabled but cert_path or key_path is missing".to_string(),
            ));
        }

        self.model_selector()?;

        if self.agent.timeout_secs == 0 {
            return Err(ParleyError::Config("agent.timeout_secs must be > 0".to_string()));
        }

        let mut seen = std::collections::HashSet::new();
        for tool in &self.tools {
            if tool.name.trim().is_empty() || tool.url.trim().is_empty() {
                return Err(ParleyError::Config(
                    "Every tool endpoint needs a name and a url".to_string(),
                ));
            }
            if tool.timeout_secs == 0 {
                return Err(ParleyError::Config(format!(
                    "Tool '{}' timeout_secs must be > 0",
                    tool.name
                )));
            }
            if !seen.insert(tool.name.as_str()) {
                return Err(ParleyError::Config(format!(
                    "Duplicate tool endpoint name '{}'",
                    tool.name
                )));
            }
        }

        if self.chat.title_max_chars == 0 || self.chat.max_message_chars == 0 {
            return Err(ParleyError::Config(
                "chat.title_max_chars and chat.max_message_chars must be > 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn is_production(&self) -> bool {
        self.general.environment == "production"
    }

    /// Parse the configured default model selector.
    pub fn model_selector(&self) -> Result<ModelSelector> {
        self.agent.default_model.parse()
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| ParleyError::Config(format!("Invalid value for {}: '{}'", key, value)))
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        _ => Err(ParleyError::Config(format!(
            "Invalid value for {}: '{}'",
            key, value
        ))),
    }
}

/// Parse `name=url[@timeout_secs]` entries separated by commas.
fn parse_tool_list(value: &str) -> Result<Vec<ToolEndpointConfig>> {
    let mut tools = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (name, rest) = entry.split_once('=').ok_or_else(|| {
            ParleyError::Config(format!("Invalid tool entry '{}'. Expected name=url", entry))
        })?;

        // A trailing @N is a timeout; any other '@' belongs to the url.
        let (url, timeout_secs) = match rest.rsplit_once('@') {
            Some((url, secs)) if secs.parse::<u64>().is_ok() => {
                (url, parse_env::<u64>("PARLEY_TOOLS", secs)?)
            }
            _ => (rest, default_tool_timeout_secs()),
        };

        tools.push(ToolEndpointConfig {
            name: name.trim().to_string(),
            url: url.trim().to_string(),
            description: String::new(),
            timeout_secs,
        });
    }
    Ok(tools)
}

/// General application settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// "development" or "production".
    pub environment: String,
    /// Log level: trace, debug, info, warn, error.
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            environment: "development".to_string(),
            log_level: "info".to_string(),
        }
    }
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<String>,
    /// Global request budget per second for `/api/v1`.
    pub rate_limit_per_sec: u64,
    /// Maximum chat turns processed at once.
    pub max_concurrent_turns: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            cors_origins: vec!["http://localhost:3000".to_string()],
            rate_limit_per_sec: 100,
            max_concurrent_turns: 64,
        }
    }
}

/// TLS termination settings. Certificates are produced elsewhere.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TlsConfig {
    pub enabled: bool,
    pub cert_path: Option<String>,
    pub key_path: Option<String>,
}

/// Conversation store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// File path, `sqlite://<path>`, or `:memory:`.
    pub url: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "parley.db".to_string(),
        }
    }
}

/// External identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Provider project identifier. `None` selects development no-auth mode.
    pub project_id: Option<String>,
    pub base_uri: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            base_uri: "https://api.descope.com".to_string(),
        }
    }
}

/// Agent runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// Agent runtime URL. Without it every turn records an error reply.
    pub endpoint: Option<String>,
    /// `<provider>.<model>.<effort?>`.
    pub default_model: String,
    /// Upper bound on one orchestration, tool rounds included.
    pub timeout_secs: u64,
    pub max_tool_rounds: u32,
    /// System instruction sent with every request.
    pub instruction: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            default_model: "anthropic.sonnet".to_string(),
            timeout_secs: 150,
            max_tool_rounds: 16,
            instruction: "You are an assistant with access to external tools. \
                          Identify the closest match to the user's request, make \
                          the appropriate tool calls, and answer with the \
                          information requested."
                .to_string(),
        }
    }
}

/// One external tool server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolEndpointConfig {
    pub name: String,
    pub url: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_tool_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_tool_timeout_secs() -> u64 {
    30
}

/// Chat turn settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    pub max_message_chars: usize,
    pub title_max_chars: usize,
    /// Greeting stored as the first message of every conversation.
    pub welcome_message: String,
    /// Text of the assistant message recorded when orchestration fails.
    pub error_message: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            max_message_chars: 8000,
            title_max_chars: 60,
            welcome_message: "Hello! How can I help you today?".to_string(),
            error_message: "Sorry, I couldn't complete that request. Please try again."
                .to_string(),
        }
    }
}
