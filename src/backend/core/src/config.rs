//! Configuration management.

use serde::Deserialize;

use crate::model::RuleKind;
use crate::telemetry::LoggingConfig;

const ENV_PREFIX: &str = "MESHGOV";

/// Main application configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Batch and field limits
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Console authorization
    #[serde(default)]
    pub auth: AuthConfig,

    /// Operation history sink
    #[serde(default)]
    pub history: HistoryConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    /// Deadline attached to every console request
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Process-wide limits, immutable after startup.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct LimitsConfig {
    /// Maximum number of items in one write batch
    #[serde(default = "default_max_batch_size")]
    pub max_batch_size: usize,

    #[serde(default = "default_max_rule_name_length")]
    pub max_rule_name_length: usize,

    #[serde(default = "default_max_namespace_length")]
    pub max_namespace_length: usize,

    #[serde(default = "default_max_service_name_length")]
    pub max_service_name_length: usize,

    #[serde(default = "default_max_description_length")]
    pub max_description_length: usize,

    /// Page size used when a query carries no `limit`
    #[serde(default = "default_query_limit")]
    pub query_default_limit: usize,

    /// Upper bound applied to any requested `limit`
    #[serde(default = "default_query_limit")]
    pub query_max_limit: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_batch_size: default_max_batch_size(),
            max_rule_name_length: default_max_rule_name_length(),
            max_namespace_length: default_max_namespace_length(),
            max_service_name_length: default_max_service_name_length(),
            max_description_length: default_max_description_length(),
            query_default_limit: default_query_limit(),
            query_max_limit: default_query_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// When disabled every console call is approved
    #[serde(default)]
    pub enabled: bool,

    /// Rule kinds whose mutating operations are checked under read access
    #[serde(default = "default_relaxed_kinds")]
    pub relaxed_kinds: Vec<RuleKind>,

    /// Known access tokens
    #[serde(default)]
    pub tokens: Vec<TokenConfig>,

    /// Role table
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            relaxed_kinds: default_relaxed_kinds(),
            tokens: Vec::new(),
            roles: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenConfig {
    pub token: String,
    pub principal: String,
    #[serde(default)]
    pub roles: Vec<String>,
    #[serde(default)]
    pub disabled: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RoleConfig {
    pub name: String,
    /// Permission strings such as `rate_limit:modify` or `*:read`
    #[serde(default)]
    pub permissions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HistoryConfig {
    #[serde(default = "default_channel_buffer_size")]
    pub channel_buffer_size: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            channel_buffer_size: default_channel_buffer_size(),
        }
    }
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8090 }
fn default_request_timeout_secs() -> u64 { 30 }
fn default_max_batch_size() -> usize { 100 }
fn default_max_rule_name_length() -> usize { 64 }
fn default_max_namespace_length() -> usize { 64 }
fn default_max_service_name_length() -> usize { 128 }
fn default_max_description_length() -> usize { 1024 }
fn default_query_limit() -> usize { 100 }
fn default_relaxed_kinds() -> Vec<RuleKind> { vec![RuleKind::CircuitBreaker, RuleKind::Routing] }
fn default_channel_buffer_size() -> usize { 1024 }

impl Config {
    /// Load configuration from an optional `meshgov` file in the working
    /// directory and `MESHGOV__*` environment variables.
    pub fn load() -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("meshgov").required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Load from a specific file path.
    pub fn from_file(path: &str) -> anyhow::Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let cfg: Config = config.try_deserialize()?;
        Ok(cfg)
    }

    /// Socket address the console listens on.
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server.host, self.server.port)
    }
}
