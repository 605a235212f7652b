//! Configuration structures for AgentLoop
//!
//! This module defines all configuration types used by the coordinator service.
//! Configurations are loaded from YAML files and can be overridden by environment
//! variables of the form `AGENTLOOP__SECTION__FIELD` (e.g. `AGENTLOOP__SERVER__PORT`).

use crate::error::{AgentLoopError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;

/// Environment variable prefix for overrides
pub const ENV_PREFIX: &str = "AGENTLOOP";

/// Top-level configuration for the AgentLoop service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentLoopConfig {
    /// HTTP/WebSocket server settings
    #[serde(default)]
    pub server: ServerConfig,

    /// Language model endpoint shared by all agents
    #[serde(default)]
    pub model: ModelConfig,

    /// Specialist agent roster, in registration order
    #[serde(default = "default_agents")]
    pub agents: Vec<AgentConfig>,

    /// Background activity simulator
    #[serde(default)]
    pub simulator: SimulatorConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server binding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server binding address
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Server port
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Which language model backend to use
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Google Generative Language API
    #[default]
    Gemini,

    /// Fixed reply, no network (demo mode)
    Static,

    /// Every call fails; all judgments use their fallbacks
    Unavailable,
}

/// Language model configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Backend provider
    #[serde(default)]
    pub provider: ModelProvider,

    /// Model name passed to the provider
    #[serde(default = "default_model_name")]
    pub model_name: String,

    /// Environment variable holding the API key
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    /// Override for the provider base URL
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Per-call timeout in seconds (unset = wait indefinitely)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,

    /// Reply used by the static provider
    #[serde(default)]
    pub static_reply: String,
}

/// A single specialist agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique agent identifier
    pub id: String,

    /// Display name (also written to the store as the assignee)
    pub name: String,

    /// Specialization label matched against recommended categories
    pub specialization: String,

    /// Maximum concurrently held tasks
    #[serde(default = "default_capacity")]
    pub capacity: usize,
}

/// Activity simulator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// Run the simulator at all
    #[serde(default = "default_simulator_enabled")]
    pub enabled: bool,

    /// Seconds between ticks
    #[serde(default = "default_simulator_interval")]
    pub interval_secs: u64,
}

/// Observability configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Expose Prometheus metrics on `/metrics`
    #[serde(default = "default_metrics")]
    pub enable_metrics: bool,
}

/// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_model_name() -> String {
    "gemini-pro".to_string()
}

fn default_api_key_env() -> String {
    "GOOGLE_AI_API_KEY".to_string()
}

fn default_capacity() -> usize {
    3
}

fn default_simulator_enabled() -> bool {
    true
}

fn default_simulator_interval() -> u64 {
    30
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_metrics() -> bool {
    true
}

fn default_agents() -> Vec<AgentConfig> {
    [
        ("frontend_specialist", "Sarah AI", "Frontend"),
        ("backend_specialist", "Mike AI", "Backend"),
        ("fullstack_specialist", "Alex AI", "Fullstack"),
        ("devops_specialist", "Emma AI", "DevOps"),
    ]
    .into_iter()
    .map(|(id, name, specialization)| AgentConfig {
        id: id.to_string(),
        name: name.to_string(),
        specialization: specialization.to_string(),
        capacity: default_capacity(),
    })
    .collect()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
        }
    }
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            provider: ModelProvider::default(),
            model_name: default_model_name(),
            api_key_env: default_api_key_env(),
            base_url: None,
            timeout_secs: None,
            static_reply: String::new(),
        }
    }
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            enabled: default_simulator_enabled(),
            interval_secs: default_simulator_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            enable_metrics: default_metrics(),
        }
    }
}

impl Default for AgentLoopConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            model: ModelConfig::default(),
            agents: default_agents(),
            simulator: SimulatorConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}

impl AgentLoopConfig {
    /// Load configuration from a YAML file layered with environment overrides
    ///
    /// A missing file is not an error; defaults apply.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let path_str = path.to_str().ok_or_else(|| {
            AgentLoopError::config(format!("Non UTF-8 config path: {}", path.display()))
        })?;

        let file = config::File::new(path_str, config::FileFormat::Yaml);
        let settings = config::Config::builder()
            .add_source(file.required(false))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| {
                AgentLoopError::Config(format!("Failed to read config {}: {}", path.display(), e))
            })?;

        let config: AgentLoopConfig = settings
            .try_deserialize()
            .map_err(|e| {
                AgentLoopError::Config(format!("Failed to parse config {}: {}", path.display(), e))
            })?;

        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from an in-memory YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: AgentLoopConfig = config::Config::builder()
            .add_source(config::File::from_str(yaml, config::FileFormat::Yaml))
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(AgentLoopError::config("Server port must be non-zero"));
        }

        if self.agents.is_empty() {
            return Err(AgentLoopError::config("At least one agent must be configured"));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.id.trim().is_empty() {
                return Err(AgentLoopError::config("Agent id must not be empty"));
            }
            if agent.specialization.trim().is_empty() {
                return Err(AgentLoopError::config(format!(
                    "Agent {} has an empty specialization",
                    agent.id
                )));
            }
            if agent.capacity == 0 {
                return Err(AgentLoopError::config(format!(
                    "Agent {} must have a capacity of at least 1",
                    agent.id
                )));
            }
            if !seen.insert(agent.id.as_str()) {
                return Err(AgentLoopError::config(format!("Duplicate agent id: {}", agent.id)));
            }
        }

        if self.simulator.interval_secs == 0 {
            return Err(AgentLoopError::config("Simulator interval must be at least 1 second"));
        }

        if self.model.timeout_secs == Some(0) {
            return Err(AgentLoopError::config("Model timeout must be at least 1 second"));
        }

        Ok(())
    }

    /// Get server bind address as `host:port`
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.server.bind_address, self.server.port)
    }

    /// Get simulator interval as Duration
    pub fn simulator_interval(&self) -> Duration {
        Duration::from_secs(self.simulator.interval_secs)
    }

    /// Get model call timeout as Duration, if one is configured
    pub fn model_timeout(&self) -> Option<Duration> {
        self.model.timeout_secs.map(Duration::from_secs)
    }
}
