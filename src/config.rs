use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{CephError, CephResult};

/// Connection settings for a single manager endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    pub address: String,
    pub port: u16,
    pub protocol: String,
    pub api_path: String,
    pub insecure_skip_verify: bool,
}

impl ServerConfig {
    pub fn new(address: &str, port: u16) -> Self {
        Self {
            address: address.to_string(),
            port,
            protocol: default_protocol(),
            api_path: default_api_path(),
            insecure_skip_verify: default_insecure_skip_verify(),
        }
    }

    pub fn with_protocol(mut self, protocol: &str) -> Self {
        self.protocol = protocol.to_string();
        self
    }

    /// Root of the REST API, e.g. `https://mgr:8443/api`.
    pub fn base_url(&self) -> String {
        format!(
            "{}://{}:{}/{}",
            self.protocol,
            self.address,
            self.port,
            self.api_path.trim_matches('/')
        )
    }
}

/// Retry policy of the transport layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Retries after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Fixed wait between attempts
    #[serde(default = "default_retry_wait_ms")]
    pub wait_ms: u64,
}

impl RetryConfig {
    pub fn wait(&self) -> Duration {
        Duration::from_millis(self.wait_ms)
    }

    /// First attempt plus retries.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            wait_ms: default_retry_wait_ms(),
        }
    }
}

/// Task polling behaviour of the completion waiter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub interval_ms: u64,
    /// Bound on the search of the finished list once a task left the executing list
    #[serde(default = "default_max_finished_attempts")]
    pub max_finished_attempts: u32,
}

impl PollConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: default_poll_interval_ms(),
            max_finished_attempts: default_max_finished_attempts(),
        }
    }
}

/// Complete client configuration, usually loaded from a TOML file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Candidate manager addresses, tried in order at login
    pub servers: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_protocol")]
    pub protocol: String,
    #[serde(default = "default_api_path")]
    pub api_path: String,
    #[serde(default = "default_insecure_skip_verify")]
    pub insecure_skip_verify: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    pub username: String,
    pub password: String,
    /// Ceiling of whole-operation retries after failed tasks
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub poll: PollConfig,
}

fn default_port() -> u16 {
    8443
}

fn default_protocol() -> String {
    "https".to_string()
}

fn default_api_path() -> String {
    "api".to_string()
}

fn default_insecure_skip_verify() -> bool {
    true
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_iterations() -> u32 {
    30
}

fn default_max_retries() -> u32 {
    10
}

fn default_retry_wait_ms() -> u64 {
    10_000
}

fn default_poll_interval_ms() -> u64 {
    5_000
}

fn default_max_finished_attempts() -> u32 {
    600
}

impl ClientConfig {
    pub fn new(servers: Vec<String>, username: &str, password: &str) -> Self {
        Self {
            servers,
            port: default_port(),
            protocol: default_protocol(),
            api_path: default_api_path(),
            insecure_skip_verify: default_insecure_skip_verify(),
            timeout_secs: default_timeout_secs(),
            username: username.to_string(),
            password: password.to_string(),
            max_iterations: default_max_iterations(),
            retry: RetryConfig::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn from_toml_str(content: &str) -> CephResult<Self> {
        let config: ClientConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> CephResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> CephResult<()> {
        if self.servers.is_empty() || self.servers.iter().any(|s| s.trim().is_empty()) {
            return Err(CephError::Configuration(
                "at least one non-empty server address is required".to_string(),
            ));
        }
        if self.protocol != "http" && self.protocol != "https" {
            return Err(CephError::Configuration(format!(
                "unsupported protocol '{}' (expected http or https)",
                self.protocol
            )));
        }
        if self.port == 0 {
            return Err(CephError::Configuration("port must be greater than 0".to_string()));
        }
        if self.api_path.trim_matches('/').is_empty() {
            return Err(CephError::Configuration("api_path can not be empty".to_string()));
        }
        if self.poll.interval_ms == 0 {
            return Err(CephError::Configuration(
                "poll.interval_ms must be greater than 0".to_string(),
            ));
        }
        if self.poll.max_finished_attempts == 0 {
            return Err(CephError::Configuration(
                "poll.max_finished_attempts must be greater than 0".to_string(),
            ));
        }
        Ok(())
    }

    /// One server configuration per candidate address.
    pub fn server_configs(&self) -> Vec<ServerConfig> {
        self.servers
            .iter()
            .map(|address| ServerConfig {
                address: address.trim().to_string(),
                port: self.port,
                protocol: self.protocol.clone(),
                api_path: self.api_path.clone(),
                insecure_skip_verify: self.insecure_skip_verify,
            })
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}
