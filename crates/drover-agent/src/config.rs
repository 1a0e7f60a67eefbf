use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use drover_engine::EngineConfig;
use drover_fileops::{CleanupConfig, StorageConfig};
use drover_transport::TransportConfig;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Agent configuration, loaded from a YAML file with `${ENV}` expansion.
///
/// Every section has defaults; an empty file is a valid standalone-mode
/// configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSection,
    pub master: MasterSection,
    pub api: ApiSection,
    pub storage: StorageSection,
    pub executor: ExecutorSection,
    pub health: HealthSection,
    pub metrics: MetricsSection,
    pub logging: LoggingSection,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Defaults to the hostname when empty.
    pub id: String,
    pub name: String,
    pub environment: String,
    pub tags: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterSection {
    /// Controller URL; empty means standalone mode.
    pub url: String,
    pub token: String,
    pub connect_timeout_secs: u64,
    pub heartbeat_interval_secs: u64,
    pub reconnect_interval_secs: u64,
    pub max_reconnect_attempts: u32,
    pub tls_skip_verify: bool,
}

impl Default for MasterSection {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            connect_timeout_secs: 30,
            heartbeat_interval_secs: 30,
            reconnect_interval_secs: 10,
            max_reconnect_attempts: 10,
            tls_skip_verify: false,
        }
    }
}

/// Admin API surface; consumed by the out-of-tree HTTP/gRPC servers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSection {
    pub http_enabled: bool,
    pub http_address: String,
    pub http_port: u16,
    pub grpc_enabled: bool,
    pub grpc_address: String,
    pub grpc_port: u16,
}

impl Default for ApiSection {
    fn default() -> Self {
        Self {
            http_enabled: false,
            http_address: "0.0.0.0".into(),
            http_port: 8080,
            grpc_enabled: false,
            grpc_address: "0.0.0.0".into(),
            grpc_port: 8443,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageSection {
    pub data_dir: PathBuf,
    pub temp_dir: PathBuf,
    pub cleanup_enabled: bool,
    pub cleanup_interval_secs: u64,
    pub cleanup_max_age_secs: u64,
}

impl Default for StorageSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("/var/lib/drover/data"),
            temp_dir: PathBuf::from("/tmp/drover"),
            cleanup_enabled: true,
            cleanup_interval_secs: 60 * 60,
            cleanup_max_age_secs: 24 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorSection {
    pub worker_pool_size: usize,
    pub queue_size: usize,
    pub task_timeout_secs: u64,
}

impl Default for ExecutorSection {
    fn default() -> Self {
        Self {
            worker_pool_size: 5,
            queue_size: 100,
            task_timeout_secs: 30 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSection {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for HealthSection {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSection {
    pub enabled: bool,
    pub interval_secs: u64,
}

impl Default for MetricsSection {
    fn default() -> Self {
        Self {
            enabled: false,
            interval_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub level: String,
    /// `text` or `json`.
    pub format: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

impl Config {
    /// Load from a YAML file, expand `${VAR}` references, apply defaults,
    /// and validate.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&raw)
    }

    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env(raw);
        let mut config: Config = if expanded.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(&expanded)?
        };
        config.apply_defaults();
        config.validate()?;
        Ok(config)
    }

    fn apply_defaults(&mut self) {
        if self.agent.id.is_empty() {
            self.agent.id = hostname::get()
                .ok()
                .and_then(|name| name.into_string().ok())
                .unwrap_or_else(|| "drover-agent".to_string());
        }
        if self.agent.name.is_empty() {
            self.agent.name = self.agent.id.clone();
        }
        if self.agent.environment.is_empty() {
            self.agent.environment = "production".into();
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.master.url.is_empty() && self.master.token.is_empty() {
            return Err(ConfigError::Invalid(
                "master.token is required when master.url is set".into(),
            ));
        }
        if self.executor.worker_pool_size == 0 {
            return Err(ConfigError::Invalid(
                "executor.worker_pool_size must be positive".into(),
            ));
        }
        if self.executor.queue_size == 0 {
            return Err(ConfigError::Invalid(
                "executor.queue_size must be positive".into(),
            ));
        }
        Ok(())
    }

    /// Standalone mode: no controller configured.
    pub fn standalone(&self) -> bool {
        self.master.url.is_empty()
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.master.heartbeat_interval_secs)
    }

    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            worker_pool_size: self.executor.worker_pool_size,
            queue_size: self.executor.queue_size,
            task_timeout: Duration::from_secs(self.executor.task_timeout_secs),
            ..Default::default()
        }
    }

    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            data_dir: self.storage.data_dir.clone(),
            temp_dir: self.storage.temp_dir.clone(),
            cleanup: CleanupConfig {
                enabled: self.storage.cleanup_enabled,
                interval: Duration::from_secs(self.storage.cleanup_interval_secs),
                max_age: Duration::from_secs(self.storage.cleanup_max_age_secs),
            },
        }
    }

    pub fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            url: self.master.url.clone(),
            token: self.master.token.clone(),
            connect_timeout: Duration::from_secs(self.master.connect_timeout_secs),
            reconnect_interval: Duration::from_secs(self.master.reconnect_interval_secs),
            max_reconnect_attempts: self.master.max_reconnect_attempts,
            tls_skip_verify: self.master.tls_skip_verify,
        }
    }
}

/// Expand `${VAR}` references from the process environment. Unknown
/// variables expand to an empty string.
fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        match rest[start + 2..].find('}') {
            Some(end) => {
                let name = &rest[start + 2..start + 2 + end];
                out.push_str(&std::env::var(name).unwrap_or_default());
                rest = &rest[start + 2 + end + 1..];
            }
            None => {
                out.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_is_standalone_with_defaults() {
        let config = Config::parse("").unwrap();
        assert!(config.standalone());
        assert!(!config.agent.id.is_empty());
        assert_eq!(config.agent.name, config.agent.id);
        assert_eq!(config.executor.worker_pool_size, 5);
        assert_eq!(config.executor.queue_size, 100);
        assert_eq!(config.master.heartbeat_interval_secs, 30);
        assert_eq!(config.master.max_reconnect_attempts, 10);
    }

    #[test]
    fn parses_master_section() {
        let config = Config::parse(
            r#"
agent:
  id: host-9
master:
  url: wss://controller:9443/agent
  token: tok
  heartbeat_interval_secs: 5
"#,
        )
        .unwrap();

        assert!(!config.standalone());
        assert_eq!(config.agent.id, "host-9");
        assert_eq!(config.heartbeat_interval(), Duration::from_secs(5));

        let transport = config.transport_config();
        assert_eq!(transport.url, "wss://controller:9443/agent");
        assert_eq!(transport.token, "tok");
    }

    #[test]
    fn master_url_without_token_is_invalid() {
        let err = Config::parse("master:\n  url: ws://c/agent\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn zero_pool_size_is_invalid() {
        let err = Config::parse("executor:\n  worker_pool_size: 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn env_references_are_expanded() {
        std::env::set_var("DROVER_TEST_TOKEN", "from-env");
        let config = Config::parse(
            "master:\n  url: ws://c/agent\n  token: ${DROVER_TEST_TOKEN}\n",
        )
        .unwrap();
        assert_eq!(config.master.token, "from-env");

        assert_eq!(expand_env("a ${MISSING_VAR_XYZ} b"), "a  b");
        assert_eq!(expand_env("no refs"), "no refs");
        assert_eq!(expand_env("dangling ${OPEN"), "dangling ${OPEN");
    }

    #[test]
    fn engine_config_maps_executor_section() {
        let config = Config::parse(
            "executor:\n  worker_pool_size: 2\n  queue_size: 7\n  task_timeout_secs: 60\n",
        )
        .unwrap();
        let engine = config.engine_config();
        assert_eq!(engine.worker_pool_size, 2);
        assert_eq!(engine.queue_size, 7);
        assert_eq!(engine.task_timeout, Duration::from_secs(60));
    }
}
