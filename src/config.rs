use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::services::discovery::WatchConfig;
use crate::services::registry::Registration;

const DEFAULT_CONFIG_PATH: &str = "config.toml";
const CONFIG_PATH_ENV: &str = "DISCOVERY_CONFIG";
const ENV_PREFIX: &str = "DISCOVERY_";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read environment overrides: {0}")]
    Env(#[from] envy::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub consul: ConsulConfig,
    pub watch: WatchSettings,
    pub instance: Option<InstanceConfig>,
    pub agent: AgentConfig,
}

// Consul agent 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsulConfig {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub token: Option<String>,
    pub datacenter: Option<String>,
    pub request_timeout_secs: u64,
}

impl Default for ConsulConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8500,
            scheme: "http".to_string(),
            token: None,
            datacenter: None,
            request_timeout_secs: 10,
        }
    }
}

impl ConsulConfig {
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

// 监听任务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WatchSettings {
    /// 阻塞查询的最长等待秒数
    pub wait_secs: u64,
    pub retry_interval_secs: u64,
    pub max_backoff_secs: u64,
}

impl Default for WatchSettings {
    fn default() -> Self {
        Self {
            wait_secs: 300,
            retry_interval_secs: 5,
            max_backoff_secs: 20,
        }
    }
}

impl WatchSettings {
    pub fn wait(&self) -> Duration {
        Duration::from_secs(self.wait_secs)
    }

    pub fn watch_config(&self) -> WatchConfig {
        WatchConfig {
            retry_interval: Duration::from_secs(self.retry_interval_secs),
            max_backoff: Duration::from_secs(self.max_backoff_secs),
        }
    }
}

// 本进程要注册的实例
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InstanceConfig {
    pub service_name: String,
    pub instance_id: Option<String>,
    pub host: String,
    pub port: u16,
    pub health_check_path: String,
    pub meta: HashMap<String, String>,
}

impl Default for InstanceConfig {
    fn default() -> Self {
        Self {
            service_name: String::new(),
            instance_id: None,
            host: "127.0.0.1".to_string(),
            port: 0,
            health_check_path: "/health".to_string(),
            meta: HashMap::new(),
        }
    }
}

impl InstanceConfig {
    pub fn registration(&self) -> Registration {
        let instance_id = self
            .instance_id
            .clone()
            .unwrap_or_else(|| format!("{}-{}", self.service_name, Uuid::new_v4()));

        Registration {
            service_name: self.service_name.clone(),
            instance_id,
            health_check_path: self.health_check_path.clone(),
            host: self.host.clone(),
            port: self.port,
            metadata: self.meta.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    /// 启动后需要持续解析的服务名
    pub services: Vec<String>,
    pub refresh_secs: u64,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            services: Vec::new(),
            refresh_secs: 30,
        }
    }
}

impl AgentConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_secs.max(1))
    }
}

// 可通过 DISCOVERY_* 环境变量覆盖的字段
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    consul_host: Option<String>,
    consul_port: Option<u16>,
    consul_token: Option<String>,
    instance_host: Option<String>,
    instance_port: Option<u16>,
}

impl Config {
    pub fn load() -> Result<Self, ConfigError> {
        // .env 不存在时忽略
        let _ = dotenvy::dotenv();

        let path =
            std::env::var(CONFIG_PATH_ENV).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string());
        let mut config = if Path::new(&path).exists() {
            Self::from_file(&path)?
        } else {
            tracing::warn!(path = %path, "Config file not found, using defaults");
            Self::default()
        };

        let overrides: EnvOverrides = envy::prefixed(ENV_PREFIX).from_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_string(),
            source,
        })?;
        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(host) = overrides.consul_host {
            self.consul.host = host;
        }
        if let Some(port) = overrides.consul_port {
            self.consul.port = port;
        }
        if overrides.consul_token.is_some() {
            self.consul.token = overrides.consul_token;
        }
        if let Some(instance) = self.instance.as_mut() {
            if let Some(host) = overrides.instance_host {
                instance.host = host;
            }
            if let Some(port) = overrides.instance_port {
                instance.port = port;
            }
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.consul.host.is_empty() {
            return Err(ConfigError::Invalid("consul.host must not be empty".into()));
        }
        if self.consul.port == 0 {
            return Err(ConfigError::Invalid("consul.port must not be 0".into()));
        }
        if let Some(instance) = &self.instance {
            if instance.service_name.is_empty() {
                return Err(ConfigError::Invalid(
                    "instance.service_name must not be empty".into(),
                ));
            }
            if instance.port == 0 {
                return Err(ConfigError::Invalid("instance.port must not be 0".into()));
            }
        }
        Ok(())
    }
}
