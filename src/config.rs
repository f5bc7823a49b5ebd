use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// 配置加载错误
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to read environment overrides: {0}")]
    Env(#[from] envy::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub server: ServerConfig,
    pub security: SecurityConfig,
    pub registry: RegistryConfig,
    pub discovery: DiscoveryConfig,
    pub gateway: GatewayConfig,
    pub database: DatabaseConfig,
    pub jwt: JwtConfig,
    pub scheduler: SchedulerConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    // 为空时使用各进程自己的默认端口
    pub bind_address: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SecurityConfig {
    /// 允许注册的 API 密钥，为空表示不校验
    pub tokens: Vec<String>,
    pub bcrypt_cost: u32,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            tokens: Vec::new(),
            bcrypt_cost: bcrypt::DEFAULT_COST,
        }
    }
}

impl SecurityConfig {
    pub fn validate_token(&self, token: &str) -> bool {
        self.tokens.is_empty() || self.tokens.iter().any(|t| t == token)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// 租约时长（秒），超过该时间没有心跳的实例会被剔除
    pub lease_duration: u64,
    /// 剔除任务的执行间隔（秒）
    pub eviction_interval: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            lease_duration: 90,
            eviction_interval: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    pub registry_address: String,
    /// 注册到注册中心的对外地址，例如 http://10.0.0.5:8082
    pub advertised_address: Option<String>,
    pub api_key: String,
    pub heartbeat_interval: u64,
    pub cache_ttl: u64,
    pub connect_timeout: u64,
    pub request_timeout: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            registry_address: "http://127.0.0.1:8761".to_string(),
            advertised_address: None,
            api_key: String::new(),
            heartbeat_interval: 30,
            cache_ttl: 5,
            connect_timeout: 5,
            request_timeout: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub request_timeout: u64,
    pub connection_pool: ConnectionPoolSettings,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            request_timeout: 30,
            connection_pool: ConnectionPoolSettings::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionPoolSettings {
    pub connect_timeout: u64,
    pub idle_timeout: u64,
    pub cleanup_interval: u64,
}

impl Default for ConnectionPoolSettings {
    fn default() -> Self {
        Self {
            connect_timeout: 5,
            idle_timeout: 300,
            cleanup_interval: 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    /// 为空时使用内存存储
    pub url: Option<String>,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            min_connections: 1,
            connect_timeout: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub secret: String,
    pub expiration: u64,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            secret: "change-me-in-production".to_string(),
            expiration: 10 * 60 * 60,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    /// 每日报表的执行时刻（本地时间，0-23）
    pub report_hour: u32,
    pub heavy_task_limit: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            report_hour: 2,
            heavy_task_limit: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

// MESH_* 环境变量覆盖
#[derive(Debug, Default, Deserialize)]
struct EnvOverrides {
    bind_address: Option<String>,
    registry_address: Option<String>,
    advertised_address: Option<String>,
    api_key: Option<String>,
    database_url: Option<String>,
    jwt_secret: Option<String>,
    log_level: Option<String>,
}

impl Config {
    /// 依次读取 config.toml、.env 与 MESH_* 环境变量
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let path = std::env::var("MESH_CONFIG").unwrap_or_else(|_| "config.toml".to_string());
        let mut config = Self::from_file(&path)?;

        let overrides: EnvOverrides = envy::prefixed("MESH_").from_env()?;
        config.apply_overrides(overrides);
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "Config file not found, using defaults");
            return Ok(Self::default());
        }

        let config_str = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&config_str)
    }

    pub fn from_toml_str(config_str: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(config_str)?)
    }

    fn apply_overrides(&mut self, overrides: EnvOverrides) {
        if let Some(bind_address) = overrides.bind_address {
            self.server.bind_address = Some(bind_address);
        }
        if let Some(registry_address) = overrides.registry_address {
            self.discovery.registry_address = registry_address;
        }
        if let Some(advertised_address) = overrides.advertised_address {
            self.discovery.advertised_address = Some(advertised_address);
        }
        if let Some(api_key) = overrides.api_key {
            self.discovery.api_key = api_key;
        }
        if let Some(database_url) = overrides.database_url {
            self.database.url = Some(database_url);
        }
        if let Some(jwt_secret) = overrides.jwt_secret {
            self.jwt.secret = jwt_secret;
        }
        if let Some(level) = overrides.log_level {
            self.logging.level = level;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.registry.lease_duration == 0 || self.registry.eviction_interval == 0 {
            return Err(ConfigError::Invalid(
                "registry lease_duration and eviction_interval must be positive".into(),
            ));
        }
        if self.discovery.heartbeat_interval == 0 {
            return Err(ConfigError::Invalid(
                "discovery heartbeat_interval must be positive".into(),
            ));
        }
        if self.gateway.request_timeout == 0 {
            return Err(ConfigError::Invalid(
                "gateway request_timeout must be positive".into(),
            ));
        }
        let pool = &self.gateway.connection_pool;
        if pool.cleanup_interval == 0 || pool.idle_timeout == 0 {
            return Err(ConfigError::Invalid(
                "connection_pool cleanup_interval and idle_timeout must be positive".into(),
            ));
        }
        if self.jwt.secret.trim().is_empty() {
            return Err(ConfigError::Invalid("jwt secret must not be empty".into()));
        }
        if self.scheduler.report_hour > 23 {
            return Err(ConfigError::Invalid(format!(
                "scheduler report_hour must be 0-23, got {}",
                self.scheduler.report_hour
            )));
        }
        if !(4..=31).contains(&self.security.bcrypt_cost) {
            return Err(ConfigError::Invalid("bcrypt_cost must be 4-31".into()));
        }
        Ok(())
    }

    pub fn bind_address_or(&self, default: &str) -> String {
        self.server
            .bind_address
            .clone()
            .unwrap_or_else(|| default.to_string())
    }

    pub fn lease_duration(&self) -> Duration {
        Duration::from_secs(self.registry.lease_duration)
    }

    pub fn eviction_interval(&self) -> Duration {
        Duration::from_secs(self.registry.eviction_interval)
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_secs(self.discovery.heartbeat_interval)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.gateway.request_timeout)
    }
}
