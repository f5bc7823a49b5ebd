use std::collections::HashMap;
use std::time::Duration;

use crate::config::Config;

/// 注册中心客户端配置
#[derive(Debug, Clone)]
pub struct DiscoveryClientConfig {
    /// 注册中心地址
    pub registry_address: String,
    /// 注册时使用的应用名
    pub app_name: String,
    /// 对外公布的实例地址
    pub advertised_address: String,
    /// 实例提供的 gRPC 服务全名
    pub services: Vec<String>,
    pub metadata: HashMap<String, String>,
    /// API 密钥
    pub api_key: String,
    pub heartbeat_interval: Duration,
    /// 连接超时时间
    pub connect_timeout: Duration,
    /// 默认超时时间
    pub request_timeout: Duration,
}

impl Default for DiscoveryClientConfig {
    fn default() -> Self {
        Self {
            registry_address: "http://127.0.0.1:8761".to_string(),
            app_name: String::new(),
            advertised_address: String::new(),
            services: Vec::new(),
            metadata: HashMap::new(),
            api_key: String::new(),
            heartbeat_interval: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
        }
    }
}

impl DiscoveryClientConfig {
    pub fn from_config(
        config: &Config,
        app_name: &str,
        advertised_address: String,
        services: Vec<String>,
    ) -> Self {
        Self {
            registry_address: config.discovery.registry_address.clone(),
            app_name: app_name.to_string(),
            advertised_address,
            services,
            metadata: HashMap::new(),
            api_key: config.discovery.api_key.clone(),
            heartbeat_interval: config.heartbeat_interval(),
            connect_timeout: Duration::from_secs(config.discovery.connect_timeout),
            request_timeout: Duration::from_secs(config.discovery.request_timeout),
        }
    }
}
