//! 服务发现客户端
//!
//! 业务服务通过 `DiscoveryClient` 注册与续约，网关与服务间调用通过
//! `ServiceResolver` 把服务名解析为实例地址。

pub mod client;
pub mod config;
pub mod error;
pub mod resolver;

pub use client::DiscoveryClient;
pub use config::DiscoveryClientConfig;
pub use error::DiscoveryError;
pub use resolver::{CachedResolver, InstanceSource, ServiceResolver};
