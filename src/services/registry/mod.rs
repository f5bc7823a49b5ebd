//! Registry service module
//!
//! - `types`: 实例与注册表的数据结构
//! - `service`: 注册、续约、查询与剔除
//! - `grpc_impl`: gRPC trait 实现

pub mod error;
pub mod grpc_impl;
pub mod service;
pub mod types;

pub use error::RegistryError;
pub use service::DiscoveryRegistry;
pub use types::{
    Registration, ServiceHealthStatus, ServiceInstance, ServiceInstances, ServiceRegistry,
};
