use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use crate::registry::{InstanceInfo, InstanceStatus};

// 服务实例注册信息
#[derive(Debug, Clone)]
pub struct ServiceInstance {
    pub instance_id: String,
    pub app_name: String,
    pub address: String,
    pub metadata: HashMap<String, String>,
    pub registered_at: SystemTime,
    pub last_heartbeat: SystemTime,
    pub health_status: ServiceHealthStatus,
}

impl ServiceInstance {
    pub fn is_expired(&self, now: SystemTime, lease: Duration) -> bool {
        match now.duration_since(self.last_heartbeat) {
            Ok(elapsed) => elapsed > lease,
            // 心跳时间晚于 now（时钟回拨）视为未过期
            Err(_) => false,
        }
    }

    pub fn to_info(&self) -> InstanceInfo {
        let last_heartbeat_unix = self
            .last_heartbeat
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();

        InstanceInfo {
            instance_id: self.instance_id.clone(),
            app_name: self.app_name.clone(),
            address: self.address.clone(),
            status: InstanceStatus::from(self.health_status) as i32,
            metadata: self.metadata.clone(),
            last_heartbeat_unix,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceHealthStatus {
    Healthy,
    Unhealthy,
    Unknown,
}

impl From<ServiceHealthStatus> for InstanceStatus {
    fn from(status: ServiceHealthStatus) -> Self {
        match status {
            ServiceHealthStatus::Healthy => InstanceStatus::Up,
            ServiceHealthStatus::Unhealthy => InstanceStatus::Down,
            ServiceHealthStatus::Unknown => InstanceStatus::Unknown,
        }
    }
}

impl ServiceHealthStatus {
    /// UNSPECIFIED 表示心跳没有携带状态
    pub fn from_wire(status: InstanceStatus) -> Option<Self> {
        match status {
            InstanceStatus::Unspecified => None,
            InstanceStatus::Up => Some(Self::Healthy),
            InstanceStatus::Down => Some(Self::Unhealthy),
            InstanceStatus::Unknown => Some(Self::Unknown),
        }
    }
}

/// 注册请求中与传输无关的部分
#[derive(Debug, Clone, Default)]
pub struct Registration {
    pub app_name: String,
    pub instance_id: Option<String>,
    pub address: String,
    pub services: Vec<String>,
    pub metadata: HashMap<String, String>,
}

// 实例ID -> 实例
pub type ServiceInstances = Arc<DashMap<String, ServiceInstance>>;

// 服务名 -> 服务实例集合
pub type ServiceRegistry = Arc<DashMap<String, ServiceInstances>>;
