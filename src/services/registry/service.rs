use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use uuid::Uuid;

use super::error::RegistryError;
use super::types::{
    Registration, ServiceHealthStatus, ServiceInstance, ServiceInstances, ServiceRegistry,
};
use crate::config::SecurityConfig;
use crate::metrics;

/// 服务注册中心
///
/// `registry` 按服务名索引实例，`instance_index` 记录每个实例注册了哪些服务，
/// 心跳与注销都通过实例ID定位。
#[derive(Debug, Clone)]
pub struct DiscoveryRegistry {
    pub registry: ServiceRegistry,
    instance_index: Arc<DashMap<String, Vec<String>>>,
    lease_duration: Duration,
    pub security: SecurityConfig,
}

impl DiscoveryRegistry {
    pub fn new(lease_duration: Duration, security: SecurityConfig) -> Self {
        Self {
            registry: Arc::new(DashMap::new()),
            instance_index: Arc::new(DashMap::new()),
            lease_duration,
            security,
        }
    }

    pub fn lease_duration(&self) -> Duration {
        self.lease_duration
    }

    /// 注册实例，返回实例ID
    pub fn register_instance(&self, registration: Registration) -> Result<String, RegistryError> {
        if registration.address.trim().is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "address must not be empty".into(),
            ));
        }
        let services: Vec<String> = registration
            .services
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        if services.is_empty() {
            return Err(RegistryError::InvalidRegistration(
                "at least one service name is required".into(),
            ));
        }

        let instance_id = registration
            .instance_id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        // 同一实例重复注册时替换旧的服务列表
        self.remove_entries(&instance_id);

        let now = SystemTime::now();
        let instance = ServiceInstance {
            instance_id: instance_id.clone(),
            app_name: registration.app_name,
            address: registration.address,
            metadata: registration.metadata,
            registered_at: now,
            last_heartbeat: now,
            health_status: ServiceHealthStatus::Healthy,
        };

        for service_name in &services {
            tracing::info!(
                service_name = %service_name,
                instance_id = %instance_id,
                address = %instance.address,
                "Registering service instance"
            );
            self.registry
                .entry(service_name.clone())
                .or_default()
                .insert(instance_id.clone(), instance.clone());
        }
        self.instance_index.insert(instance_id.clone(), services);

        metrics::REGISTRY_REGISTRATIONS_TOTAL.inc();
        self.refresh_instance_gauge();
        Ok(instance_id)
    }

    /// 续约，实例不存在时返回 false
    pub fn renew_lease(&self, instance_id: &str, status: Option<ServiceHealthStatus>) -> bool {
        let services = match self.instance_index.get(instance_id) {
            Some(entry) => entry.value().clone(),
            None => return false,
        };

        let now = SystemTime::now();
        let mut renewed = false;
        for service_name in &services {
            let instances = match self.registry.get(service_name) {
                Some(entry) => entry.value().clone(),
                None => continue,
            };
            if let Some(mut instance) = instances.get_mut(instance_id) {
                instance.last_heartbeat = now;
                if let Some(status) = status {
                    if instance.health_status != status {
                        tracing::info!(
                            instance_id = %instance_id,
                            service_name = %service_name,
                            new_status = ?status,
                            "Updated health status for instance"
                        );
                    }
                    instance.health_status = status;
                }
                renewed = true;
            }
        }

        if renewed {
            tracing::debug!(instance_id = %instance_id, "Lease renewed");
        }
        renewed
    }

    pub fn unregister_instance(&self, instance_id: &str) -> bool {
        let removed = self.remove_entries(instance_id);
        if removed {
            tracing::info!(instance_id = %instance_id, "Unregistered instance");
            self.refresh_instance_gauge();
        }
        removed
    }

    /// 查询服务的可用实例（健康且租约未过期）
    pub fn lookup_service(&self, service_name: &str) -> Vec<ServiceInstance> {
        self.lookup_at(service_name, SystemTime::now())
    }

    pub fn lookup_at(&self, service_name: &str, now: SystemTime) -> Vec<ServiceInstance> {
        let instances = match self.registry.get(service_name) {
            Some(entry) => entry.value().clone(),
            None => return Vec::new(),
        };

        let mut live: Vec<ServiceInstance> = instances
            .iter()
            .filter(|entry| {
                let instance = entry.value();
                instance.health_status == ServiceHealthStatus::Healthy
                    && !instance.is_expired(now, self.lease_duration)
            })
            .map(|entry| entry.value().clone())
            .collect();
        // DashMap 迭代顺序不稳定，按注册时间排序便于轮询
        live.sort_by(|a, b| {
            a.registered_at
                .cmp(&b.registered_at)
                .then_with(|| a.instance_id.cmp(&b.instance_id))
        });
        live
    }

    /// 所有服务及其实例（不区分状态）
    pub fn snapshot(&self) -> Vec<(String, Vec<ServiceInstance>)> {
        let mut services: Vec<(String, Vec<ServiceInstance>)> = self
            .registry
            .iter()
            .map(|entry| {
                let instances = entry
                    .value()
                    .iter()
                    .map(|i| i.value().clone())
                    .collect::<Vec<_>>();
                (entry.key().clone(), instances)
            })
            .collect();
        services.sort_by(|a, b| a.0.cmp(&b.0));
        services
    }

    pub fn instance_count(&self) -> usize {
        self.instance_index.len()
    }

    /// 剔除租约过期的实例，返回被剔除的实例数
    pub fn evict_expired(&self, now: SystemTime) -> usize {
        let mut expired: Vec<(String, String)> = Vec::new();

        // 先收集，避免持有 guard 时修改同一个 map
        for entry in self.registry.iter() {
            let service_name = entry.key();
            for instance in entry.value().iter() {
                if instance.is_expired(now, self.lease_duration) {
                    tracing::warn!(
                        service_name = %service_name,
                        instance_id = %instance.instance_id,
                        lease_secs = self.lease_duration.as_secs(),
                        "Instance lease expired, removing from registry"
                    );
                    expired.push((service_name.clone(), instance.instance_id.clone()));
                }
            }
        }

        if expired.is_empty() {
            return 0;
        }

        let mut evicted_ids: Vec<String> = Vec::new();
        for (service_name, instance_id) in &expired {
            let instances: Option<ServiceInstances> =
                self.registry.get(service_name).map(|e| e.value().clone());
            if let Some(instances) = instances {
                let removed = instances
                    .remove_if(instance_id, |_, instance| {
                        instance.is_expired(now, self.lease_duration)
                    })
                    .is_some();
                if removed && !evicted_ids.contains(instance_id) {
                    evicted_ids.push(instance_id.clone());
                }
            }
            self.registry
                .remove_if(service_name, |_, instances| instances.is_empty());
        }

        for instance_id in &evicted_ids {
            self.prune_index(instance_id);
        }

        metrics::REGISTRY_EVICTIONS_TOTAL.inc_by(evicted_ids.len() as u64);
        self.refresh_instance_gauge();
        tracing::info!(evicted = evicted_ids.len(), "Eviction pass completed");
        evicted_ids.len()
    }

    /// 定期剔除过期实例，直到 cancel 被触发
    pub fn spawn_eviction_task(
        &self,
        tracker: &TaskTracker,
        cancel: CancellationToken,
        interval: Duration,
    ) {
        let registry = self.clone();
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        tracing::debug!("Eviction task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        tracing::debug!("Executing instance expiration check...");
                        registry.evict_expired(SystemTime::now());
                    }
                }
            }
        });
    }

    // 删除实例的全部注册项
    fn remove_entries(&self, instance_id: &str) -> bool {
        let Some((_, services)) = self.instance_index.remove(instance_id) else {
            return false;
        };
        for service_name in services {
            let instances = self.registry.get(&service_name).map(|e| e.value().clone());
            if let Some(instances) = instances {
                instances.remove(instance_id);
            }
            self.registry
                .remove_if(&service_name, |_, instances| instances.is_empty());
        }
        true
    }

    // 实例的服务都被剔除后才从索引中移除
    fn prune_index(&self, instance_id: &str) {
        let registry = &self.registry;
        self.instance_index.remove_if(instance_id, |_, services| {
            services.iter().all(|service_name| {
                registry
                    .get(service_name)
                    .map(|instances| !instances.contains_key(instance_id))
                    .unwrap_or(true)
            })
        });
    }

    fn refresh_instance_gauge(&self) {
        metrics::REGISTRY_INSTANCES.set(self.instance_index.len() as i64);
    }
}
