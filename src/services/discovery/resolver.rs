use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use super::client::DiscoveryClient;
use super::error::DiscoveryError;
use crate::services::registry::DiscoveryRegistry;

/// 实例地址来源
#[tonic::async_trait]
pub trait InstanceSource: Send + Sync + 'static {
    async fn instances(&self, service_name: &str) -> Result<Vec<String>, DiscoveryError>;
}

#[tonic::async_trait]
impl InstanceSource for DiscoveryClient {
    async fn instances(&self, service_name: &str) -> Result<Vec<String>, DiscoveryError> {
        let instances = self.lookup(service_name).await?;
        Ok(instances.into_iter().map(|i| i.address).collect())
    }
}

// 与注册中心同进程时直接读取注册表
#[tonic::async_trait]
impl InstanceSource for DiscoveryRegistry {
    async fn instances(&self, service_name: &str) -> Result<Vec<String>, DiscoveryError> {
        Ok(self
            .lookup_service(service_name)
            .into_iter()
            .map(|i| i.address)
            .collect())
    }
}

/// 服务名 -> 实例地址
#[tonic::async_trait]
pub trait ServiceResolver: Send + Sync + 'static {
    async fn resolve(&self, service_name: &str) -> Result<String, DiscoveryError>;

    /// 转发失败后丢弃缓存，下次解析重新查询
    fn invalidate(&self, service_name: &str);
}

#[derive(Debug, Clone)]
struct CachedEntry {
    addresses: Vec<String>,
    fetched_at: Instant,
}

/// 带 TTL 缓存的解析器，多实例间轮询
pub struct CachedResolver<S> {
    source: S,
    ttl: Duration,
    cache: DashMap<String, CachedEntry>,
    cursor: AtomicUsize,
}

impl<S: InstanceSource> CachedResolver<S> {
    pub fn new(source: S, ttl: Duration) -> Self {
        Self {
            source,
            ttl,
            cache: DashMap::new(),
            cursor: AtomicUsize::new(0),
        }
    }

    pub fn into_shared(self) -> Arc<dyn ServiceResolver> {
        Arc::new(self)
    }

    fn pick(&self, addresses: &[String]) -> Option<String> {
        if addresses.is_empty() {
            return None;
        }
        let index = self.cursor.fetch_add(1, Ordering::Relaxed) % addresses.len();
        addresses.get(index).cloned()
    }

    fn cached(&self, service_name: &str) -> Option<CachedEntry> {
        self.cache.get(service_name).map(|e| e.value().clone())
    }
}

#[tonic::async_trait]
impl<S: InstanceSource> ServiceResolver for CachedResolver<S> {
    async fn resolve(&self, service_name: &str) -> Result<String, DiscoveryError> {
        let cached = self.cached(service_name);
        if let Some(entry) = &cached
            && entry.fetched_at.elapsed() < self.ttl
            && let Some(address) = self.pick(&entry.addresses)
        {
            return Ok(address);
        }

        match self.source.instances(service_name).await {
            Ok(addresses) if addresses.is_empty() => {
                self.cache.remove(service_name);
                Err(DiscoveryError::NoInstances(service_name.to_string()))
            }
            Ok(addresses) => {
                tracing::debug!(
                    service_name = %service_name,
                    instances = addresses.len(),
                    "Refreshed service instances"
                );
                let address = self.pick(&addresses);
                self.cache.insert(
                    service_name.to_string(),
                    CachedEntry {
                        addresses,
                        fetched_at: Instant::now(),
                    },
                );
                address.ok_or_else(|| DiscoveryError::NoInstances(service_name.to_string()))
            }
            Err(e) => {
                // 注册中心不可用时退回到过期的缓存
                if let Some(address) = cached.and_then(|entry| self.pick(&entry.addresses)) {
                    tracing::warn!(
                        service_name = %service_name,
                        error = %e,
                        "Registry lookup failed, using stale instances"
                    );
                    return Ok(address);
                }
                Err(e)
            }
        }
    }

    fn invalidate(&self, service_name: &str) {
        if self.cache.remove(service_name).is_some() {
            tracing::debug!(service_name = %service_name, "Invalidated resolver cache");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct FixedSource {
        addresses: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(addresses: &[&str]) -> Self {
            Self {
                addresses: Mutex::new(addresses.iter().map(|a| a.to_string()).collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[tonic::async_trait]
    impl InstanceSource for Arc<FixedSource> {
        async fn instances(&self, _service_name: &str) -> Result<Vec<String>, DiscoveryError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.addresses.lock().unwrap().clone())
        }
    }

    #[tokio::test]
    async fn round_robins_over_cached_instances() {
        let source = Arc::new(FixedSource::new(&["http://a", "http://b"]));
        let resolver = CachedResolver::new(source.clone(), Duration::from_secs(60));

        let first = resolver.resolve("svc.One").await.unwrap();
        let second = resolver.resolve("svc.One").await.unwrap();
        let third = resolver.resolve("svc.One").await.unwrap();

        assert_ne!(first, second);
        assert_eq!(first, third);
        assert_eq!(source.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalidate_forces_refresh() {
        let source = Arc::new(FixedSource::new(&["http://a"]));
        let resolver = CachedResolver::new(source.clone(), Duration::from_secs(60));

        resolver.resolve("svc.One").await.unwrap();
        *source.addresses.lock().unwrap() = vec!["http://c".to_string()];
        resolver.invalidate("svc.One");

        assert_eq!(resolver.resolve("svc.One").await.unwrap(), "http://c");
        assert_eq!(source.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn empty_lookup_is_no_instances() {
        let source = Arc::new(FixedSource::new(&[]));
        let resolver = CachedResolver::new(source, Duration::from_secs(60));

        let err = resolver.resolve("svc.Missing").await.unwrap_err();
        assert!(matches!(err, DiscoveryError::NoInstances(name) if name == "svc.Missing"));
    }

    #[tokio::test]
    async fn resolves_from_in_process_registry() {
        use crate::config::SecurityConfig;
        use crate::services::registry::Registration;

        let registry = DiscoveryRegistry::new(Duration::from_secs(90), SecurityConfig::default());
        registry
            .register_instance(Registration {
                app_name: "user-service".into(),
                address: "http://127.0.0.1:8081".into(),
                services: vec!["user.UserService".into()],
                ..Default::default()
            })
            .unwrap();

        let resolver = CachedResolver::new(registry, Duration::from_secs(5)).into_shared();
        assert_eq!(
            resolver.resolve("user.UserService").await.unwrap(),
            "http://127.0.0.1:8081"
        );
        assert!(resolver.resolve("expense.ExpenseService").await.is_err());
    }
}
