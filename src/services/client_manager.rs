use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::transport::{Channel, Endpoint};

use crate::config::ConnectionPoolSettings;

/// 连接池配置
#[derive(Debug, Clone)]
pub struct ConnectionPoolConfig {
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
    pub cleanup_interval: Duration,
}

impl Default for ConnectionPoolConfig {
    fn default() -> Self {
        Self::from(&ConnectionPoolSettings::default())
    }
}

impl From<&ConnectionPoolSettings> for ConnectionPoolConfig {
    fn from(settings: &ConnectionPoolSettings) -> Self {
        Self {
            connect_timeout: Duration::from_secs(settings.connect_timeout),
            idle_timeout: Duration::from_secs(settings.idle_timeout),
            cleanup_interval: Duration::from_secs(settings.cleanup_interval),
        }
    }
}

#[derive(Debug, Clone)]
struct PooledChannel {
    channel: Channel,
    last_used: Instant,
}

type ClientPool = Arc<RwLock<HashMap<String, PooledChannel>>>;

#[derive(Debug, Clone)]
pub struct GrpcClientManager {
    clients: ClientPool,
    config: ConnectionPoolConfig,
}

impl Default for GrpcClientManager {
    fn default() -> Self {
        Self::new(ConnectionPoolConfig::default())
    }
}

impl GrpcClientManager {
    pub fn new(config: ConnectionPoolConfig) -> Self {
        Self {
            clients: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    pub async fn get_or_create_client(
        &self,
        address: &str,
    ) -> Result<Channel, tonic::transport::Error> {
        // 先尝试从缓存获取客户端
        {
            let mut clients = self.clients.write().await;
            if let Some(pooled) = clients.get_mut(address) {
                pooled.last_used = Instant::now();
                return Ok(pooled.channel.clone());
            }
        }

        // 缓存中没有，创建新的客户端连接
        let channel = Endpoint::from_shared(address.to_string())?
            .connect_timeout(self.config.connect_timeout)
            .connect()
            .await?;

        // 并发创建时保留先写入的连接
        let mut clients = self.clients.write().await;
        let pooled = clients
            .entry(address.to_string())
            .or_insert_with(|| PooledChannel {
                channel,
                last_used: Instant::now(),
            });

        tracing::info!(address = %address, "Created new gRPC client connection");
        Ok(pooled.channel.clone())
    }

    pub async fn remove_client(&self, address: &str) {
        let mut clients = self.clients.write().await;
        if clients.remove(address).is_some() {
            tracing::info!(address = %address, "Removed gRPC client connection");
        }
    }

    pub async fn len(&self) -> usize {
        self.clients.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.clients.read().await.is_empty()
    }

    /// 移除空闲超过 idle_timeout 的连接
    pub async fn cleanup_idle(&self) -> usize {
        let idle_timeout = self.config.idle_timeout;
        let mut clients = self.clients.write().await;
        let before = clients.len();
        clients.retain(|address, pooled| {
            let keep = pooled.last_used.elapsed() < idle_timeout;
            if !keep {
                tracing::debug!(address = %address, "Dropping idle gRPC client connection");
            }
            keep
        });
        before - clients.len()
    }

    pub async fn clear_all(&self) {
        let mut clients = self.clients.write().await;
        let count = clients.len();
        clients.clear();
        tracing::info!(count, "Cleared gRPC client connections");
    }

    pub fn spawn_cleanup_task(&self, tracker: &TaskTracker, cancel: CancellationToken) {
        let manager = self.clone();
        let interval = self.config.cleanup_interval;
        tracker.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let removed = manager.cleanup_idle().await;
                        if removed > 0 {
                            tracing::info!(removed, "Idle connection cleanup completed");
                        }
                    }
                }
            }
            manager.clear_all().await;
        });
    }
}
