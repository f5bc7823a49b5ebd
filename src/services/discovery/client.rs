use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::Code;
use tonic::transport::{Channel, Endpoint};

use super::config::DiscoveryClientConfig;
use super::error::DiscoveryError;
use crate::registry::{
    HeartbeatRequest, InstanceInfo, InstanceStatus, LookupRequest, RegisterRequest,
    UnregisterRequest, registry_service_client::RegistryServiceClient,
};

/// 注册中心客户端
///
/// 负责本实例的注册、心跳和注销，也可以查询其他服务的实例。
#[derive(Debug, Clone)]
pub struct DiscoveryClient {
    config: DiscoveryClientConfig,
    client: RegistryServiceClient<Channel>,
    instance_id: Arc<RwLock<Option<String>>>,
}

impl DiscoveryClient {
    /// 创建客户端，连接在第一次调用时建立
    pub fn new(config: DiscoveryClientConfig) -> Result<Self, DiscoveryError> {
        let endpoint = Endpoint::from_shared(config.registry_address.clone())?
            .connect_timeout(config.connect_timeout)
            .timeout(config.request_timeout);

        let channel = endpoint.connect_lazy();
        let client = RegistryServiceClient::new(channel);

        Ok(Self {
            config,
            client,
            instance_id: Arc::new(RwLock::new(None)),
        })
    }

    pub fn config(&self) -> &DiscoveryClientConfig {
        &self.config
    }

    pub async fn instance_id(&self) -> Option<String> {
        self.instance_id.read().await.clone()
    }

    /// 注册本实例，重复注册时沿用已分配的实例ID
    pub async fn register(&self) -> Result<String, DiscoveryError> {
        let current_id = self.instance_id().await.unwrap_or_default();
        let request = RegisterRequest {
            app_name: self.config.app_name.clone(),
            instance_id: current_id,
            address: self.config.advertised_address.clone(),
            services: self.config.services.clone(),
            metadata: self.config.metadata.clone(),
            api_key: self.config.api_key.clone(),
        };

        let response = self.client.clone().register(request).await?.into_inner();
        *self.instance_id.write().await = Some(response.instance_id.clone());

        tracing::info!(
            app_name = %self.config.app_name,
            instance_id = %response.instance_id,
            address = %self.config.advertised_address,
            lease_secs = response.lease_seconds,
            "Registered with registry"
        );
        Ok(response.instance_id)
    }

    /// 发送心跳，注册中心不认识本实例时重新注册
    pub async fn heartbeat(&self) -> Result<(), DiscoveryError> {
        let instance_id = self
            .instance_id()
            .await
            .ok_or(DiscoveryError::NotRegistered)?;

        let request = HeartbeatRequest {
            instance_id: instance_id.clone(),
            status: InstanceStatus::Up as i32,
        };

        match self.client.clone().heartbeat(request).await {
            Ok(_) => {
                tracing::debug!(instance_id = %instance_id, "Heartbeat sent");
                Ok(())
            }
            Err(status) if status.code() == Code::NotFound => {
                tracing::warn!(
                    instance_id = %instance_id,
                    "Registry lost this instance, re-registering"
                );
                self.register().await.map(|_| ())
            }
            Err(status) => Err(status.into()),
        }
    }

    pub async fn unregister(&self) -> Result<bool, DiscoveryError> {
        let Some(instance_id) = self.instance_id.write().await.take() else {
            return Ok(false);
        };

        let response = self
            .client
            .clone()
            .unregister(UnregisterRequest {
                instance_id: instance_id.clone(),
            })
            .await?
            .into_inner();

        tracing::info!(
            instance_id = %instance_id,
            success = response.success,
            "Unregistered from registry"
        );
        Ok(response.success)
    }

    pub async fn lookup(&self, service_name: &str) -> Result<Vec<InstanceInfo>, DiscoveryError> {
        let response = self
            .client
            .clone()
            .lookup(LookupRequest {
                service_name: service_name.to_string(),
            })
            .await?
            .into_inner();
        Ok(response.instances)
    }

    /// 注册并定期发送心跳，cancel 触发后注销
    pub fn spawn_heartbeat(&self, tracker: &TaskTracker, cancel: CancellationToken) {
        let client = self.clone();
        let interval = self.config.heartbeat_interval;

        tracker.spawn(async move {
            if let Err(e) = client.register().await {
                tracing::warn!(error = %e, "Initial registration failed, will retry on next heartbeat");
            }

            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let result = match client.instance_id().await {
                            Some(_) => client.heartbeat().await,
                            None => client.register().await.map(|_| ()),
                        };
                        if let Err(e) = result {
                            tracing::warn!(error = %e, "Heartbeat failed");
                        }
                    }
                }
            }

            if let Err(e) = client.unregister().await {
                tracing::warn!(error = %e, "Failed to unregister on shutdown");
            }
        });
    }
}
