use tonic::{Request, Response, Status};

use super::error::RegistryError;
use super::service::DiscoveryRegistry;
use super::types::{Registration, ServiceHealthStatus};
use crate::registry::{
    HeartbeatRequest, HeartbeatResponse, InstanceStatus, ListServicesRequest,
    ListServicesResponse, LookupRequest, LookupResponse, RegisterRequest, RegisterResponse,
    ServiceEntry, UnregisterRequest, UnregisterResponse, registry_service_server::RegistryService,
};

// 为注册中心实现 gRPC 服务 trait
#[tonic::async_trait]
impl RegistryService for DiscoveryRegistry {
    async fn register(
        &self,
        request: Request<RegisterRequest>,
    ) -> Result<Response<RegisterResponse>, Status> {
        let req = request.into_inner();

        // 验证 Token
        if !self.security.validate_token(&req.api_key) {
            tracing::warn!(app_name = %req.app_name, "Registration rejected: invalid token");
            return Err(RegistryError::InvalidToken.into());
        }

        let registration = Registration {
            app_name: req.app_name,
            instance_id: Some(req.instance_id),
            address: req.address,
            services: req.services,
            metadata: req.metadata,
        };
        let instance_id = self.register_instance(registration)?;

        Ok(Response::new(RegisterResponse {
            success: true,
            message: "Registration successful".into(),
            instance_id,
            lease_seconds: self.lease_duration().as_secs(),
        }))
    }

    async fn heartbeat(
        &self,
        request: Request<HeartbeatRequest>,
    ) -> Result<Response<HeartbeatResponse>, Status> {
        let req = request.into_inner();
        let status = InstanceStatus::try_from(req.status)
            .ok()
            .and_then(ServiceHealthStatus::from_wire);

        if !self.renew_lease(&req.instance_id, status) {
            return Err(RegistryError::UnknownInstance(req.instance_id).into());
        }
        Ok(Response::new(HeartbeatResponse { success: true }))
    }

    async fn unregister(
        &self,
        request: Request<UnregisterRequest>,
    ) -> Result<Response<UnregisterResponse>, Status> {
        let req = request.into_inner();
        let success = self.unregister_instance(&req.instance_id);
        Ok(Response::new(UnregisterResponse { success }))
    }

    async fn lookup(
        &self,
        request: Request<LookupRequest>,
    ) -> Result<Response<LookupResponse>, Status> {
        let req = request.into_inner();
        let instances = self
            .lookup_service(&req.service_name)
            .iter()
            .map(|instance| instance.to_info())
            .collect();

        Ok(Response::new(LookupResponse {
            service_name: req.service_name,
            instances,
        }))
    }

    async fn list_services(
        &self,
        _request: Request<ListServicesRequest>,
    ) -> Result<Response<ListServicesResponse>, Status> {
        let services = self
            .snapshot()
            .into_iter()
            .map(|(service_name, instances)| ServiceEntry {
                service_name,
                instances: instances.iter().map(|i| i.to_info()).collect(),
            })
            .collect();

        Ok(Response::new(ListServicesResponse { services }))
    }
}
