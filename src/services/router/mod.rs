pub mod error;
pub mod extractor;
pub mod forwarder;
pub mod response;

pub use error::RouterError;
pub use response::GatewayBody;

use super::client_manager::GrpcClientManager;
use super::discovery::{DiscoveryError, ServiceResolver};
use crate::metrics;
use futures::future::BoxFuture;
use http_body::Body;
use response::BoxError;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tower::Service;

// 定义动态路由服务
#[derive(Clone)]
pub struct DynamicRouter {
    resolver: Arc<dyn ServiceResolver>,
    client_manager: GrpcClientManager,
    request_timeout: Duration,
}

impl std::fmt::Debug for DynamicRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DynamicRouter")
            .field("client_manager", &self.client_manager)
            .field("request_timeout", &self.request_timeout)
            .finish_non_exhaustive()
    }
}

impl DynamicRouter {
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        client_manager: GrpcClientManager,
        request_timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            client_manager,
            request_timeout,
        }
    }

    pub fn client_manager(&self) -> &GrpcClientManager {
        &self.client_manager
    }

    async fn route<B>(&self, req: http::Request<B>) -> http::Response<GatewayBody>
    where
        B: Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let path = req.uri().path().to_string();
        let grpc = response::is_grpc_request(&req);

        // 网关自身的端点
        match path.as_str() {
            "/health" => {
                return response::text_response(
                    http::StatusCode::OK,
                    "text/plain; charset=utf-8",
                    "ok".to_string(),
                );
            }
            "/metrics" => return response::metrics_response(),
            _ => {}
        }

        let service_name = match extractor::extract_service_name(&path) {
            Ok(name) => name,
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "Invalid request path");
                return response::create_error_response(&e, grpc);
            }
        };

        let started = Instant::now();
        let result = self.forward(&service_name, &path, req).await;
        let response = match result {
            Ok(response) => response,
            Err(e) => response::create_error_response(&e, grpc),
        };

        let status = response
            .headers()
            .get("grpc-status")
            .and_then(|v| v.to_str().ok())
            .map(|code| format!("grpc-{code}"))
            .unwrap_or_else(|| response.status().as_u16().to_string());
        metrics::record_gateway_request(&service_name, &status, started.elapsed());

        response
    }

    async fn forward<B>(
        &self,
        service_name: &str,
        path: &str,
        req: http::Request<B>,
    ) -> Result<http::Response<GatewayBody>, RouterError>
    where
        B: Body<Data = bytes::Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let target_addr = match self.resolver.resolve(service_name).await {
            Ok(addr) => addr,
            Err(DiscoveryError::NoInstances(_)) => {
                return Err(RouterError::ServiceNotFound(format!(
                    "Service '{service_name}' has no live instance"
                )));
            }
            Err(e) => {
                tracing::error!(service_name = %service_name, error = %e, "Failed to resolve service");
                return Err(RouterError::ServiceUnavailable(format!(
                    "Service '{service_name}' cannot be resolved"
                )));
            }
        };

        tracing::debug!(
            service_name = %service_name,
            path = %path,
            target_addr = %target_addr,
            "Forwarding request"
        );

        match forwarder::forward_request(&self.client_manager, self.request_timeout, req, &target_addr)
            .await
        {
            Ok(response) => Ok(response),
            Err(e) => {
                tracing::error!(
                    service_name = %service_name,
                    target_addr = %target_addr,
                    error = %e,
                    "Failed to forward request"
                );
                // 丢弃失效连接，下次重新解析
                self.client_manager.remove_client(&target_addr).await;
                self.resolver.invalidate(service_name);
                Err(e)
            }
        }
    }
}

impl<B> Service<http::Request<B>> for DynamicRouter
where
    B: Body<Data = bytes::Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    type Response = http::Response<GatewayBody>;
    type Error = std::convert::Infallible;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, req: http::Request<B>) -> Self::Future {
        let router = self.clone();
        Box::pin(async move { Ok(router.route(req).await) })
    }
}
