use super::error::RouterError;
use super::response::{BoxError, GatewayBody};
use crate::services::client_manager::GrpcClientManager;
use http_body::Body;
use http_body_util::BodyExt;
use http_body_util::combinators::UnsyncBoxBody;
use std::time::Duration;
use tower::util::ServiceExt;

// 逐跳头部不转发；te: trailers 是 gRPC 必需的，保留
const HOP_BY_HOP_HEADERS: [&str; 7] = [
    "connection",
    "keep-alive",
    "proxy-connection",
    "proxy-authenticate",
    "proxy-authorization",
    "transfer-encoding",
    "upgrade",
];

fn is_hop_by_hop(name: &http::HeaderName) -> bool {
    HOP_BY_HOP_HEADERS.contains(&name.as_str())
}

// 转发请求到目标实例，请求体与响应体都以流的方式透传
pub async fn forward_request<B>(
    client_manager: &GrpcClientManager,
    request_timeout: Duration,
    req: http::Request<B>,
    target_addr: &str,
) -> Result<http::Response<GatewayBody>, RouterError>
where
    B: Body<Data = bytes::Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    // 获取或创建客户端连接
    let channel = client_manager
        .get_or_create_client(target_addr)
        .await
        .map_err(|e| RouterError::ForwardingError(format!("Failed to connect to {target_addr}: {e}")))?;

    let (parts, body) = req.into_parts();

    let mut new_req = http::Request::builder()
        .method(parts.method)
        .uri(parts.uri)
        .version(http::Version::HTTP_2);

    for (name, value) in parts.headers.iter() {
        if !is_hop_by_hop(name) {
            new_req = new_req.header(name, value);
        }
    }

    let new_req = new_req
        .body(tonic::body::Body::new(body))
        .map_err(|e| RouterError::ForwardingError(format!("Failed to build request: {e}")))?;

    // 超时只覆盖到收到响应头为止，流式响应体不受限制
    let response = tokio::time::timeout(request_timeout, channel.oneshot(new_req))
        .await
        .map_err(|_| RouterError::Timeout(format!("{target_addr} did not respond in time")))?
        .map_err(|e| RouterError::ForwardingError(format!("Failed to forward request: {e}")))?;

    let (parts, body) = response.into_parts();

    let mut response_builder = http::Response::builder()
        .status(parts.status)
        .version(parts.version);

    for (name, value) in parts.headers.iter() {
        if !is_hop_by_hop(name) {
            response_builder = response_builder.header(name, value);
        }
    }

    // 使用 UnsyncBoxBody 来避免 Sync 约束
    let boxed_body = UnsyncBoxBody::new(body.map_err(|e| -> BoxError { Box::new(e) }));

    response_builder
        .body(boxed_body)
        .map_err(|e| RouterError::ForwardingError(format!("Failed to build response: {e}")))
}
