use super::error::RouterError;
use crate::metrics;
use bytes::Bytes;
use http_body_util::combinators::UnsyncBoxBody;
use http_body_util::{BodyExt, Empty, Full};

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 网关统一的响应体类型
pub type GatewayBody = UnsyncBoxBody<Bytes, BoxError>;

pub fn empty_body() -> GatewayBody {
    UnsyncBoxBody::new(Empty::new().map_err(|never| -> BoxError { match never {} }))
}

pub fn full_body(data: impl Into<Bytes>) -> GatewayBody {
    UnsyncBoxBody::new(Full::new(data.into()).map_err(|never| -> BoxError { match never {} }))
}

pub fn is_grpc_request<B>(req: &http::Request<B>) -> bool {
    req.headers()
        .get(http::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/grpc"))
}

// 创建错误响应
pub fn create_error_response(error: &RouterError, grpc: bool) -> http::Response<GatewayBody> {
    let message = error.to_string();
    tracing::warn!(error = %message, grpc, "Creating error response");

    if grpc {
        // gRPC 的 HTTP 状态始终为 200，错误放在 trailers-only 头部
        return tonic::Status::new(error.grpc_code(), message).into_http();
    }

    let built = http::Response::builder()
        .status(error.http_status())
        .header(http::header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(full_body(message));

    match built {
        Ok(response) => response,
        Err(e) => {
            tracing::error!(error = %e, "Failed to create error response");
            let mut response = http::Response::new(empty_body());
            *response.status_mut() = http::StatusCode::INTERNAL_SERVER_ERROR;
            response
        }
    }
}

pub fn text_response(status: http::StatusCode, content_type: &str, body: String) -> http::Response<GatewayBody> {
    let mut response = http::Response::new(full_body(body));
    *response.status_mut() = status;
    if let Ok(value) = http::HeaderValue::from_str(content_type) {
        response.headers_mut().insert(http::header::CONTENT_TYPE, value);
    }
    response
}

/// Prometheus 文本格式的指标响应，网关与注册中心共用
pub fn metrics_response() -> http::Response<GatewayBody> {
    match metrics::gather_metrics() {
        Ok(text) => text_response(http::StatusCode::OK, "text/plain; version=0.0.4", text),
        Err(e) => {
            tracing::error!(error = %e, "Failed to gather metrics");
            text_response(
                http::StatusCode::INTERNAL_SERVER_ERROR,
                "text/plain; charset=utf-8",
                "failed to gather metrics".to_string(),
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grpc_errors_are_trailers_only() {
        let response = create_error_response(&RouterError::ServiceNotFound("svc".into()), true);
        assert_eq!(response.status(), http::StatusCode::OK);
        assert_eq!(response.headers()["grpc-status"], "5");
        assert_eq!(response.headers()["content-type"], "application/grpc");
    }

    #[test]
    fn plain_requests_get_http_status() {
        let response = create_error_response(&RouterError::Timeout("svc".into()), false);
        assert_eq!(response.status(), http::StatusCode::GATEWAY_TIMEOUT);
        assert!(response.headers().get("grpc-status").is_none());
    }

    #[test]
    fn grpc_message_is_percent_encoded() {
        let error = RouterError::ForwardingError("100% é".into());
        let response = create_error_response(&error, true);
        assert_eq!(response.headers()["grpc-status"], "14");

        let raw = response.headers()["grpc-message"].to_str().unwrap();
        assert!(!raw.contains('é'));
        assert!(raw.contains("%25"));

        let status = tonic::Status::from_header_map(response.headers()).unwrap();
        assert_eq!(status.code(), tonic::Code::Unavailable);
        assert_eq!(status.message(), error.to_string());
    }
}
