// 定义路由错误类型
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Service not found: {0}")]
    ServiceNotFound(String),
    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("Invalid path: {0}")]
    InvalidPath(String),
    #[error("Forwarding error: {0}")]
    ForwardingError(String),
    #[error("Upstream timeout: {0}")]
    Timeout(String),
}

impl RouterError {
    /// gRPC 状态码
    pub fn grpc_code(&self) -> tonic::Code {
        match self {
            RouterError::ServiceNotFound(_) => tonic::Code::NotFound,
            RouterError::ServiceUnavailable(_) => tonic::Code::Unavailable,
            RouterError::InvalidPath(_) => tonic::Code::InvalidArgument,
            RouterError::ForwardingError(_) => tonic::Code::Unavailable,
            RouterError::Timeout(_) => tonic::Code::DeadlineExceeded,
        }
    }

    /// 非 gRPC 请求使用的 HTTP 状态码
    pub fn http_status(&self) -> http::StatusCode {
        match self {
            RouterError::ServiceNotFound(_) => http::StatusCode::NOT_FOUND,
            RouterError::ServiceUnavailable(_) => http::StatusCode::SERVICE_UNAVAILABLE,
            RouterError::InvalidPath(_) => http::StatusCode::BAD_REQUEST,
            RouterError::ForwardingError(_) => http::StatusCode::SERVICE_UNAVAILABLE,
            RouterError::Timeout(_) => http::StatusCode::GATEWAY_TIMEOUT,
        }
    }
}
