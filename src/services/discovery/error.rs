use tonic::Status;

/// 服务发现错误类型
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("gRPC error: {0}")]
    Grpc(#[from] Status),
    #[error("Instance is not registered")]
    NotRegistered,
    #[error("No live instance for service: {0}")]
    NoInstances(String),
}
