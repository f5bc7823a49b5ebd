use std::sync::Arc;
use std::time::Duration;
use tonic::Code;

use crate::error::{ServiceError, ServiceResult};
use crate::services::client_manager::GrpcClientManager;
use crate::services::discovery::ServiceResolver;
use crate::services::users::{USER_SERVICE_NAME, UserManager};
use crate::user::{GetUserByUsernameRequest, user_service_client::UserServiceClient};

const USER_SERVICE: &str = "user-service";

/// 支出服务所需的用户信息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryUser {
    pub id: i64,
    pub username: String,
}

/// 按用户名查找用户，找不到时返回 None
#[tonic::async_trait]
pub trait UserDirectory: Send + Sync + 'static {
    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<DirectoryUser>>;
}

/// 通过注册中心找到 user-service 并调用其 gRPC 接口
#[derive(Clone)]
pub struct RemoteUserDirectory {
    resolver: Arc<dyn ServiceResolver>,
    client_manager: GrpcClientManager,
    timeout: Duration,
}

impl RemoteUserDirectory {
    pub fn new(
        resolver: Arc<dyn ServiceResolver>,
        client_manager: GrpcClientManager,
        timeout: Duration,
    ) -> Self {
        Self {
            resolver,
            client_manager,
            timeout,
        }
    }
}

// 调用方错误（类似 HTTP 4xx）视为用户不存在
fn is_client_error(code: Code) -> bool {
    matches!(
        code,
        Code::NotFound
            | Code::InvalidArgument
            | Code::AlreadyExists
            | Code::PermissionDenied
            | Code::Unauthenticated
            | Code::FailedPrecondition
            | Code::OutOfRange
    )
}

#[tonic::async_trait]
impl UserDirectory for RemoteUserDirectory {
    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<DirectoryUser>> {
        let address = self.resolver.resolve(USER_SERVICE_NAME).await.map_err(|e| {
            tracing::error!(username = %username, error = %e, "Failed to resolve user service");
            ServiceError::external(USER_SERVICE, format!("Communication error: {e}"))
        })?;

        let channel = match self.client_manager.get_or_create_client(&address).await {
            Ok(channel) => channel,
            Err(e) => {
                tracing::error!(address = %address, error = %e, "Failed to connect to user service");
                self.resolver.invalidate(USER_SERVICE_NAME);
                return Err(ServiceError::external(
                    USER_SERVICE,
                    format!("Communication error: {e}"),
                ));
            }
        };

        let mut request = tonic::Request::new(GetUserByUsernameRequest {
            username: username.to_string(),
        });
        request.set_timeout(self.timeout);

        match UserServiceClient::new(channel).get_user_by_username(request).await {
            Ok(response) => {
                let user = response.into_inner();
                tracing::debug!(username = %username, user_id = user.id, "Found user");
                Ok(Some(DirectoryUser {
                    id: user.id,
                    username: user.username,
                }))
            }
            Err(status) if is_client_error(status.code()) => {
                tracing::warn!(
                    username = %username,
                    code = ?status.code(),
                    message = %status.message(),
                    "User service rejected lookup"
                );
                Ok(None)
            }
            Err(status) => {
                tracing::error!(
                    username = %username,
                    code = ?status.code(),
                    message = %status.message(),
                    "User service returned error"
                );
                if status.code() == Code::Unavailable {
                    self.client_manager.remove_client(&address).await;
                    self.resolver.invalidate(USER_SERVICE_NAME);
                }
                Err(ServiceError::external(
                    USER_SERVICE,
                    format!("Failed to get user: {}", status.message()),
                ))
            }
        }
    }
}

/// 与用户服务同进程时直接查询
#[derive(Clone)]
pub struct LocalUserDirectory {
    users: UserManager,
}

impl LocalUserDirectory {
    pub fn new(users: UserManager) -> Self {
        Self { users }
    }
}

#[tonic::async_trait]
impl UserDirectory for LocalUserDirectory {
    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<DirectoryUser>> {
        match self.users.find_by_username(username).await {
            Ok(user) => Ok(Some(DirectoryUser {
                id: user.id,
                username: user.username,
            })),
            Err(ServiceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
