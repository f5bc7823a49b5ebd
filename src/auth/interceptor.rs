use std::sync::Arc;
use tonic::service::Interceptor;
use tonic::{Request, Status};

use super::jwt::JwtManager;
use crate::services::users::model::Role;

/// 已认证的调用方，由拦截器写入请求扩展
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub username: String,
    pub role: Role,
}

impl AuthenticatedUser {
    pub fn from_request<T>(request: &Request<T>) -> Result<Self, Status> {
        request
            .extensions()
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| Status::unauthenticated("Full authentication is required"))
    }

    pub fn require_role(&self, role: Role) -> Result<(), Status> {
        if self.role == role {
            Ok(())
        } else {
            tracing::warn!(username = %self.username, required = role.as_str(), "Access denied");
            Err(Status::permission_denied("Access is denied"))
        }
    }
}

/// 校验 `authorization: Bearer <token>` 的 tonic 拦截器
#[derive(Debug, Clone)]
pub struct AuthInterceptor {
    jwt: Arc<JwtManager>,
}

impl AuthInterceptor {
    pub fn new(jwt: Arc<JwtManager>) -> Self {
        Self { jwt }
    }
}

impl Interceptor for AuthInterceptor {
    fn call(&mut self, mut request: Request<()>) -> Result<Request<()>, Status> {
        let token = request
            .metadata()
            .get("authorization")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| Status::unauthenticated("Missing bearer token"))?;

        let claims = self
            .jwt
            .validate_token(token)
            .map_err(|_| Status::unauthenticated("Invalid or expired token"))?;

        let role = Role::parse(&claims.role)
            .ok_or_else(|| Status::unauthenticated("Invalid or expired token"))?;

        request.extensions_mut().insert(AuthenticatedUser {
            username: claims.sub,
            role,
        });
        Ok(request)
    }
}

/// 给出站请求附加 bearer token
pub fn attach_bearer<T>(request: &mut Request<T>, token: &str) -> Result<(), Status> {
    let value = format!("Bearer {token}")
        .parse()
        .map_err(|_| Status::invalid_argument("Invalid token"))?;
    request.metadata_mut().insert("authorization", value);
    Ok(())
}
