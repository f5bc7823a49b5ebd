use std::sync::Arc;

use super::model::{NewUser, Role};
use super::service::UserManager;
use crate::auth::{JwtManager, PasswordHasher};
use crate::error::{ServiceError, ServiceResult};

pub const SUCCESS_MESSAGE: &str = "success";

#[derive(Debug, Clone)]
pub struct SignupForm {
    pub full_name: String,
    pub username: String,
    pub password: String,
}

/// 注册与登录
#[derive(Clone)]
pub struct Authenticator {
    users: UserManager,
    hasher: PasswordHasher,
    jwt: Arc<JwtManager>,
}

impl Authenticator {
    pub fn new(users: UserManager, hasher: PasswordHasher, jwt: Arc<JwtManager>) -> Self {
        Self { users, hasher, jwt }
    }

    /// 注册成功后直接登录并返回 token
    pub async fn signup(&self, form: SignupForm) -> ServiceResult<String> {
        if form.password.trim().is_empty() {
            return Err(ServiceError::BusinessRule("Password is required".into()));
        }
        if self.users.exists(form.username.trim()).await? {
            return Err(ServiceError::AlreadyExists(
                "Username is already taken.".into(),
            ));
        }

        let user = NewUser {
            full_name: form.full_name,
            username: form.username.trim().to_string(),
            password: self.hasher.hash(&form.password).await?,
            role: Role::User,
        };
        let saved = self.users.save_user(user).await.map_err(|e| match e {
            // 并发注册同名用户时由存储层兜底
            ServiceError::AlreadyExists(_) => {
                ServiceError::AlreadyExists("Username is already taken.".into())
            }
            other => other,
        })?;

        self.login(&saved.username, &form.password).await
    }

    pub async fn login(&self, username: &str, password: &str) -> ServiceResult<String> {
        let invalid = || ServiceError::Unauthenticated("Invalid username or password.".into());

        let user = match self.users.find_by_username(username).await {
            Ok(user) => user,
            Err(ServiceError::NotFound(_)) | Err(ServiceError::BusinessRule(_)) => {
                return Err(invalid());
            }
            Err(e) => return Err(e),
        };

        if !self.hasher.verify(password, &user.password).await? {
            tracing::warn!(username = %username, "Login failed: bad credentials");
            return Err(invalid());
        }

        tracing::info!(username = %user.username, "User logged in");
        self.jwt.generate_token(&user.username, user.role)
    }
}
