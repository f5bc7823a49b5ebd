use std::sync::Arc;

use super::model::{AppUser, NewUser, Role};
use super::repository::UserRepository;
use crate::auth::PasswordHasher;
use crate::error::{ServiceError, ServiceResult};

/// 用户管理
#[derive(Clone)]
pub struct UserManager {
    repository: Arc<dyn UserRepository>,
}

impl UserManager {
    pub fn new(repository: Arc<dyn UserRepository>) -> Self {
        Self { repository }
    }

    /// 保存用户，password 需要已经是哈希值
    pub async fn save_user(&self, user: NewUser) -> ServiceResult<AppUser> {
        tracing::debug!(username = %user.username, "Attempting to save user");
        validate_user(&user)?;

        let username = user.username.clone();
        match self.repository.save(user).await {
            Ok(saved) => {
                tracing::info!(user_id = saved.id, username = %saved.username, "Saved user");
                Ok(saved)
            }
            Err(e @ ServiceError::AlreadyExists(_)) => {
                tracing::warn!(username = %username, "Username already existed");
                Err(e)
            }
            Err(e) => {
                tracing::error!(username = %username, error = %e, "Failed to save user");
                Err(e)
            }
        }
    }

    pub async fn find_by_username(&self, username: &str) -> ServiceResult<AppUser> {
        if username.trim().is_empty() {
            return Err(ServiceError::BusinessRule(
                "Username cannot be null or empty".into(),
            ));
        }

        match self.repository.find_by_username(username.trim()).await? {
            Some(user) => {
                tracing::debug!(username = %username, "Found user");
                Ok(user)
            }
            None => {
                tracing::warn!(username = %username, "User not found");
                Err(ServiceError::not_found("User", "username", username))
            }
        }
    }

    pub async fn find_by_id(&self, id: i64) -> ServiceResult<AppUser> {
        if id <= 0 {
            return Err(ServiceError::BusinessRule(
                "User Id must be a positive number".into(),
            ));
        }

        self.repository
            .find_by_id(id)
            .await?
            .ok_or_else(|| {
                tracing::warn!(user_id = id, "User not found");
                ServiceError::not_found("User", "id", id)
            })
    }

    pub async fn exists(&self, username: &str) -> ServiceResult<bool> {
        Ok(self.repository.find_by_username(username).await?.is_some())
    }

    pub async fn list_users(&self) -> ServiceResult<Vec<AppUser>> {
        self.repository.find_all().await
    }

    /// 用户表为空时写入默认账号
    pub async fn seed_default_users(&self, hasher: &PasswordHasher) -> ServiceResult<()> {
        if self.repository.count().await? > 0 {
            return Ok(());
        }

        let defaults = [
            ("admin", "admin", "admin123", Role::Admin),
            ("phuong", "phuong", "phuong123", Role::User),
        ];
        for (full_name, username, password, role) in defaults {
            let user = NewUser {
                full_name: full_name.to_string(),
                username: username.to_string(),
                password: hasher.hash(password).await?,
                role,
            };
            self.save_user(user).await?;
            tracing::info!(username, role = role.as_str(), "Seeded default user");
        }
        Ok(())
    }
}

fn validate_user(user: &NewUser) -> ServiceResult<()> {
    if user.username.trim().is_empty() {
        return Err(ServiceError::BusinessRule("Username is required".into()));
    }
    if user.password.trim().is_empty() {
        return Err(ServiceError::BusinessRule("Password is required".into()));
    }
    if user.full_name.trim().is_empty() {
        return Err(ServiceError::BusinessRule("Full name is required".into()));
    }
    Ok(())
}
