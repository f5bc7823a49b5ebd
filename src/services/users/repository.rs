use sqlx::{FromRow, PgPool};
use std::collections::BTreeMap;
use tokio::sync::RwLock;

use super::model::{AppUser, NewUser, Role};
use crate::error::{ServiceError, ServiceResult};

/// 用户存储
#[tonic::async_trait]
pub trait UserRepository: Send + Sync + 'static {
    /// 用户名已存在时返回 AlreadyExists
    async fn save(&self, user: NewUser) -> ServiceResult<AppUser>;
    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<AppUser>>;
    /// 用户名不区分大小写
    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<AppUser>>;
    async fn find_all(&self) -> ServiceResult<Vec<AppUser>>;
    async fn count(&self) -> ServiceResult<i64>;
}

#[derive(Debug, FromRow)]
struct UserRow {
    id: i64,
    full_name: String,
    username: String,
    password: String,
    role: String,
}

impl TryFrom<UserRow> for AppUser {
    type Error = ServiceError;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        let role = Role::parse(&row.role)
            .ok_or_else(|| ServiceError::Internal(format!("Unknown role in database: {}", row.role)))?;
        Ok(AppUser {
            id: row.id,
            full_name: row.full_name,
            username: row.username,
            password: row.password,
            role,
        })
    }
}

/// PostgreSQL 实现
#[derive(Debug, Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const UNIQUE_VIOLATION: &str = "23505";

#[tonic::async_trait]
impl UserRepository for PgUserRepository {
    async fn save(&self, user: NewUser) -> ServiceResult<AppUser> {
        let result = sqlx::query_as::<_, UserRow>(
            r#"
            INSERT INTO users (full_name, username, password, role)
            VALUES ($1, $2, $3, $4)
            RETURNING id, full_name, username, password, role
            "#,
        )
        .bind(&user.full_name)
        .bind(&user.username)
        .bind(&user.password)
        .bind(user.role.as_str())
        .fetch_one(&self.pool)
        .await;

        match result {
            Ok(row) => row.try_into(),
            Err(sqlx::Error::Database(db_err))
                if db_err.code().as_deref() == Some(UNIQUE_VIOLATION) =>
            {
                Err(ServiceError::AlreadyExists(format!(
                    "Username already existed: {}",
                    user.username
                )))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<AppUser>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, full_name, username, password, role FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AppUser::try_from).transpose()
    }

    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<AppUser>> {
        let row = sqlx::query_as::<_, UserRow>(
            "SELECT id, full_name, username, password, role FROM users WHERE LOWER(username) = LOWER($1)",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.map(AppUser::try_from).transpose()
    }

    async fn find_all(&self) -> ServiceResult<Vec<AppUser>> {
        let rows = sqlx::query_as::<_, UserRow>(
            "SELECT id, full_name, username, password, role FROM users ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(AppUser::try_from).collect()
    }

    async fn count(&self) -> ServiceResult<i64> {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.0)
    }
}

#[derive(Debug, Default)]
struct MemoryUsers {
    next_id: i64,
    users: BTreeMap<i64, AppUser>,
}

/// 内存实现，未配置数据库时与测试中使用
#[derive(Debug, Default)]
pub struct InMemoryUserRepository {
    inner: RwLock<MemoryUsers>,
}

impl InMemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[tonic::async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn save(&self, user: NewUser) -> ServiceResult<AppUser> {
        let mut inner = self.inner.write().await;
        if inner
            .users
            .values()
            .any(|u| u.username.eq_ignore_ascii_case(&user.username))
        {
            return Err(ServiceError::AlreadyExists(format!(
                "Username already existed: {}",
                user.username
            )));
        }

        inner.next_id += 1;
        let saved = AppUser {
            id: inner.next_id,
            full_name: user.full_name,
            username: user.username,
            password: user.password,
            role: user.role,
        };
        inner.users.insert(saved.id, saved.clone());
        Ok(saved)
    }

    async fn find_by_id(&self, id: i64) -> ServiceResult<Option<AppUser>> {
        Ok(self.inner.read().await.users.get(&id).cloned())
    }

    async fn find_by_username(&self, username: &str) -> ServiceResult<Option<AppUser>> {
        Ok(self
            .inner
            .read()
            .await
            .users
            .values()
            .find(|u| u.username.eq_ignore_ascii_case(username))
            .cloned())
    }

    async fn find_all(&self) -> ServiceResult<Vec<AppUser>> {
        Ok(self.inner.read().await.users.values().cloned().collect())
    }

    async fn count(&self) -> ServiceResult<i64> {
        Ok(self.inner.read().await.users.len() as i64)
    }
}
