//! 用户服务：用户查询、注册登录与管理接口

pub mod auth_service;
pub mod grpc_impl;
pub mod model;
pub mod repository;
pub mod service;

pub use auth_service::{Authenticator, SignupForm};
pub use grpc_impl::AdminApi;
pub use model::{AppUser, NewUser, Role};
pub use repository::{InMemoryUserRepository, PgUserRepository, UserRepository};
pub use service::UserManager;

/// 注册到注册中心的 gRPC 服务全名
pub const USER_SERVICE_NAME: &str = "user.UserService";
pub const AUTH_SERVICE_NAME: &str = "user.AuthService";
pub const ADMIN_SERVICE_NAME: &str = "user.AdminService";
