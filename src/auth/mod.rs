//! 认证：JWT、请求拦截器与密码哈希

pub mod interceptor;
pub mod jwt;
pub mod password;

pub use interceptor::{AuthInterceptor, AuthenticatedUser, attach_bearer};
pub use jwt::{Claims, JwtManager};
pub use password::PasswordHasher;
