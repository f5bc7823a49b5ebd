//! 各进程的启动与优雅退出

use axum::routing::get;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_stream::wrappers::TcpListenerStream;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tonic::service::Routes;
use tonic::transport::Server;

use crate::auth::{AuthInterceptor, JwtManager, PasswordHasher};
use crate::config::Config;
use crate::database;
use crate::metrics;
use crate::error::ServiceError;
use crate::expense::expense_service_server::ExpenseServiceServer;
use crate::registry::registry_service_server::RegistryServiceServer;
use crate::services::client_manager::{ConnectionPoolConfig, GrpcClientManager};
use crate::services::discovery::{
    CachedResolver, DiscoveryClient, DiscoveryClientConfig, DiscoveryError, ServiceResolver,
};
use crate::services::expenses::{
    EXPENSE_SERVICE_NAME, ExpenseManager, ExpenseRepository, InMemoryExpenseRepository,
    PgExpenseRepository, RemoteUserDirectory, spawn_report_scheduler,
};
use crate::services::registry::DiscoveryRegistry;
use crate::services::router::DynamicRouter;
use crate::services::router::response::metrics_response;
use crate::services::users::{
    ADMIN_SERVICE_NAME, AUTH_SERVICE_NAME, AdminApi, Authenticator, InMemoryUserRepository,
    PgUserRepository, USER_SERVICE_NAME, UserManager, UserRepository,
};
use crate::user::{
    admin_service_server::AdminServiceServer, auth_service_server::AuthServiceServer,
    user_service_server::UserServiceServer,
};

pub const REGISTRY_ADDRESS: &str = "0.0.0.0:8761";
pub const GATEWAY_ADDRESS: &str = "0.0.0.0:8080";
pub const USER_SERVICE_ADDRESS: &str = "0.0.0.0:8081";
pub const EXPENSE_SERVICE_ADDRESS: &str = "0.0.0.0:8082";

pub const USER_APP_NAME: &str = "user-service";
pub const EXPENSE_APP_NAME: &str = "expense-service";

/// 启动错误
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("Failed to bind listener: {0}")]
    Io(#[from] std::io::Error),
    #[error("Transport error: {0}")]
    Transport(#[from] tonic::transport::Error),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("Discovery error: {0}")]
    Discovery(#[from] DiscoveryError),
    #[error("Service error: {0}")]
    Service(#[from] ServiceError),
}

/// Ctrl-C 或 SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("Shutdown signal received");
}

async fn bind(config: &Config, default: &str) -> Result<TcpListener, ServerError> {
    let address = config.bind_address_or(default);
    Ok(TcpListener::bind(&address).await?)
}

// 停止后台任务并等待其退出
async fn stop_background(tracker: TaskTracker, cancel: CancellationToken) {
    cancel.cancel();
    tracker.close();
    tracker.wait().await;
}

/// 未配置时以监听地址推导，0.0.0.0 换成回环地址
pub fn advertised_address(config: &Config, local_addr: SocketAddr) -> String {
    if let Some(address) = &config.discovery.advertised_address {
        return address.clone();
    }
    let ip = if local_addr.ip().is_unspecified() {
        std::net::IpAddr::from([127, 0, 0, 1])
    } else {
        local_addr.ip()
    };
    format!("http://{}", SocketAddr::new(ip, local_addr.port()))
}

fn remote_resolver(config: &Config, app_name: &str) -> Result<Arc<dyn ServiceResolver>, ServerError> {
    let client_config = DiscoveryClientConfig::from_config(config, app_name, String::new(), Vec::new());
    let client = DiscoveryClient::new(client_config)?;
    let ttl = std::time::Duration::from_secs(config.discovery.cache_ttl);
    Ok(CachedResolver::new(client, ttl).into_shared())
}

async fn connect_database(config: &Config) -> Result<Option<sqlx::PgPool>, ServerError> {
    let Some(url) = config.database.url.as_deref().filter(|u| !u.trim().is_empty()) else {
        tracing::warn!("No database url configured, using in-memory storage");
        return Ok(None);
    };
    let pool = database::create_pool(&config.database, url).await?;
    database::run_migrations(&pool).await?;
    Ok(Some(pool))
}

pub async fn run_registry(config: Config) -> Result<(), ServerError> {
    let listener = bind(&config, REGISTRY_ADDRESS).await?;
    serve_registry(&config, listener, shutdown_signal()).await
}

pub async fn serve_registry<F>(
    config: &Config,
    listener: TcpListener,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();

    let registry = DiscoveryRegistry::new(config.lease_duration(), config.security.clone());
    registry.spawn_eviction_task(&tracker, cancel.clone(), config.eviction_interval());
    metrics::init_registry_metrics();

    // HTTP/1.1 上的 /metrics 与 gRPC 注册接口共用一个端口
    let app = axum::Router::new().route("/metrics", get(|| async { metrics_response() }));
    let routes = Routes::from(app).add_service(RegistryServiceServer::new(registry));

    tracing::info!(
        address = %listener.local_addr()?,
        lease_seconds = config.registry.lease_duration,
        "Registry server listening"
    );

    let result = Server::builder()
        .accept_http1(true)
        .add_routes(routes)
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await;

    stop_background(tracker, cancel).await;
    tracing::info!("Registry server stopped");
    Ok(result?)
}

pub async fn run_gateway(config: Config) -> Result<(), ServerError> {
    let listener = bind(&config, GATEWAY_ADDRESS).await?;
    let resolver = remote_resolver(&config, "gateway")?;
    serve_gateway(&config, listener, resolver, shutdown_signal()).await
}

/// 网关同时接受 HTTP/1.1（健康检查、指标）与 HTTP/2（gRPC 转发）
pub async fn serve_gateway<F>(
    config: &Config,
    listener: TcpListener,
    resolver: Arc<dyn ServiceResolver>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();

    let client_manager =
        GrpcClientManager::new(ConnectionPoolConfig::from(&config.gateway.connection_pool));
    client_manager.spawn_cleanup_task(&tracker, cancel.clone());

    let router = DynamicRouter::new(resolver, client_manager.clone(), config.request_timeout());
    let app = axum::Router::new().fallback_service(router);

    tracing::info!(
        address = %listener.local_addr()?,
        registry = %config.discovery.registry_address,
        "Gateway server listening"
    );

    let result = Server::builder()
        .accept_http1(true)
        .add_routes(Routes::from(app))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await;

    stop_background(tracker, cancel).await;
    client_manager.clear_all().await;
    tracing::info!("Gateway server stopped");
    Ok(result?)
}

pub async fn run_user_service(config: Config) -> Result<(), ServerError> {
    let listener = bind(&config, USER_SERVICE_ADDRESS).await?;
    let repository: Arc<dyn UserRepository> = match connect_database(&config).await? {
        Some(pool) => Arc::new(PgUserRepository::new(pool)),
        None => Arc::new(InMemoryUserRepository::new()),
    };
    serve_user_service(&config, listener, repository, shutdown_signal()).await
}

pub async fn serve_user_service<F>(
    config: &Config,
    listener: TcpListener,
    repository: Arc<dyn UserRepository>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let local_addr = listener.local_addr()?;

    let users = UserManager::new(repository);
    let hasher = PasswordHasher::new(config.security.bcrypt_cost);
    users.seed_default_users(&hasher).await?;

    let jwt = Arc::new(JwtManager::from_config(&config.jwt));
    let authenticator = Authenticator::new(users.clone(), hasher, jwt.clone());
    let admin = AdminApi::new(users.clone());

    let discovery = DiscoveryClient::new(DiscoveryClientConfig::from_config(
        config,
        USER_APP_NAME,
        advertised_address(config, local_addr),
        vec![
            USER_SERVICE_NAME.to_string(),
            AUTH_SERVICE_NAME.to_string(),
            ADMIN_SERVICE_NAME.to_string(),
        ],
    ))?;
    discovery.spawn_heartbeat(&tracker, cancel.clone());

    tracing::info!(address = %local_addr, "User service listening");

    let result = Server::builder()
        .add_service(UserServiceServer::new(users))
        .add_service(AuthServiceServer::new(authenticator))
        .add_service(AdminServiceServer::with_interceptor(
            admin,
            AuthInterceptor::new(jwt),
        ))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await;

    stop_background(tracker, cancel).await;
    tracing::info!("User service stopped");
    Ok(result?)
}

pub async fn run_expense_service(config: Config) -> Result<(), ServerError> {
    let listener = bind(&config, EXPENSE_SERVICE_ADDRESS).await?;
    let repository: Arc<dyn ExpenseRepository> = match connect_database(&config).await? {
        Some(pool) => Arc::new(PgExpenseRepository::new(pool)),
        None => Arc::new(InMemoryExpenseRepository::new()),
    };
    serve_expense_service(&config, listener, repository, shutdown_signal()).await
}

/// 用户信息通过注册中心找到 user-service 获取，连接池随服务一起定期清理
fn user_directory(
    config: &Config,
    tracker: &TaskTracker,
    cancel: CancellationToken,
) -> Result<RemoteUserDirectory, ServerError> {
    let user_clients =
        GrpcClientManager::new(ConnectionPoolConfig::from(&config.gateway.connection_pool));
    user_clients.spawn_cleanup_task(tracker, cancel);

    Ok(RemoteUserDirectory::new(
        remote_resolver(config, EXPENSE_APP_NAME)?,
        user_clients,
        std::time::Duration::from_secs(config.discovery.request_timeout),
    ))
}

pub async fn serve_expense_service<F>(
    config: &Config,
    listener: TcpListener,
    repository: Arc<dyn ExpenseRepository>,
    shutdown: F,
) -> Result<(), ServerError>
where
    F: Future<Output = ()> + Send,
{
    let tracker = TaskTracker::new();
    let cancel = CancellationToken::new();
    let local_addr = listener.local_addr()?;

    let directory = user_directory(config, &tracker, cancel.clone())?;
    let manager = ExpenseManager::new(
        repository,
        Arc::new(directory),
        config.scheduler.heavy_task_limit,
    );

    if config.scheduler.enabled {
        spawn_report_scheduler(
            manager.clone(),
            config.scheduler.report_hour,
            &tracker,
            cancel.clone(),
        );
    }

    let discovery = DiscoveryClient::new(DiscoveryClientConfig::from_config(
        config,
        EXPENSE_APP_NAME,
        advertised_address(config, local_addr),
        vec![EXPENSE_SERVICE_NAME.to_string()],
    ))?;
    discovery.spawn_heartbeat(&tracker, cancel.clone());

    let jwt = Arc::new(JwtManager::from_config(&config.jwt));

    tracing::info!(address = %local_addr, "Expense service listening");

    let result = Server::builder()
        .add_service(ExpenseServiceServer::with_interceptor(
            manager,
            AuthInterceptor::new(jwt),
        ))
        .serve_with_incoming_shutdown(TcpListenerStream::new(listener), shutdown)
        .await;

    stop_background(tracker, cancel).await;
    tracing::info!("Expense service stopped");
    Ok(result?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_address_prefers_config() {
        let mut config = Config::default();
        config.discovery.advertised_address = Some("http://10.0.0.5:8082".into());
        let addr: SocketAddr = "0.0.0.0:8082".parse().unwrap();
        assert_eq!(advertised_address(&config, addr), "http://10.0.0.5:8082");
    }

    #[test]
    fn advertised_address_replaces_unspecified_ip() {
        let config = Config::default();
        let addr: SocketAddr = "0.0.0.0:8082".parse().unwrap();
        assert_eq!(advertised_address(&config, addr), "http://127.0.0.1:8082");

        let addr: SocketAddr = "192.168.1.2:9000".parse().unwrap();
        assert_eq!(advertised_address(&config, addr), "http://192.168.1.2:9000");
    }

    #[tokio::test]
    async fn user_directory_prunes_its_pool() {
        let tracker = TaskTracker::new();
        let cancel = CancellationToken::new();

        let _directory = user_directory(&Config::default(), &tracker, cancel.clone()).unwrap();
        assert_eq!(tracker.len(), 1, "pool cleanup task should be running");

        cancel.cancel();
        tracker.close();
        tokio::time::timeout(std::time::Duration::from_secs(5), tracker.wait())
            .await
            .expect("cleanup task did not stop");
    }
}
