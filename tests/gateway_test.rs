mod common;

use bytes::Bytes;
use http_body_util::Full;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tonic::{Code, Request};
use tower::ServiceExt;

use common::{
    RunningServer, http1_get, shutdown_future, spawn_server, test_config, wait_until,
};
use expense_mesh::auth::attach_bearer;
use expense_mesh::config::{Config, SecurityConfig};
use expense_mesh::expense::{
    ExpenseInput, ListExpensesRequest, expense_service_client::ExpenseServiceClient,
};
use expense_mesh::server;
use expense_mesh::services::client_manager::{ConnectionPoolConfig, GrpcClientManager};
use expense_mesh::services::discovery::{
    CachedResolver, DiscoveryClient, DiscoveryClientConfig, DiscoveryError, ServiceResolver,
};
use expense_mesh::services::expenses::InMemoryExpenseRepository;
use expense_mesh::services::registry::{DiscoveryRegistry, Registration};
use expense_mesh::services::router::DynamicRouter;
use expense_mesh::services::users::InMemoryUserRepository;
use expense_mesh::user::{
    ListUsersRequest, LoginRequest, SignupRequest, admin_service_client::AdminServiceClient,
    auth_service_client::AuthServiceClient,
};

struct Mesh {
    registry: RunningServer,
    gateway: RunningServer,
    users: RunningServer,
    expenses: Option<RunningServer>,
    config: Config,
}

impl Mesh {
    async fn stop(self) {
        self.gateway.stop().await;
        if let Some(expenses) = self.expenses {
            expenses.stop().await;
        }
        self.users.stop().await;
        self.registry.stop().await;
    }
}

async fn wait_for_service(config: &Config, service_name: &'static str) {
    let client = DiscoveryClient::new(DiscoveryClientConfig::from_config(
        config,
        "test",
        String::new(),
        Vec::new(),
    ))
    .unwrap();
    wait_until(|| {
        let client = client.clone();
        async move {
            client
                .lookup(service_name)
                .await
                .map(|i| !i.is_empty())
                .unwrap_or(false)
        }
    })
    .await;
}

async fn start_mesh(with_expenses: bool) -> Mesh {
    let registry_config = test_config("");
    let registry = spawn_server(move |listener, rx| async move {
        server::serve_registry(&registry_config, listener, shutdown_future(rx)).await
    })
    .await;
    let config = test_config(&registry.url());

    let user_config = config.clone();
    let users = spawn_server(move |listener, rx| async move {
        server::serve_user_service(
            &user_config,
            listener,
            Arc::new(InMemoryUserRepository::new()),
            shutdown_future(rx),
        )
        .await
    })
    .await;
    wait_for_service(&config, "user.AuthService").await;

    let expenses = if with_expenses {
        let expense_config = config.clone();
        let expenses = spawn_server(move |listener, rx| async move {
            server::serve_expense_service(
                &expense_config,
                listener,
                Arc::new(InMemoryExpenseRepository::new()),
                shutdown_future(rx),
            )
            .await
        })
        .await;
        wait_for_service(&config, "expense.ExpenseService").await;
        Some(expenses)
    } else {
        None
    };

    let gateway_config = config.clone();
    let client = DiscoveryClient::new(DiscoveryClientConfig::from_config(
        &gateway_config,
        "gateway",
        String::new(),
        Vec::new(),
    ))
    .unwrap();
    let resolver = CachedResolver::new(client, std::time::Duration::from_secs(1)).into_shared();
    let gateway = spawn_server(move |listener, rx| async move {
        server::serve_gateway(&gateway_config, listener, resolver, shutdown_future(rx)).await
    })
    .await;

    Mesh {
        registry,
        gateway,
        users,
        expenses,
        config,
    }
}

#[tokio::test]
async fn test_gateway_health_and_metrics_over_http1() {
    let mesh = start_mesh(false).await;

    let health = http1_get(mesh.gateway.addr, "/health").await;
    assert!(health.starts_with("HTTP/1.1 200"), "unexpected response: {health}");
    assert!(health.ends_with("ok"));

    let metrics = http1_get(mesh.gateway.addr, "/metrics").await;
    assert!(metrics.starts_with("HTTP/1.1 200"));

    let bad_path = http1_get(mesh.gateway.addr, "/").await;
    assert!(bad_path.starts_with("HTTP/1.1 400"), "unexpected response: {bad_path}");

    mesh.stop().await;
}

#[tokio::test]
async fn test_gateway_routes_auth_calls_to_user_service() {
    let mesh = start_mesh(false).await;
    let mut auth = AuthServiceClient::connect(mesh.gateway.url()).await.unwrap();

    let login = auth
        .login(LoginRequest {
            username: "admin".into(),
            password: "admin123".into(),
        })
        .await
        .expect("Login through gateway failed")
        .into_inner();
    assert_eq!(login.message, "success");

    let err = auth
        .login(LoginRequest {
            username: "admin".into(),
            password: "nope".into(),
        })
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);
    assert_eq!(err.message(), "Invalid username or password.");

    let mut admin = AdminServiceClient::connect(mesh.gateway.url()).await.unwrap();
    let mut request = Request::new(ListUsersRequest {});
    attach_bearer(&mut request, &login.token).unwrap();
    let users = admin.list_users(request).await.unwrap().into_inner().users;
    assert_eq!(users.len(), 2);

    let err = admin
        .list_users(Request::new(ListUsersRequest {}))
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    drop((auth, admin));
    mesh.stop().await;
}

#[tokio::test]
async fn test_gateway_reports_missing_service() {
    let mesh = start_mesh(false).await;
    let mut expenses = ExpenseServiceClient::connect(mesh.gateway.url()).await.unwrap();

    let err = expenses
        .list_expenses(ListExpensesRequest {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::NotFound);

    drop(expenses);
    mesh.stop().await;
}

#[tokio::test]
async fn test_signup_and_record_expense_through_gateway() {
    let mesh = start_mesh(true).await;
    assert!(mesh.config.discovery.registry_address.starts_with("http://"));

    let mut auth = AuthServiceClient::connect(mesh.gateway.url()).await.unwrap();
    let token = auth
        .signup(SignupRequest {
            full_name: "Mesh Tester".into(),
            username: "tester".into(),
            password: "tester123".into(),
        })
        .await
        .unwrap()
        .into_inner()
        .token;

    let mut expenses = ExpenseServiceClient::connect(mesh.gateway.url()).await.unwrap();

    let mut create = Request::new(ExpenseInput {
        expense_type: 0,
        date: "2024-07-01".into(),
        amount: 42.0,
        category: "Travel".into(),
        account: "Card".into(),
        note: None,
    });
    attach_bearer(&mut create, &token).unwrap();
    let created = expenses.create_expense(create).await.unwrap().into_inner();
    assert!(created.id > 0);
    assert_eq!(created.expense_type, 1);

    let mut list = Request::new(ListExpensesRequest {});
    attach_bearer(&mut list, &token).unwrap();
    let listed = expenses.list_expenses(list).await.unwrap().into_inner();
    assert_eq!(listed.expenses.len(), 1);
    assert_eq!(listed.expenses[0].category, "Travel");

    let err = expenses
        .list_expenses(ListExpensesRequest {})
        .await
        .unwrap_err();
    assert_eq!(err.code(), Code::Unauthenticated);

    drop((auth, expenses));
    mesh.stop().await;
}

/// 绑定后立即关闭的端口，连接会被拒绝
async fn closed_address() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    format!("http://{addr}")
}

/// 接受连接但从不应答
async fn silent_address() -> (String, JoinHandle<()>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((socket, _)) = listener.accept().await {
            held.push(socket);
        }
    });
    (format!("http://{addr}"), handle)
}

/// 同进程注册表，auth 服务指向给定地址
fn registry_with_auth_at(address: &str) -> (DiscoveryRegistry, String) {
    let registry = DiscoveryRegistry::new(Duration::from_secs(90), SecurityConfig::default());
    let instance_id = registry
        .register_instance(Registration {
            app_name: "user-service".into(),
            address: address.to_string(),
            services: vec!["user.AuthService".into()],
            ..Default::default()
        })
        .unwrap();
    (registry, instance_id)
}

async fn spawn_gateway(config: Config, resolver: Arc<dyn ServiceResolver>) -> RunningServer {
    spawn_server(move |listener, rx| async move {
        server::serve_gateway(&config, listener, resolver, shutdown_future(rx)).await
    })
    .await
}

fn login_request() -> LoginRequest {
    LoginRequest {
        username: "admin".into(),
        password: "admin123".into(),
    }
}

#[tokio::test]
async fn test_gateway_reports_unreachable_instance() {
    let (registry, _) = registry_with_auth_at(&closed_address().await);
    let resolver = CachedResolver::new(registry, Duration::from_secs(60)).into_shared();
    let gateway = spawn_gateway(test_config(""), resolver).await;

    let mut auth = AuthServiceClient::connect(gateway.url()).await.unwrap();
    let err = auth.login(login_request()).await.unwrap_err();
    assert_eq!(err.code(), Code::Unavailable);
    assert!(err.message().contains("Failed to connect"), "unexpected message: {}", err.message());

    drop(auth);
    gateway.stop().await;
}

#[tokio::test]
async fn test_gateway_times_out_silent_instance() {
    let (address, silent) = silent_address().await;
    let (registry, _) = registry_with_auth_at(&address);
    let resolver = CachedResolver::new(registry, Duration::from_secs(60)).into_shared();
    let mut config = test_config("");
    config.gateway.request_timeout = 1;
    let gateway = spawn_gateway(config, resolver).await;

    let mut auth = AuthServiceClient::connect(gateway.url()).await.unwrap();
    let started = std::time::Instant::now();
    let err = auth.login(login_request()).await.unwrap_err();
    assert_eq!(err.code(), Code::DeadlineExceeded);
    assert!(started.elapsed() < Duration::from_secs(5));

    drop(auth);
    gateway.stop().await;
    silent.abort();
}

#[tokio::test]
async fn test_forward_failure_drops_channel_and_cached_instance() {
    let (registry, instance_id) = registry_with_auth_at(&closed_address().await);
    let resolver = CachedResolver::new(registry.clone(), Duration::from_secs(60)).into_shared();
    let router = DynamicRouter::new(
        resolver.clone(),
        GrpcClientManager::new(ConnectionPoolConfig::default()),
        Duration::from_secs(5),
    );

    // 空的 gRPC 消息帧
    let request = http::Request::builder()
        .method(http::Method::POST)
        .uri("/user.AuthService/Login")
        .header(http::header::CONTENT_TYPE, "application/grpc")
        .header("te", "trailers")
        .body(Full::new(Bytes::from_static(&[0, 0, 0, 0, 0])))
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), http::StatusCode::OK);
    assert_eq!(response.headers()["grpc-status"], "14");
    assert_eq!(router.client_manager().len().await, 0);

    // 缓存已失效：实例注销后不会再解析到旧地址
    assert!(registry.unregister_instance(&instance_id));
    let err = resolver.resolve("user.AuthService").await.unwrap_err();
    assert!(matches!(err, DiscoveryError::NoInstances(_)));
}
