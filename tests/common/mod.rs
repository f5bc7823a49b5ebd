#![allow(dead_code)]

use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use expense_mesh::config::Config;
use expense_mesh::server::ServerError;

/// 测试中运行的服务进程，drop 前调用 `stop`
pub struct RunningServer {
    pub addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    handle: JoinHandle<Result<(), ServerError>>,
}

impl RunningServer {
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        let result = tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked");
        result.expect("server returned error");
    }
}

/// 绑定随机端口后启动服务
pub async fn spawn_server<F, Fut>(serve: F) -> RunningServer
where
    F: FnOnce(TcpListener, oneshot::Receiver<()>) -> Fut,
    Fut: Future<Output = Result<(), ServerError>> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (tx, rx) = oneshot::channel();
    let handle = tokio::spawn(serve(listener, rx));
    RunningServer {
        addr,
        shutdown: Some(tx),
        handle,
    }
}

pub fn shutdown_future(rx: oneshot::Receiver<()>) -> impl Future<Output = ()> + Send {
    async move {
        let _ = rx.await;
    }
}

/// 测试用配置：快速 bcrypt、关闭定时任务、短心跳
pub fn test_config(registry_url: &str) -> Config {
    let mut config = Config::default();
    config.discovery.registry_address = registry_url.to_string();
    config.discovery.heartbeat_interval = 1;
    config.discovery.cache_ttl = 1;
    config.security.bcrypt_cost = 4;
    config.scheduler.enabled = false;
    config.gateway.request_timeout = 5;
    config
}

/// 轮询直到条件成立
pub async fn wait_until<F, Fut>(mut check: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("condition not met in time");
}

/// 以 HTTP/1.1 发送 GET，返回完整响应文本
pub async fn http1_get(addr: SocketAddr, path: &str) -> String {
    let mut stream = tokio::net::TcpStream::connect(addr).await.unwrap();
    let request = format!("GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes()).await.unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();
    response
}
