use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// 初始化日志，RUST_LOG 优先于配置文件中的级别
pub fn init(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    // 测试中可能被多次调用
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
