//! # 日志配置模块
//!
//! 提供统一的 tracing 初始化，默认过滤策略针对网关的请求路径日志做了优化

use std::env;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// 初始化网关日志系统
///
/// `RUST_LOG` 优先于传入的级别；默认将本 crate 提升到 debug，
/// 并压低依赖库的握手/连接细节日志。
pub fn init_logging(log_level: Option<&str>) {
    let level = log_level.unwrap_or("info");

    let default_filter = format!("{level},osa_gateway=debug,hyper=warn,reqwest=warn,redis=warn");

    let log_filter = env::var("RUST_LOG").unwrap_or(default_filter);

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| log_filter.into()))
        .with(
            fmt::layer()
                .with_target(true)
                .with_level(true)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_file(false)
                .with_line_number(false)
                .compact(),
        )
        .init();
}
