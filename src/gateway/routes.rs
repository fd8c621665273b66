//! # 路由定义
//!
//! 保留段路由优先注册,租户通配路由兜底

use axum::{
    Router,
    routing::{get, post},
};

use super::handlers::{metrics, system, tenant};
use super::server::AppState;

/// 构建路由树。中间件栈由服务器装配,这里只声明路径。
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(system::health))
        .route("/version", get(system::version))
        .route("/feedback", post(system::feedback))
        .route("/metrics/{kind}", get(metrics::platform_metrics))
        .route("/{tenant}", get(tenant::tenant_info))
        .route("/{tenant}/", get(tenant::tenant_info))
        .route("/{tenant}/ask", post(tenant::ask))
        .route("/{tenant}/chat", post(tenant::chat))
        .route("/{tenant}/sessions", get(tenant::sessions))
        .route("/{tenant}/metrics/public", get(metrics::tenant_public_metrics))
        .route(
            "/{tenant}/metrics/public/{*rest}",
            get(metrics::tenant_public_metrics_path),
        )
        .with_state(state)
}
