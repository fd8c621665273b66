//! # 系统处理器
//!
//! 健康检查、版本信息与反馈透传

use axum::{Extension, Json, body::Body, extract::State, http::Response};
use serde::Serialize;
use serde_json::Value;

use crate::error::Result;
use crate::gateway::middleware::ClientIp;
use crate::gateway::response::ApiResponse;
use crate::gateway::server::AppState;

/// 健康快照
#[derive(Debug, Serialize)]
pub struct HealthSnapshot {
    pub status: &'static str,
    pub version: &'static str,
    pub tenants: usize,
    pub challenge_enabled: bool,
    pub counter_store: &'static str,
    pub rate_limit: RateLimitSnapshot,
}

/// 生效的限流参数
#[derive(Debug, Serialize)]
pub struct RateLimitSnapshot {
    pub per_minute: u32,
    pub per_hour: u32,
}

/// 版本信息
#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub name: &'static str,
    pub version: &'static str,
}

/// `GET /health`
pub async fn health(State(state): State<AppState>) -> ApiResponse<HealthSnapshot> {
    let counter_store = match &state.counter_store {
        Some(store) => {
            if store.ping().await.is_ok() {
                "ok"
            } else {
                "degraded"
            }
        }
        None => "in-process",
    };

    ApiResponse::Success(HealthSnapshot {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
        tenants: state.tenants.len(),
        challenge_enabled: state.challenge.is_enabled(),
        counter_store,
        rate_limit: RateLimitSnapshot {
            per_minute: state.config.rate_limit.per_minute,
            per_hour: state.config.rate_limit.per_hour,
        },
    })
}

/// `GET /version`
pub async fn version() -> ApiResponse<VersionInfo> {
    ApiResponse::Success(VersionInfo {
        name: env!("CARGO_PKG_NAME"),
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /feedback`,匿名透传给后端,不注入任何凭证。
/// 只做限流,不做挑战校验:反馈不花钱,但也不能被刷。
pub async fn feedback(
    State(state): State<AppState>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    Json(body): Json<Value>,
) -> Result<Response<Body>> {
    super::enforce_rate_limit(&state, client_ip).await?;

    state.proxy.forward_post_json("/feedback", &body).await
}
