//! # 指标透传处理器
//!
//! 网关不聚合指标,平台级指标带管理凭证透传,租户公开指标匿名透传。
//! 全部路由只限流,不做挑战校验。

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Response, StatusCode, header},
    response::IntoResponse,
};
use chrono::Utc;

use crate::gateway::middleware::ClientIp;

use crate::auth::types::ADMIN_CREDENTIAL_HEADER;
use crate::error::{GatewayError, Result};
use crate::gateway::response::{ErrorInfo, ErrorResponse};
use crate::gateway::server::AppState;

/// 平台级指标类别白名单
const PLATFORM_METRIC_KINDS: &[&str] = &["overview", "tokens", "quality"];

fn vetted_origin(headers: &HeaderMap) -> Option<&str> {
    headers.get(header::ORIGIN).and_then(|v| v.to_str().ok())
}

/// `GET /metrics/{kind}`,管理凭证原样透传,由后端完成鉴权
pub async fn platform_metrics(
    State(state): State<AppState>,
    Path(kind): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    super::enforce_rate_limit(&state, client_ip).await?;

    if !PLATFORM_METRIC_KINDS.contains(&kind.as_str()) {
        let body = ErrorResponse {
            success: false,
            error: ErrorInfo {
                code: "UNKNOWN_METRIC".to_string(),
                message: format!("Unknown metrics category '{kind}'"),
            },
            timestamp: Utc::now(),
        };
        return Ok((StatusCode::NOT_FOUND, Json(body)).into_response());
    }

    let admin_credential = headers
        .get(ADMIN_CREDENTIAL_HEADER)
        .and_then(|v| v.to_str().ok());
    state
        .proxy
        .forward_get(
            &format!("/metrics/{kind}"),
            query.as_deref(),
            admin_credential,
            vetted_origin(&headers),
        )
        .await
}

/// `GET /{tenant}/metrics/public`
pub async fn tenant_public_metrics(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    if state.tenants.get(&tenant_id).is_none() {
        return Err(GatewayError::tenant_not_found(tenant_id));
    }
    super::enforce_rate_limit(&state, client_ip).await?;

    state
        .proxy
        .forward_get(
            &format!("/{tenant_id}/metrics/public"),
            query.as_deref(),
            None,
            vetted_origin(&headers),
        )
        .await
}

/// `GET /{tenant}/metrics/public/{*rest}`,子路径原样拼接
pub async fn tenant_public_metrics_path(
    State(state): State<AppState>,
    Path((tenant_id, rest)): Path<(String, String)>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    if state.tenants.get(&tenant_id).is_none() {
        return Err(GatewayError::tenant_not_found(tenant_id));
    }
    super::enforce_rate_limit(&state, client_ip).await?;

    state
        .proxy
        .forward_get(
            &format!("/{tenant_id}/metrics/public/{rest}"),
            query.as_deref(),
            None,
            vetted_origin(&headers),
        )
        .await
}
