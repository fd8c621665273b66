//! # 租户对话流水线
//!
//! ask/chat 的完整准入链:租户解析、来源授权、人机挑战、双窗口限流、
//! 模型选择、请求体改写,最后转发后端。调用方自带凭证时只跳过挑战校验,
//! 限流对所有请求生效。

use std::net::IpAddr;

use axum::{
    Extension, Json,
    body::Body,
    extract::{Path, RawQuery, State},
    http::{HeaderMap, Response, header},
};
use serde_json::Value;
use tracing::debug;

use crate::auth::origin::is_authorized_origin;
use crate::auth::types::{
    CALLER_CREDENTIAL_HEADER, CHALLENGE_TOKEN_FIELD, CHALLENGE_TOKEN_HEADER, CredentialSource,
    MODEL_OVERRIDE_HEADER, PROVIDER_OVERRIDE_HEADER, RequestIdentity,
};
use crate::config::TenantPolicy;
use crate::error::{GatewayError, Result};
use crate::gateway::middleware::ClientIp;
use crate::gateway::server::AppState;

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

fn body_string_field(body: &Value, field: &str) -> Option<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(ToString::to_string)
}

/// 从头与请求体收集本次请求的身份信息。
/// 挑战令牌优先取头,其次取请求体保留字段,保留字段随后从体中剥除。
fn build_identity(
    headers: &HeaderMap,
    body: &mut Value,
    client_ip: IpAddr,
) -> RequestIdentity {
    let challenge_token = header_value(headers, CHALLENGE_TOKEN_HEADER)
        .or_else(|| body_string_field(body, CHALLENGE_TOKEN_FIELD));
    if let Some(fields) = body.as_object_mut() {
        fields.remove(CHALLENGE_TOKEN_FIELD);
    }

    RequestIdentity {
        client_ip,
        origin: header_value(headers, header::ORIGIN.as_str()),
        caller_credential: header_value(headers, CALLER_CREDENTIAL_HEADER),
        challenge_token,
        requested_model: header_value(headers, MODEL_OVERRIDE_HEADER)
            .or_else(|| body_string_field(body, "model")),
        requested_provider: header_value(headers, PROVIDER_OVERRIDE_HEADER)
            .or_else(|| body_string_field(body, "provider")),
    }
}

fn resolve_policy(state: &AppState, tenant_id: &str) -> Result<std::sync::Arc<TenantPolicy>> {
    state
        .tenants
        .get(tenant_id)
        .ok_or_else(|| GatewayError::tenant_not_found(tenant_id))
}

async fn chat_pipeline(
    state: &AppState,
    tenant_id: &str,
    endpoint: &str,
    headers: &HeaderMap,
    client_ip: IpAddr,
    mut body: Value,
) -> Result<Response<Body>> {
    let policy = resolve_policy(state, tenant_id)?;
    let identity = build_identity(headers, &mut body, client_ip);

    let credential = state.origin.authorize(&identity, &policy)?;

    // 自带凭证只豁免面向浏览器的挑战校验
    if credential.source != CredentialSource::Caller {
        state
            .challenge
            .verify(identity.challenge_token.as_deref(), client_ip)
            .await?;
    }

    // 限流按客户端 IP 对所有请求生效,谁付钱都一样
    super::enforce_rate_limit(state, client_ip).await?;

    let mut choice = state.selector.select(
        &policy,
        identity.requested_model.as_deref(),
        credential.source,
    )?;
    // 提供商覆盖只对自费请求生效,平台买单的流量走租户调优的路由
    if credential.source == CredentialSource::Caller
        && let Some(provider) = identity.requested_provider.clone()
    {
        choice.provider = Some(provider);
    }
    debug!(
        tenant_id = %tenant_id,
        model = %choice.model,
        provider = choice.provider.as_deref().unwrap_or(""),
        credential_source = credential.source.as_str(),
        "dispatching chat request"
    );

    if let Some(fields) = body.as_object_mut() {
        fields.insert("model".to_string(), Value::String(choice.model));
        match choice.provider {
            Some(provider) => {
                fields.insert("provider".to_string(), Value::String(provider));
            }
            None => {
                fields.remove("provider");
            }
        }
    }

    let vetted_origin = identity
        .origin
        .as_deref()
        .filter(|origin| is_authorized_origin(Some(*origin), &policy));

    state
        .proxy
        .forward_chat(tenant_id, endpoint, &body, &credential, vetted_origin)
        .await
}

/// `POST /{tenant}/ask`
pub async fn ask(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response<Body>> {
    chat_pipeline(&state, &tenant_id, "ask", &headers, client_ip, body).await
}

/// `POST /{tenant}/chat`
pub async fn chat(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Result<Response<Body>> {
    chat_pipeline(&state, &tenant_id, "chat", &headers, client_ip, body).await
}

/// `GET /{tenant}`,租户公开信息匿名透传,仅限流
pub async fn tenant_info(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    let policy = resolve_policy(&state, &tenant_id)?;
    super::enforce_rate_limit(&state, client_ip).await?;
    let vetted_origin = header_value(&headers, header::ORIGIN.as_str());
    let vetted_origin = vetted_origin
        .as_deref()
        .filter(|origin| is_authorized_origin(Some(*origin), &policy));

    state
        .proxy
        .forward_get(
            &format!("/{tenant_id}/"),
            query.as_deref(),
            None,
            vetted_origin,
        )
        .await
}

/// `GET /{tenant}/sessions`,管理凭证原样透传,由后端完成鉴权
pub async fn sessions(
    State(state): State<AppState>,
    Path(tenant_id): Path<String>,
    Extension(ClientIp(client_ip)): Extension<ClientIp>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Result<Response<Body>> {
    resolve_policy(&state, &tenant_id)?;
    super::enforce_rate_limit(&state, client_ip).await?;

    let admin_credential = header_value(&headers, crate::auth::types::ADMIN_CREDENTIAL_HEADER);
    state
        .proxy
        .forward_get(
            &format!("/{tenant_id}/sessions"),
            query.as_deref(),
            admin_credential.as_deref(),
            None,
        )
        .await
}
