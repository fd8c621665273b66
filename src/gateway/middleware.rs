//! # 网关中间件
//!
//! 手写 CORS 与客户端 IP 提取。CORS 回显只认平台级来源，租户级来源授权
//! 在业务流水线里判定，这里只负责浏览器握手。

use std::net::{IpAddr, SocketAddr};

use axum::{
    extract::{ConnectInfo, Request},
    http::{HeaderMap, HeaderValue, Method, StatusCode, header},
    middleware::Next,
    response::{IntoResponse, Response},
};
use tracing::debug;

use crate::auth::origin::{FALLBACK_ORIGIN, is_platform_origin};

/// 浏览器允许携带的自定义请求头,与 ALLOWED_HEADER_LIST 保持同步
const ALLOWED_REQUEST_HEADERS: &str =
    "content-type, authorization, x-openrouter-key, x-api-key, x-model-override, \
     x-provider-override, x-challenge-token";

#[cfg(test)]
const ALLOWED_HEADER_LIST: &[&str] = &[
    "content-type",
    "authorization",
    crate::auth::types::CALLER_CREDENTIAL_HEADER,
    crate::auth::types::ADMIN_CREDENTIAL_HEADER,
    crate::auth::types::MODEL_OVERRIDE_HEADER,
    crate::auth::types::PROVIDER_OVERRIDE_HEADER,
    crate::auth::types::CHALLENGE_TOKEN_HEADER,
];

/// 请求扩展：解析后的客户端 IP
#[derive(Debug, Clone, Copy)]
pub struct ClientIp(pub IpAddr);

/// 从反向代理头链解析客户端 IP,失败时退回套接字地址
#[must_use]
pub fn extract_client_ip(headers: &HeaderMap, socket_ip: IpAddr) -> IpAddr {
    if let Some(forwarded) = headers
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        && let Some(first) = forwarded.split(',').next()
        && let Ok(ip) = first.trim().parse::<IpAddr>()
    {
        return ip;
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok())
        && let Ok(ip) = real_ip.trim().parse::<IpAddr>()
    {
        return ip;
    }

    socket_ip
}

/// 把客户端 IP 放进请求扩展,供下游处理器读取
pub async fn client_ip_middleware(
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    mut request: Request,
    next: Next,
) -> Response {
    let client_ip = extract_client_ip(request.headers(), addr.ip());
    request.extensions_mut().insert(ClientIp(client_ip));
    next.run(request).await
}

/// 回显给浏览器的 CORS 源:平台级来源原样回显,其余回退到主站
#[must_use]
pub fn cors_echo_origin(origin: Option<&str>) -> &str {
    match origin {
        Some(origin) if is_platform_origin(origin) => origin,
        _ => FALLBACK_ORIGIN,
    }
}

fn apply_cors_headers(headers: &mut HeaderMap, echo_origin: &str) {
    let origin_value = HeaderValue::from_str(echo_origin)
        .unwrap_or_else(|_| HeaderValue::from_static(FALLBACK_ORIGIN));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, origin_value);
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("GET, POST, OPTIONS"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_REQUEST_HEADERS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_CREDENTIALS,
        HeaderValue::from_static("true"),
    );
    headers.insert(header::VARY, HeaderValue::from_static("Origin"));
}

/// CORS 中间件。预检请求在此短路,正常请求在响应上补齐 CORS 头。
pub async fn cors_middleware(request: Request, next: Next) -> Response {
    let echo_origin = {
        let origin = request
            .headers()
            .get(header::ORIGIN)
            .and_then(|v| v.to_str().ok());
        cors_echo_origin(origin).to_string()
    };

    if request.method() == Method::OPTIONS {
        debug!(echo_origin = %echo_origin, "answering CORS preflight");
        let mut response = StatusCode::NO_CONTENT.into_response();
        apply_cors_headers(response.headers_mut(), &echo_origin);
        return response;
    }

    let mut response = next.run(request).await;
    apply_cors_headers(response.headers_mut(), &echo_origin);
    response
}
