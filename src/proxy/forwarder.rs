//! # 后端请求转发器
//!
//! 把准入通过的请求转发到后端服务。注入平台/租户凭证或透传调用方凭证，
//! 错误响应体有界透传，事件流响应不缓冲直接管道回客户端。

use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};
use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};

use crate::auth::types::{ADMIN_CREDENTIAL_HEADER, CALLER_CREDENTIAL_HEADER, ResolvedCredential};
use crate::config::BackendConfig;
use crate::error::types::BackendErrorKind;
use crate::error::{GatewayError, Result};

/// 后端转发器
pub struct RequestProxy {
    http: reqwest::Client,
    base_url: String,
    max_error_body_bytes: usize,
}

impl RequestProxy {
    /// 从后端配置创建转发器
    pub fn new(config: &BackendConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| {
                GatewayError::config_with_source("Failed to build backend HTTP client", e)
            })?;

        Ok(Self {
            http,
            base_url: config.url.trim_end_matches('/').to_string(),
            max_error_body_bytes: config.max_error_body_bytes,
        })
    }

    /// 转发对话类 POST 请求，注入解析好的凭证
    pub async fn forward_chat(
        &self,
        tenant_id: &str,
        endpoint: &str,
        body: &Value,
        credential: &ResolvedCredential,
        vetted_origin: Option<&str>,
    ) -> Result<Response<Body>> {
        let url = format!("{}/{}/{}", self.base_url, tenant_id, endpoint);
        debug!(
            tenant_id = %tenant_id,
            endpoint = %endpoint,
            credential_source = credential.source.as_str(),
            "Forwarding chat request to backend"
        );

        let mut request = self
            .http
            .post(&url)
            .header(CALLER_CREDENTIAL_HEADER, &credential.secret)
            .json(body);
        if let Some(origin) = vetted_origin {
            request = request.header(header::ORIGIN, origin);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        self.relay_response(response).await
    }

    /// 透传 GET 请求，调用方凭证原样带给后端
    pub async fn forward_get(
        &self,
        path: &str,
        query: Option<&str>,
        admin_credential: Option<&str>,
        vetted_origin: Option<&str>,
    ) -> Result<Response<Body>> {
        let mut url = format!("{}{}", self.base_url, path);
        if let Some(query) = query {
            url.push('?');
            url.push_str(query);
        }
        debug!(path = %path, "Forwarding GET request to backend");

        let mut request = self.http.get(&url);
        if let Some(credential) = admin_credential {
            request = request.header(ADMIN_CREDENTIAL_HEADER, credential);
        }
        if let Some(origin) = vetted_origin {
            request = request.header(header::ORIGIN, origin);
        }

        let response = request.send().await.map_err(classify_transport_error)?;
        self.relay_response(response).await
    }

    /// 透传 JSON POST 请求，不注入任何凭证
    pub async fn forward_post_json(&self, path: &str, body: &Value) -> Result<Response<Body>> {
        let url = format!("{}{}", self.base_url, path);
        debug!(path = %path, "Forwarding POST request to backend");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(classify_transport_error)?;
        self.relay_response(response).await
    }

    /// 把后端响应中继回客户端
    ///
    /// 非成功状态码:响应体有界截断后按原状态码透传;
    /// 事件流:不缓冲直接管道;其余按 JSON 解析后以 200 返回。
    async fn relay_response(&self, response: reqwest::Response) -> Result<Response<Body>> {
        let status = response.status();
        let content_type = response
            .headers()
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/octet-stream")
            .to_string();

        if !status.is_success() {
            let body = response.bytes().await.map_err(classify_transport_error)?;
            let truncated_len = body.len().min(self.max_error_body_bytes);
            warn!(
                status = status.as_u16(),
                body_bytes = body.len(),
                relayed_bytes = truncated_len,
                "Backend returned an error response"
            );
            let body = truncate_body(body, self.max_error_body_bytes);
            return Ok(Response::builder()
                .status(status)
                .header(
                    header::CONTENT_TYPE,
                    HeaderValue::from_str(&content_type)
                        .unwrap_or(HeaderValue::from_static("application/octet-stream")),
                )
                .body(Body::from(body))
                .map_err(|e| GatewayError::internal_with_source("Failed to build response", e))?);
        }

        if content_type.starts_with("text/event-stream") {
            // 事件流逐块中继,网关不聚合也不解析帧
            return Ok(Response::builder()
                .status(status)
                .header(header::CONTENT_TYPE, HeaderValue::from_static("text/event-stream"))
                .header(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"))
                .header(header::CONNECTION, HeaderValue::from_static("keep-alive"))
                .body(Body::from_stream(response.bytes_stream()))
                .map_err(|e| GatewayError::internal_with_source("Failed to build response", e))?);
        }

        let payload: Value = response.json().await.map_err(|e| {
            GatewayError::backend_with_source(
                BackendErrorKind::Protocol,
                "Backend returned a malformed JSON response",
                e,
            )
        })?;
        let body = serde_json::to_vec(&payload)?;
        Ok(Response::builder()
            .status(StatusCode::OK)
            .header(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(Body::from(body))
            .map_err(|e| GatewayError::internal_with_source("Failed to build response", e))?)
    }
}

/// 传输层错误归类:超时 504,连接失败 503,协议/解码错误 502,其余 500
fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::backend_with_source(
            BackendErrorKind::Timeout,
            "Backend request timed out",
            error,
        )
    } else if error.is_connect() {
        GatewayError::backend_with_source(
            BackendErrorKind::Connect,
            "Backend is unreachable",
            error,
        )
    } else if error.is_decode() {
        GatewayError::backend_with_source(
            BackendErrorKind::Protocol,
            "Backend returned an invalid response",
            error,
        )
    } else {
        GatewayError::backend_with_source(BackendErrorKind::Other, "Backend request failed", error)
    }
}

fn truncate_body(body: Bytes, max_bytes: usize) -> Bytes {
    if body.len() > max_bytes {
        body.slice(..max_bytes)
    } else {
        body
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn oversized_error_bodies_are_truncated() {
        let body = Bytes::from(vec![b'x'; 100]);
        assert_eq!(truncate_body(body, 64).len(), 64);

        let body = Bytes::from(vec![b'x'; 10]);
        assert_eq!(truncate_body(body, 64).len(), 10);
    }
}
