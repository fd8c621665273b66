//! # 人机挑战校验
//!
//! 将挑战令牌提交给外部校验服务（Turnstile 风格的 siteverify 接口）。
//! 令牌缺失或被判拒是硬性拒绝；校验服务本身不可达属于基础设施退化，
//! 放行请求并留痕。

use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::types::SecretResolver;
use crate::config::ChallengeConfig;
use crate::error::{GatewayError, Result};

/// siteverify 响应体
#[derive(Debug, Deserialize)]
struct SiteverifyResponse {
    success: bool,
    #[serde(default, rename = "error-codes")]
    error_codes: Vec<String>,
}

/// 挑战校验器
pub struct ChallengeVerifier {
    http: reqwest::Client,
    verify_url: String,
    secret: Option<String>,
}

impl ChallengeVerifier {
    /// 创建校验器；密钥未配置时进入开发模式（跳过校验并告警）
    pub fn new(config: &ChallengeConfig, resolver: &Arc<dyn SecretResolver>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| {
                GatewayError::config_with_source("Failed to build challenge HTTP client", e)
            })?;

        let secret = resolver.resolve(&config.secret_env);
        if secret.is_none() {
            warn!(
                secret_env = %config.secret_env,
                "challenge secret is not configured; challenge verification is DISABLED \
                 (development mode)"
            );
        }

        Ok(Self {
            http,
            verify_url: config.verify_url.clone(),
            secret,
        })
    }

    /// 校验是否启用
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.secret.is_some()
    }

    /// 校验挑战令牌。BYOC 旁路由调用方流水线负责，不在此处判断。
    pub async fn verify(&self, token: Option<&str>, client_ip: IpAddr) -> Result<()> {
        let Some(secret) = &self.secret else {
            warn!(
                client_ip = %client_ip,
                "skipping challenge verification: secret not configured (development mode)"
            );
            return Ok(());
        };

        let Some(token) = token else {
            return Err(GatewayError::challenge_failed(
                "Challenge token missing. Complete the challenge, or supply your own \
                 API key via the X-OpenRouter-Key header.",
            ));
        };

        let form = [
            ("secret", secret.as_str()),
            ("response", token),
            ("remoteip", &client_ip.to_string()),
        ];

        let response = match self.http.post(&self.verify_url).form(&form).send().await {
            Ok(response) => response,
            Err(e) => {
                // 校验服务不可达：基础设施退化，放行
                warn!(
                    client_ip = %client_ip,
                    error = %e,
                    "challenge verification service unreachable, failing open"
                );
                return Ok(());
            }
        };

        let verdict: SiteverifyResponse = match response.json().await {
            Ok(verdict) => verdict,
            Err(e) => {
                warn!(
                    client_ip = %client_ip,
                    error = %e,
                    "challenge verification returned malformed response, failing open"
                );
                return Ok(());
            }
        };

        if verdict.success {
            debug!(client_ip = %client_ip, "challenge verified");
            Ok(())
        } else {
            debug!(
                client_ip = %client_ip,
                error_codes = ?verdict.error_codes,
                "challenge rejected by verification service"
            );
            Err(GatewayError::challenge_failed(
                "Challenge verification failed. Complete the challenge, or supply your \
                 own API key via the X-OpenRouter-Key header.",
            ))
        }
    }
}
