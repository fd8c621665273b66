//! # 来源授权
//!
//! 根据 Origin 头和租户策略决定本次请求可使用的凭证来源。携带调用方
//! 凭证的请求无条件归类为 caller；其余请求必须携带已注册的 Origin，
//! 否则拒绝——这是迫使非浏览器客户端自带凭证的既定机制。

use std::sync::Arc;

use tracing::{debug, error};

use crate::auth::types::{
    CredentialSource, RequestIdentity, ResolvedCredential, SecretResolver,
};
use crate::config::TenantPolicy;
use crate::error::{GatewayError, Result};

/// 平台级精确来源，对所有租户生效
pub const PLATFORM_EXACT_ORIGINS: &[&str] =
    &["https://demo.osc.earth", "https://osa-demo.pages.dev"];

/// 平台级子域通配来源
pub const PLATFORM_WILDCARD_ORIGINS: &[&str] = &[
    "https://*.demo.osc.earth",
    "https://*.osc.earth",
    "https://*.osa-demo.pages.dev",
];

/// CORS 预检的兜底来源
pub const FALLBACK_ORIGIN: &str = "https://demo.osc.earth";

/// 子域通配匹配：`scheme://*.domain` 匹配任意非空点分前缀。
/// 裸域名本身不匹配，需要时单独列出。scheme 与 host 区分大小写，端口精确比较。
#[must_use]
pub fn match_wildcard_origin(pattern: &str, origin: &str) -> bool {
    let Some((scheme, rest)) = pattern.split_once("://") else {
        return false;
    };
    let Some(base) = rest.strip_prefix("*.") else {
        return false;
    };
    let Some((origin_scheme, origin_host)) = origin.split_once("://") else {
        return false;
    };
    if scheme != origin_scheme || base.is_empty() {
        return false;
    }
    // 前缀必须非空，且与基础域之间以点分隔
    origin_host.len() > base.len() + 1
        && origin_host.ends_with(base)
        && origin_host.as_bytes()[origin_host.len() - base.len() - 1] == b'.'
}

/// 本地开发来源（任意端口）
#[must_use]
pub fn is_localhost_origin(origin: &str) -> bool {
    origin.starts_with("http://localhost:") || origin.starts_with("http://127.0.0.1:")
}

/// 是否属于平台级来源集合（含本地开发来源）
#[must_use]
pub fn is_platform_origin(origin: &str) -> bool {
    if PLATFORM_EXACT_ORIGINS.contains(&origin) {
        return true;
    }
    if PLATFORM_WILDCARD_ORIGINS
        .iter()
        .any(|pattern| match_wildcard_origin(pattern, origin))
    {
        return true;
    }
    is_localhost_origin(origin)
}

/// Origin 是否被平台集合或租户自身的来源列表授权
#[must_use]
pub fn is_authorized_origin(origin: Option<&str>, policy: &TenantPolicy) -> bool {
    let Some(origin) = origin else {
        return false;
    };

    if is_platform_origin(origin) {
        return true;
    }

    policy.allowed_origins.iter().any(|allowed| {
        if allowed.contains('*') {
            match_wildcard_origin(allowed, origin)
        } else {
            origin == allowed
        }
    })
}

/// 来源授权器：无请求态副作用，仅产生日志
pub struct OriginAuthorizer {
    platform_credential_env: String,
    resolver: Arc<dyn SecretResolver>,
}

impl OriginAuthorizer {
    /// 创建授权器
    pub fn new(platform_credential_env: String, resolver: Arc<dyn SecretResolver>) -> Self {
        Self {
            platform_credential_env,
            resolver,
        }
    }

    /// 解析本次请求可用的凭证，或拒绝请求
    pub fn authorize(
        &self,
        identity: &RequestIdentity,
        policy: &TenantPolicy,
    ) -> Result<ResolvedCredential> {
        // 调用方自带凭证：无条件放行，与 Origin 无关
        if let Some(credential) = &identity.caller_credential {
            debug!(
                tenant_id = %policy.tenant_id,
                credential_source = CredentialSource::Caller.as_str(),
                "using caller-supplied credential"
            );
            return Ok(ResolvedCredential {
                source: CredentialSource::Caller,
                secret: credential.clone(),
            });
        }

        if !is_authorized_origin(identity.origin.as_deref(), policy) {
            return Err(GatewayError::origin_rejected(
                "API key required. Supply your own OpenRouter API key via the \
                 X-OpenRouter-Key header, or make the request from a registered origin.",
            ));
        }

        // Origin 已授权：优先租户自有凭证
        if let Some(env_var) = &policy.credential_env {
            if let Some(secret) = self.resolver.resolve(env_var) {
                debug!(
                    tenant_id = %policy.tenant_id,
                    credential_source = CredentialSource::Tenant.as_str(),
                    env_var = %env_var,
                    "using tenant credential"
                );
                return Ok(ResolvedCredential {
                    source: CredentialSource::Tenant,
                    secret,
                });
            }
            // 租户配置了凭证引用但未设置：这是平台被动买单的事故路径，必须留痕
            error!(
                tenant_id = %policy.tenant_id,
                configured_env_var = %env_var,
                env_var_missing = true,
                fallback_to_platform = true,
                origin = identity.origin.as_deref().unwrap_or(""),
                "tenant credential env var is not set, falling back to platform \
                 credential; this may incur unexpected platform costs"
            );
        }

        let Some(secret) = self.resolver.resolve(&self.platform_credential_env) else {
            return Err(GatewayError::config(
                "No credential configured for this tenant. Please contact support.",
            ));
        };

        debug!(
            tenant_id = %policy.tenant_id,
            credential_source = CredentialSource::Platform.as_str(),
            "using platform credential"
        );
        Ok(ResolvedCredential {
            source: CredentialSource::Platform,
            secret,
        })
    }
}
