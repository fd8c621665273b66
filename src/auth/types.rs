//! # 授权相关类型定义

use std::collections::HashMap;
use std::net::IpAddr;

use serde::Serialize;

/// 调用方自带凭证头（BYOC）
pub const CALLER_CREDENTIAL_HEADER: &str = "x-openrouter-key";
/// 管理操作凭证头（透传模式，网关不注入自身凭证）
pub const ADMIN_CREDENTIAL_HEADER: &str = "x-api-key";
/// 模型覆盖头
pub const MODEL_OVERRIDE_HEADER: &str = "x-model-override";
/// 提供商覆盖头
pub const PROVIDER_OVERRIDE_HEADER: &str = "x-provider-override";
/// 人机挑战令牌头
pub const CHALLENGE_TOKEN_HEADER: &str = "x-challenge-token";
/// 请求体中挑战令牌的保留字段名，转发前剥除
pub const CHALLENGE_TOKEN_FIELD: &str = "challenge_token";

/// 本次请求注入的凭证来源
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialSource {
    /// 调用方自带凭证
    Caller,
    /// 租户自有凭证
    Tenant,
    /// 平台兜底凭证
    Platform,
}

impl CredentialSource {
    /// 日志字段使用的名称
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Caller => "caller",
            Self::Tenant => "tenant",
            Self::Platform => "platform",
        }
    }
}

/// 已解析的凭证：来源与注入值
#[derive(Debug, Clone)]
pub struct ResolvedCredential {
    /// 凭证来源
    pub source: CredentialSource,
    /// 注入上游请求的凭证值
    pub secret: String,
}

/// 单次入站请求携带的身份信息
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    /// 客户端 IP
    pub client_ip: IpAddr,
    /// Origin 头
    pub origin: Option<String>,
    /// 调用方自带凭证
    pub caller_credential: Option<String>,
    /// 挑战令牌（头或请求体保留字段）
    pub challenge_token: Option<String>,
    /// 请求的模型覆盖
    pub requested_model: Option<String>,
    /// 请求的提供商覆盖
    pub requested_provider: Option<String>,
}

/// 凭证引用（环境变量名）的解析抽象；测试注入假实现
pub trait SecretResolver: Send + Sync {
    /// 解析凭证引用；空值视为未设置
    fn resolve(&self, name: &str) -> Option<String>;
}

/// 从进程环境变量解析凭证
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSecretResolver;

impl SecretResolver for EnvSecretResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|v| !v.is_empty())
    }
}

/// 基于内存映射的解析器，测试用
#[derive(Debug, Clone, Default)]
pub struct MapSecretResolver {
    secrets: HashMap<String, String>,
}

impl MapSecretResolver {
    /// 从键值对构建
    #[must_use]
    pub fn new<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            secrets: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

impl SecretResolver for MapSecretResolver {
    fn resolve(&self, name: &str) -> Option<String> {
        self.secrets.get(name).filter(|v| !v.is_empty()).cloned()
    }
}
