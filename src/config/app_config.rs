//! # 应用配置结构定义

use serde::{Deserialize, Serialize};

/// 应用主配置结构
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP 服务器配置
    #[serde(default)]
    pub server: ServerConfig,
    /// 后端服务配置
    pub backend: BackendConfig,
    /// 平台级模型与凭证默认值
    pub defaults: ModelDefaults,
    /// 速率限制配置
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    /// Redis 配置（小时窗口计数的持久存储；缺省时退化为进程内计数）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redis: Option<RedisConfig>,
    /// 人机挑战校验配置
    #[serde(default)]
    pub challenge: ChallengeConfig,
}

/// HTTP 服务器配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// 监听地址
    pub bind_address: String,
    /// 监听端口
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
        }
    }
}

/// 后端服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendConfig {
    /// 后端基础 URL
    pub url: String,
    /// 代理调用超时（秒）；模型生成可能耗时数分钟
    #[serde(default = "default_backend_timeout")]
    pub timeout_seconds: u64,
    /// 透传后端错误响应体的大小上限（字节）
    #[serde(default = "default_max_error_body")]
    pub max_error_body_bytes: usize,
}

const fn default_backend_timeout() -> u64 {
    300
}

const fn default_max_error_body() -> usize {
    64 * 1024
}

/// 平台级模型与凭证默认值
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDefaults {
    /// 平台默认模型
    pub default_model: String,
    /// 平台默认提供商路由提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_provider: Option<String>,
    /// 平台凭证所在的环境变量名
    #[serde(default = "default_platform_credential_env")]
    pub platform_credential_env: String,
}

fn default_platform_credential_env() -> String {
    "OPENROUTER_API_KEY".to_string()
}

/// 速率限制配置
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// 每分钟请求上限（进程内快速计数）
    pub per_minute: u32,
    /// 每小时请求上限（跨实例持久计数）
    pub per_hour: u32,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            per_minute: 10,
            per_hour: 100,
        }
    }
}

/// Redis 配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    /// Redis 连接 URL
    pub url: String,
    /// 连接超时（秒）
    #[serde(default = "default_redis_connection_timeout")]
    pub connection_timeout: u64,
    /// 单次命令超时（毫秒）；超过即视为存储故障并放行请求
    #[serde(default = "default_redis_operation_timeout")]
    pub operation_timeout_ms: u64,
}

const fn default_redis_connection_timeout() -> u64 {
    10
}

const fn default_redis_operation_timeout() -> u64 {
    500
}

/// 人机挑战校验配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChallengeConfig {
    /// 外部校验服务地址
    pub verify_url: String,
    /// 校验密钥所在的环境变量名；未设置密钥时跳过校验（开发模式）
    pub secret_env: String,
    /// 校验调用超时（毫秒），亚秒级
    pub timeout_ms: u64,
}

impl Default for ChallengeConfig {
    fn default() -> Self {
        Self {
            verify_url: "https://challenges.cloudflare.com/turnstile/v0/siteverify".to_string(),
            secret_env: "TURNSTILE_SECRET_KEY".to_string(),
            timeout_ms: 800,
        }
    }
}

impl AppConfig {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<(), String> {
        if self.server.port == 0 {
            return Err(format!("Invalid server port: {}", self.server.port));
        }

        if self.backend.url.is_empty() {
            return Err("Backend URL cannot be empty".to_string());
        }
        if !self.backend.url.starts_with("http://") && !self.backend.url.starts_with("https://") {
            return Err(format!(
                "Backend URL must be http(s): {}",
                self.backend.url
            ));
        }
        if self.backend.timeout_seconds == 0 {
            return Err("Backend timeout must be greater than 0".to_string());
        }

        if self.defaults.default_model.is_empty() {
            return Err("Platform default model cannot be empty".to_string());
        }

        if self.rate_limit.per_minute == 0 || self.rate_limit.per_hour == 0 {
            return Err("Rate limits must be greater than 0".to_string());
        }
        if self.rate_limit.per_hour < self.rate_limit.per_minute {
            return Err("per_hour limit must be >= per_minute limit".to_string());
        }

        if let Some(redis) = &self.redis {
            if redis.url.is_empty() {
                return Err("Redis URL cannot be empty".to_string());
            }
        }

        if self.challenge.timeout_ms == 0 || self.challenge.timeout_ms > 5_000 {
            return Err("Challenge timeout must be within (0, 5000] ms".to_string());
        }

        Ok(())
    }
}
