//! # 错误类型定义

use axum::http::StatusCode;
use thiserror::Error;

/// 后端传输失败的分类，决定映射到哪个网关状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendErrorKind {
    /// 后端响应超时
    Timeout,
    /// DNS 解析或连接失败
    Connect,
    /// 协议错误（例如期望 JSON 却收到非 JSON）
    Protocol,
    /// 其他传输错误
    Other,
}

impl BackendErrorKind {
    /// 对应的 HTTP 状态码
    #[must_use]
    pub const fn status_code(self) -> StatusCode {
        match self {
            Self::Timeout => StatusCode::GATEWAY_TIMEOUT,
            Self::Connect => StatusCode::SERVICE_UNAVAILABLE,
            Self::Protocol => StatusCode::BAD_GATEWAY,
            Self::Other => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 对应的机器可读错误码
    #[must_use]
    pub const fn error_code(self) -> &'static str {
        match self {
            Self::Timeout => "BACKEND_TIMEOUT",
            Self::Connect => "BACKEND_UNREACHABLE",
            Self::Protocol => "BACKEND_PROTOCOL_ERROR",
            Self::Other => "BACKEND_ERROR",
        }
    }
}

/// 网关主要错误类型
#[derive(Debug, Error)]
pub enum GatewayError {
    /// 配置相关错误
    #[error("Configuration error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 租户不存在或路径段不是合法的租户标识
    #[error("Unknown tenant '{tenant_id}'")]
    TenantNotFound { tenant_id: String },

    /// 来源未授权且未携带调用方凭证
    #[error("{message}")]
    OriginRejected { message: String },

    /// 请求了非默认模型但未携带调用方凭证
    #[error("{message}")]
    CredentialRequiredForModel { model: String, message: String },

    /// 模型名称不符合保守的格式约束
    #[error("Invalid model name: {message}")]
    InvalidModel { message: String },

    /// 人机挑战校验失败或缺失
    #[error("{message}")]
    ChallengeFailed { message: String },

    /// 命中速率限制
    #[error("Rate limit exceeded ({window}): {message}")]
    RateLimited { window: String, message: String },

    /// 后端服务传输失败
    #[error("Backend unavailable: {message}")]
    Backend {
        kind: BackendErrorKind,
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 计数存储错误（速率限制的持久层）
    #[error("Counter store error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },

    /// 序列化/反序列化错误
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO 错误
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// 内部错误
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        #[source]
        source: Option<anyhow::Error>,
    },
}

impl GatewayError {
    /// 映射为 HTTP 状态码和机器可读错误码
    #[must_use]
    pub fn to_http_response_parts(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIGURATION_ERROR"),
            Self::TenantNotFound { .. } => (StatusCode::NOT_FOUND, "TENANT_NOT_FOUND"),
            Self::OriginRejected { .. } => (StatusCode::FORBIDDEN, "ORIGIN_REJECTED"),
            Self::CredentialRequiredForModel { .. } => {
                (StatusCode::FORBIDDEN, "CREDENTIAL_REQUIRED_FOR_MODEL")
            }
            Self::InvalidModel { .. } => (StatusCode::BAD_REQUEST, "INVALID_MODEL"),
            Self::ChallengeFailed { .. } => (StatusCode::FORBIDDEN, "CHALLENGE_FAILED"),
            Self::RateLimited { .. } => (StatusCode::TOO_MANY_REQUESTS, "RATE_LIMITED"),
            Self::Backend { kind, .. } => (kind.status_code(), kind.error_code()),
            Self::Cache { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "COUNTER_STORE_ERROR"),
            Self::Serialization(_) => (StatusCode::BAD_REQUEST, "SERIALIZATION_ERROR"),
            Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// 创建配置错误
    pub fn config<T: Into<String>>(message: T) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带有源错误的配置错误
    pub fn config_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建租户不存在错误
    pub fn tenant_not_found<T: Into<String>>(tenant_id: T) -> Self {
        Self::TenantNotFound {
            tenant_id: tenant_id.into(),
        }
    }

    /// 创建来源拒绝错误
    pub fn origin_rejected<T: Into<String>>(message: T) -> Self {
        Self::OriginRejected {
            message: message.into(),
        }
    }

    /// 创建"自定义模型需要调用方凭证"错误
    pub fn credential_required_for_model<M: Into<String>, T: Into<String>>(
        model: M,
        message: T,
    ) -> Self {
        Self::CredentialRequiredForModel {
            model: model.into(),
            message: message.into(),
        }
    }

    /// 创建模型名称格式错误
    pub fn invalid_model<T: Into<String>>(message: T) -> Self {
        Self::InvalidModel {
            message: message.into(),
        }
    }

    /// 创建挑战校验失败错误
    pub fn challenge_failed<T: Into<String>>(message: T) -> Self {
        Self::ChallengeFailed {
            message: message.into(),
        }
    }

    /// 创建速率限制错误
    pub fn rate_limited<W: Into<String>, T: Into<String>>(window: W, message: T) -> Self {
        Self::RateLimited {
            window: window.into(),
            message: message.into(),
        }
    }

    /// 创建后端传输错误
    pub fn backend<T: Into<String>>(kind: BackendErrorKind, message: T) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
            source: None,
        }
    }

    /// 创建带有源错误的后端传输错误；源错误保留给运维诊断日志
    pub fn backend_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        kind: BackendErrorKind,
        message: T,
        source: E,
    ) -> Self {
        Self::Backend {
            kind,
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建计数存储错误
    pub fn cache<T: Into<String>>(message: T) -> Self {
        Self::Cache {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带有源错误的计数存储错误
    pub fn cache_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Cache {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 创建内部错误
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal {
            message: message.into(),
            source: None,
        }
    }

    /// 创建带有源错误的内部错误
    pub fn internal_with_source<T: Into<String>, E: Into<anyhow::Error>>(
        message: T,
        source: E,
    ) -> Self {
        Self::Internal {
            message: message.into(),
            source: Some(source.into()),
        }
    }

    /// 是否属于客户端错误（4xx），用于日志分级
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        self.to_http_response_parts().0.is_client_error()
    }
}
