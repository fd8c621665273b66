//! # API 响应结构
//!
//! 网关自产响应的标准 JSON 格式。后端中继响应不走这里，原样透传。

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, warn};

use crate::error::GatewayError;

/// # 标准成功响应
#[derive(Debug, Serialize)]
pub struct SuccessResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// # 标准错误信息
#[derive(Debug, Serialize)]
pub struct ErrorInfo {
    pub code: String,
    pub message: String,
}

/// # 标准错误响应
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub error: ErrorInfo,
    pub timestamp: DateTime<Utc>,
}

/// # API 响应枚举
///
/// 统一网关自产出口，方便转换为 `axum::response::Response`
#[derive(Debug)]
pub enum ApiResponse<T: Serialize> {
    Success(T),
    SuccessWithMessage(T, String),
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        let (data, message) = match self {
            ApiResponse::Success(data) => (data, None),
            ApiResponse::SuccessWithMessage(data, message) => (data, Some(message)),
        };
        (
            StatusCode::OK,
            Json(SuccessResponse {
                success: true,
                data: Some(data),
                message,
                timestamp: Utc::now(),
            }),
        )
            .into_response()
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = self.to_http_response_parts();

        // 运维侧记录完整错误链,客户端只拿到稳定的 code 与面向用户的 message
        if self.is_client_error() {
            warn!(code = code, error = %self, "Request rejected");
        } else {
            error!(code = code, error = ?self, "Request failed");
        }

        let body = ErrorResponse {
            success: false,
            error: ErrorInfo {
                code: code.to_string(),
                message: self.to_string(),
            },
            timestamp: Utc::now(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::StatusCode;

    #[test]
    fn rate_limit_errors_map_to_429() {
        let error = GatewayError::rate_limited("minute", "Rate limit exceeded (per minute)");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn origin_rejection_maps_to_403() {
        let error = GatewayError::origin_rejected("Origin not allowed");
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
    }
}
