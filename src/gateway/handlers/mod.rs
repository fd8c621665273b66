//! # 请求处理器
//!
//! 按业务域拆分:租户对话流水线、指标透传、系统自检

use std::net::IpAddr;

use crate::auth::RateLimitVerdict;
use crate::error::{GatewayError, Result};
use crate::gateway::server::AppState;

pub mod metrics;
pub mod system;
pub mod tenant;

/// 统一的限流闸门。除 health/version 外的所有路由都要经过这里,
/// 自带凭证的请求也不例外:BYOC 豁免的是挑战校验,不是限流。
pub(crate) async fn enforce_rate_limit(state: &AppState, client_ip: IpAddr) -> Result<()> {
    if let RateLimitVerdict::Limited { window } = state.limiter.check(client_ip).await {
        return Err(GatewayError::rate_limited(
            window.as_str(),
            format!("Rate limit exceeded ({}). Slow down.", window.reason()),
        ));
    }
    Ok(())
}
