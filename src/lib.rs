//! # OSA Gateway Library
//!
//! 多租户 AI 助手平台的网络边缘网关核心库

pub mod auth;
pub mod cache;
pub mod config;
pub mod error;
pub mod gateway;
pub mod logging;
pub mod proxy;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{GatewayError, Result};
