//! # 转发模块
//!
//! 模型路由解析与后端请求转发

pub mod forwarder;
pub mod provider_resolver;

pub use forwarder::RequestProxy;
pub use provider_resolver::{ModelChoice, ModelSelector};
