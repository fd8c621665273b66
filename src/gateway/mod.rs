//! # 网关服务模块
//!
//! HTTP 入口:服务器装配、路由、中间件、处理器与响应格式

pub mod handlers;
pub mod middleware;
pub mod response;
pub mod routes;
pub mod server;

pub use response::ApiResponse;
pub use server::{AppContext, AppState, GatewayServer};
