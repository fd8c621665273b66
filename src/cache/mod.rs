//! # 计数存储模块
//!
//! 速率限制计数的键规范与 Redis 客户端

pub mod client;
pub mod keys;

pub use client::RedisCounterStore;
pub use keys::{CounterKey, Window};
