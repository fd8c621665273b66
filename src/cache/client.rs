//! # Redis 计数客户端
//!
//! 小时窗口计数的持久存储。所有命令都带有单次操作超时，超时与命令错误
//! 一律上抛为计数存储错误，由调用方决定放行策略。

use std::future::Future;
use std::time::Duration;

use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::cache::keys::CounterKey;
use crate::config::RedisConfig;
use crate::error::{GatewayError, Result};

/// 基于 Redis 的窗口计数存储
#[derive(Clone)]
pub struct RedisCounterStore {
    conn: ConnectionManager,
    op_timeout: Duration,
}

impl RedisCounterStore {
    /// 建立连接并返回存储句柄
    pub async fn connect(config: &RedisConfig) -> Result<Self> {
        let client = redis::Client::open(config.url.as_str())
            .map_err(|e| GatewayError::cache_with_source("Failed to create redis client", e))?;

        let connect = ConnectionManager::new(client);
        let conn = tokio::time::timeout(Duration::from_secs(config.connection_timeout), connect)
            .await
            .map_err(|_| GatewayError::cache("Redis connection timed out"))?
            .map_err(|e| GatewayError::cache_with_source("Failed to connect to redis", e))?;

        Ok(Self {
            conn,
            op_timeout: Duration::from_millis(config.operation_timeout_ms),
        })
    }

    /// 对单条命令施加操作超时
    async fn bounded<T, F>(&self, op: &'static str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        tokio::time::timeout(self.op_timeout, fut)
            .await
            .map_err(|_| GatewayError::cache(format!("Redis {op} timed out")))?
            .map_err(|e| GatewayError::cache_with_source(format!("Redis {op} failed"), e))
    }

    /// 读取当前窗口计数；键不存在视为 0
    pub async fn get_count(&self, key: &CounterKey) -> Result<u64> {
        let mut conn = self.conn.clone();
        let key_str = key.build();
        let value: Option<u64> = self.bounded("GET", conn.get(&key_str)).await?;
        Ok(value.unwrap_or(0))
    }

    /// 原子自增计数；首次创建时设置键的过期时间
    pub async fn incr_with_ttl(&self, key: &CounterKey) -> Result<i64> {
        let mut conn = self.conn.clone();
        let key_str = key.build();
        let value: i64 = self.bounded("INCR", conn.incr(&key_str, 1i64)).await?;

        if value == 1 {
            #[allow(clippy::cast_possible_wrap)]
            let ttl_secs = key.ttl().as_secs() as i64;
            let _: () = self.bounded("EXPIRE", conn.expire(&key_str, ttl_secs)).await?;
        }

        Ok(value)
    }

    /// 连通性探测，用于健康检查
    pub async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = self
            .bounded("PING", redis::cmd("PING").query_async(&mut conn))
            .await?;
        Ok(())
    }
}
