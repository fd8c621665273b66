//! # 双窗口速率限制
//!
//! 每个客户端 IP 两条独立计数：分钟窗口走进程内快速计数（允许重启归零，
//! 只用于探测机器人速度），小时窗口走跨实例持久计数（人类滥用预算）。
//!
//! 检查顺序：先只读检查小时计数，再消耗分钟令牌，两者都通过后才对小时
//! 计数做唯一一次持久自增。小时预算已耗尽时不再花费分钟令牌。
//!
//! 放行策略表：
//! - 持久存储命令失败或超时 → 放行（fail open）
//! - 快速计数错误 → 放行（fail open）
//! - 任一窗口计数达到上限 → 拒绝（fail closed）
//!
//! 已知且保留的限制：小时窗口的读-增不是原子操作，同一 IP 的并发突发
//! 最多可超出小时上限（分钟上限）个请求。这个界是可接受的，不要用全局
//! 锁"修复"它。

use std::net::IpAddr;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::warn;

use crate::cache::keys::{CounterKey, Window};
use crate::cache::RedisCounterStore;
use crate::error::Result;

/// 进程内快速计数接口（近似、低延迟，可随重启归零）
#[async_trait]
pub trait FastCounter: Send + Sync {
    /// 消耗一个窗口令牌；返回消耗后是否仍在限额内
    async fn check_and_increment(
        &self,
        client_ip: IpAddr,
        limit: u32,
        unix_secs: u64,
    ) -> Result<bool>;
}

/// 跨实例持久计数接口（权威、全局可见）
#[async_trait]
pub trait DurableCounter: Send + Sync {
    /// 读取当前窗口计数（只读）
    async fn current(&self, key: &CounterKey) -> Result<u64>;

    /// 自增当前窗口计数并保证键会过期
    async fn increment(&self, key: &CounterKey) -> Result<i64>;
}

/// 基于 `DashMap` 的分钟窗口计数
#[derive(Debug, Default)]
pub struct MemoryMinuteCounter {
    counts: DashMap<(IpAddr, u64), u32>,
}

impl MemoryMinuteCounter {
    /// 创建空计数器
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FastCounter for MemoryMinuteCounter {
    async fn check_and_increment(
        &self,
        client_ip: IpAddr,
        limit: u32,
        unix_secs: u64,
    ) -> Result<bool> {
        let index = Window::Minute.index(unix_secs);
        let count = {
            let mut entry = self.counts.entry((client_ip, index)).or_insert(0);
            *entry += 1;
            *entry
        };

        // 新窗口首个请求时顺带清理已过期的窗口条目
        if count == 1 {
            self.counts.retain(|(_, idx), _| idx + 1 >= index);
        }

        Ok(count <= limit)
    }
}

/// 进程内的小时窗口计数，单实例部署与测试用；多副本部署必须配置 Redis
#[derive(Debug, Default)]
pub struct MemoryHourCounter {
    counts: DashMap<CounterKey, u64>,
}

impl MemoryHourCounter {
    /// 创建空计数器
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DurableCounter for MemoryHourCounter {
    async fn current(&self, key: &CounterKey) -> Result<u64> {
        Ok(self.counts.get(key).map_or(0, |entry| *entry))
    }

    async fn increment(&self, key: &CounterKey) -> Result<i64> {
        let value = {
            let mut entry = self.counts.entry(key.clone()).or_insert(0);
            *entry += 1;
            *entry
        };

        if value == 1 {
            let CounterKey::RateWindow { index, .. } = *key;
            self.counts.retain(|stored, _| {
                let CounterKey::RateWindow { index: stored_index, .. } = stored;
                stored_index + 1 >= index
            });
        }

        #[allow(clippy::cast_possible_wrap)]
        Ok(value as i64)
    }
}

#[async_trait]
impl DurableCounter for RedisCounterStore {
    async fn current(&self, key: &CounterKey) -> Result<u64> {
        self.get_count(key).await
    }

    async fn increment(&self, key: &CounterKey) -> Result<i64> {
        self.incr_with_ttl(key).await
    }
}

/// 速率检查结论
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitVerdict {
    /// 放行
    Allowed,
    /// 命中限制的窗口
    Limited {
        /// 触发限制的窗口
        window: Window,
    },
}

/// 双窗口速率限制器
pub struct RateLimiter {
    fast: Arc<dyn FastCounter>,
    durable: Arc<dyn DurableCounter>,
    per_minute: u32,
    per_hour: u32,
}

impl RateLimiter {
    /// 组装限制器
    pub fn new(
        fast: Arc<dyn FastCounter>,
        durable: Arc<dyn DurableCounter>,
        per_minute: u32,
        per_hour: u32,
    ) -> Self {
        Self {
            fast,
            durable,
            per_minute,
            per_hour,
        }
    }

    /// 检查并记账一次请求。存储故障一律放行，绝不因限流层故障阻断流量。
    pub async fn check(&self, client_ip: IpAddr) -> RateLimitVerdict {
        let unix_secs = now_unix_secs();
        let hour_key = CounterKey::rate_window(Window::Hour, client_ip, unix_secs);

        // 小时预算先行，只读：预算已尽时不消耗分钟令牌
        match self.durable.current(&hour_key).await {
            Ok(count) if count >= u64::from(self.per_hour) => {
                return RateLimitVerdict::Limited {
                    window: Window::Hour,
                };
            }
            Ok(_) => {}
            Err(e) => {
                warn!(
                    client_ip = %client_ip,
                    fail_open = true,
                    error = %e,
                    "durable hour counter unavailable, allowing request"
                );
            }
        }

        match self
            .fast
            .check_and_increment(client_ip, self.per_minute, unix_secs)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                return RateLimitVerdict::Limited {
                    window: Window::Minute,
                };
            }
            Err(e) => {
                warn!(
                    client_ip = %client_ip,
                    fail_open = true,
                    error = %e,
                    "fast minute counter failed, allowing request"
                );
            }
        }

        // 两个检查都通过后才写一次持久计数；不退款，失败的上游调用同样计费
        if let Err(e) = self.durable.increment(&hour_key).await {
            warn!(
                client_ip = %client_ip,
                fail_open = true,
                error = %e,
                "failed to record hour counter increment"
            );
        }

        RateLimitVerdict::Allowed
    }
}

fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_secs())
}
