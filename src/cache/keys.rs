//! # 计数键命名规范
//!
//! 定义速率限制计数键的统一生成策略。键格式为
//! `rl:<window>:<client_ip>:<window_index>`，TTL 为窗口长度的两倍以容忍
//! 实例间时钟偏差。

use std::fmt;
use std::net::IpAddr;
use std::time::Duration;

/// 速率限制窗口
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Window {
    /// 每分钟窗口（进程内快速计数）
    Minute,
    /// 每小时窗口（跨实例持久计数）
    Hour,
}

impl Window {
    /// 窗口长度（秒）
    #[must_use]
    pub const fn secs(self) -> u64 {
        match self {
            Self::Minute => 60,
            Self::Hour => 3_600,
        }
    }

    /// 键中使用的窗口名
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
        }
    }

    /// 面向调用者的窗口描述（限流原因）
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Minute => "per minute",
            Self::Hour => "per hour",
        }
    }

    /// 给定 Unix 时间戳所在的窗口序号
    #[must_use]
    pub const fn index(self, unix_secs: u64) -> u64 {
        unix_secs / self.secs()
    }

    /// 计数键的过期时间：窗口长度的两倍
    #[must_use]
    pub const fn ttl(self) -> Duration {
        Duration::from_secs(self.secs() * 2)
    }
}

/// 计数键
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CounterKey {
    /// 速率限制窗口计数 - `rl:{window}:{client_ip}:{index}`
    RateWindow {
        window: Window,
        client_ip: IpAddr,
        index: u64,
    },
}

impl CounterKey {
    /// 构建给定时间点的窗口计数键
    #[must_use]
    pub const fn rate_window(window: Window, client_ip: IpAddr, unix_secs: u64) -> Self {
        Self::RateWindow {
            window,
            client_ip,
            index: window.index(unix_secs),
        }
    }

    /// 生成计数键字符串
    #[must_use]
    pub fn build(&self) -> String {
        match self {
            Self::RateWindow {
                window,
                client_ip,
                index,
            } => format!("rl:{}:{client_ip}:{index}", window.as_str()),
        }
    }

    /// 该键的过期时间
    #[must_use]
    pub const fn ttl(&self) -> Duration {
        match self {
            Self::RateWindow { window, .. } => window.ttl(),
        }
    }
}

impl fmt::Display for CounterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.build())
    }
}
