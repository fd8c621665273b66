//! # 网关服务器
//!
//! Axum HTTP 服务器,装配共享上下文并监听入站流量

use std::net::SocketAddr;
use std::ops::Deref;
use std::sync::Arc;

use axum::middleware;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::auth::types::SecretResolver;
use crate::auth::{
    ChallengeVerifier, DurableCounter, MemoryHourCounter, MemoryMinuteCounter, OriginAuthorizer,
    RateLimiter,
};
use crate::cache::RedisCounterStore;
use crate::config::{AppConfig, TenantRegistry};
use crate::error::{GatewayError, Result};
use crate::proxy::{ModelSelector, RequestProxy};

use super::middleware::{client_ip_middleware, cors_middleware};
use super::routes;

/// 全局共享上下文,启动时装配一次
pub struct AppContext {
    /// 应用配置
    pub config: AppConfig,
    /// 租户注册表
    pub tenants: TenantRegistry,
    /// 来源授权器
    pub origin: OriginAuthorizer,
    /// 模型选择器
    pub selector: ModelSelector,
    /// 双窗口速率限制器
    pub limiter: RateLimiter,
    /// 人机挑战校验器
    pub challenge: ChallengeVerifier,
    /// 后端转发器
    pub proxy: RequestProxy,
    /// Redis 计数存储句柄,仅健康检查探测用;未配置时为 None
    pub counter_store: Option<RedisCounterStore>,
}

impl AppContext {
    /// 装配上下文。Redis 未配置时小时计数退化为进程内存,重启即清零。
    pub async fn build(
        config: AppConfig,
        tenants: TenantRegistry,
        resolver: Arc<dyn SecretResolver>,
    ) -> Result<Self> {
        let mut counter_store = None;
        let durable: Arc<dyn DurableCounter> = match &config.redis {
            Some(redis_config) => {
                let store = RedisCounterStore::connect(redis_config).await?;
                counter_store = Some(store.clone());
                Arc::new(store)
            }
            None => {
                warn!(
                    "redis is not configured, hour counters are process-local and reset \
                     on restart"
                );
                Arc::new(MemoryHourCounter::new())
            }
        };

        let limiter = RateLimiter::new(
            Arc::new(MemoryMinuteCounter::new()),
            durable,
            config.rate_limit.per_minute,
            config.rate_limit.per_hour,
        );
        let origin = OriginAuthorizer::new(
            config.defaults.platform_credential_env.clone(),
            Arc::clone(&resolver),
        );
        let selector = ModelSelector::new(&config.defaults);
        let challenge = ChallengeVerifier::new(&config.challenge, &resolver)?;
        let proxy = RequestProxy::new(&config.backend)?;

        info!(
            tenants = tenants.len(),
            challenge_enabled = challenge.is_enabled(),
            backend = %config.backend.url,
            "gateway context assembled"
        );

        Ok(Self {
            config,
            tenants,
            origin,
            selector,
            limiter,
            challenge,
            proxy,
            counter_store,
        })
    }
}

/// 处理器共享状态
#[derive(Clone)]
pub struct AppState(pub Arc<AppContext>);

impl Deref for AppState {
    type Target = AppContext;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<Arc<AppContext>> for AppState {
    fn from(context: Arc<AppContext>) -> Self {
        Self(context)
    }
}

/// 网关服务器
pub struct GatewayServer {
    context: Arc<AppContext>,
}

impl GatewayServer {
    /// 创建服务器
    #[must_use]
    pub fn new(context: Arc<AppContext>) -> Self {
        Self { context }
    }

    /// 构建完整的路由树,含中间件栈
    #[must_use]
    pub fn router(&self) -> axum::Router {
        routes::build_router(AppState(Arc::clone(&self.context)))
            .layer(middleware::from_fn(cors_middleware))
            .layer(middleware::from_fn(client_ip_middleware))
            .layer(TraceLayer::new_for_http())
    }

    /// 绑定端口并开始服务,直到进程退出
    pub async fn serve(self) -> Result<()> {
        let addr: SocketAddr = format!(
            "{}:{}",
            self.context.config.server.bind_address, self.context.config.server.port
        )
        .parse()
        .map_err(|e| GatewayError::config_with_source("Invalid bind address", e))?;

        let app = self.router();
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            GatewayError::config_with_source(format!("Failed to bind {addr}"), e)
        })?;
        info!(addr = %addr, "gateway listening");

        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .map_err(|e| GatewayError::internal_with_source("Server terminated abnormally", e))
    }
}
