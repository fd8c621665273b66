//! # 配置管理模块
//!
//! 处理应用配置与租户策略的加载和验证

mod app_config;
mod tenant;

pub use app_config::{
    AppConfig, BackendConfig, ChallengeConfig, ModelDefaults, RateLimitConfig, RedisConfig,
    ServerConfig,
};
pub use tenant::{
    RESERVED_SEGMENTS, TenantPolicy, TenantRegistry, TenantsFile, is_reserved_segment,
    is_valid_tenant_id,
};

use std::env;
use std::path::Path;

/// 加载配置文件
pub fn load_config() -> crate::error::Result<AppConfig> {
    let env = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
    let config_file = format!("config/config.{env}.toml");

    if !Path::new(&config_file).exists() {
        return Err(crate::config_error!("Config file not found: {config_file}"));
    }

    let config_content = std::fs::read_to_string(&config_file).map_err(|e| {
        crate::error::GatewayError::config_with_source(
            format!("Failed to read config file: {config_file}"),
            e,
        )
    })?;

    let config: AppConfig = toml::from_str(&config_content).map_err(|e| {
        crate::error::GatewayError::config_with_source(
            format!("Failed to parse config file: {config_file}"),
            e,
        )
    })?;

    config.validate().map_err(crate::error::GatewayError::config)?;

    Ok(config)
}

/// 加载租户策略文件并构建注册表
pub fn load_tenants(path: &str) -> crate::error::Result<TenantRegistry> {
    if !Path::new(path).exists() {
        return Err(crate::config_error!("Tenants file not found: {path}"));
    }

    let content = std::fs::read_to_string(path).map_err(|e| {
        crate::error::GatewayError::config_with_source(
            format!("Failed to read tenants file: {path}"),
            e,
        )
    })?;

    let file: TenantsFile = toml::from_str(&content).map_err(|e| {
        crate::error::GatewayError::config_with_source(
            format!("Failed to parse tenants file: {path}"),
            e,
        )
    })?;

    TenantRegistry::from_policies(file.tenants)
}
