//! # OSA Gateway 主程序
//!
//! 多租户 AI 助手平台的网络边缘网关

use std::env;
use std::sync::Arc;

use osa_gateway::auth::EnvSecretResolver;
use osa_gateway::config;
use osa_gateway::gateway::{AppContext, GatewayServer};
use osa_gateway::logging;
use osa_gateway::Result;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    // 初始化日志系统
    logging::init_logging(None);

    let app_config = config::load_config()?;
    let tenants_path =
        env::var("TENANTS_FILE").unwrap_or_else(|_| "config/tenants.toml".to_string());
    let tenants = config::load_tenants(&tenants_path)?;

    info!(
        tenants_file = %tenants_path,
        tenants = tenants.len(),
        "configuration loaded"
    );

    let context = AppContext::build(app_config, tenants, Arc::new(EnvSecretResolver)).await?;
    let server = GatewayServer::new(Arc::new(context));

    if let Err(e) = server.serve().await {
        error!(error = ?e, "gateway terminated abnormally");
        std::process::exit(1);
    }

    info!("gateway shut down");
    Ok(())
}
