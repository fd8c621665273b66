//! # 租户策略与注册表
//!
//! 租户（社区）配置由外部配置系统产出；网关启动时一次性构建不可变注册表，
//! 请求期只做只读查询。

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{GatewayError, Result};

/// 非租户路由段，永远不可作为租户标识
pub const RESERVED_SEGMENTS: &[&str] = &[
    "health", "version", "metrics", "feedback", "ping", "api", "docs", "static",
];

static TENANT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]{1,50}$").unwrap_or_else(|e| panic!("{e}")));

/// 单个租户的策略配置，请求生命周期内不可变
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TenantPolicy {
    /// 租户标识
    pub tenant_id: String,
    /// 允许的来源模式：精确 origin 或 `scheme://*.domain` 子域通配
    #[serde(default)]
    pub allowed_origins: Vec<String>,
    /// 租户默认模型（覆盖平台默认）
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model: Option<String>,
    /// 租户默认提供商路由提示
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_model_provider: Option<String>,
    /// 租户自有凭证所在的环境变量名；缺省时使用平台凭证
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credential_env: Option<String>,
}

/// 判断路径段是否为保留路由名
#[must_use]
pub fn is_reserved_segment(segment: &str) -> bool {
    RESERVED_SEGMENTS.contains(&segment)
}

/// 校验租户标识的形状；保留名先于形状检查被拒绝
#[must_use]
pub fn is_valid_tenant_id(tenant_id: &str) -> bool {
    if is_reserved_segment(tenant_id) {
        return false;
    }
    TENANT_ID_RE.is_match(tenant_id)
}

/// 不可变租户注册表，进程启动时构建一次
#[derive(Debug, Clone, Default)]
pub struct TenantRegistry {
    tenants: HashMap<String, Arc<TenantPolicy>>,
}

impl TenantRegistry {
    /// 从策略列表构建注册表，拒绝非法或重复的租户标识
    pub fn from_policies(policies: Vec<TenantPolicy>) -> Result<Self> {
        let mut tenants = HashMap::with_capacity(policies.len());
        for policy in policies {
            if !is_valid_tenant_id(&policy.tenant_id) {
                return Err(GatewayError::config(format!(
                    "Invalid tenant id '{}': must match [A-Za-z0-9_-]{{1,50}} and not be a reserved route name",
                    policy.tenant_id
                )));
            }
            let id = policy.tenant_id.clone();
            if tenants.insert(id.clone(), Arc::new(policy)).is_some() {
                return Err(GatewayError::config(format!("Duplicate tenant id '{id}'")));
            }
        }
        Ok(Self { tenants })
    }

    /// 查询租户策略
    #[must_use]
    pub fn get(&self, tenant_id: &str) -> Option<Arc<TenantPolicy>> {
        self.tenants.get(tenant_id).cloned()
    }

    /// 注册表内租户数量
    #[must_use]
    pub fn len(&self) -> usize {
        self.tenants.len()
    }

    /// 注册表是否为空
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tenants.is_empty()
    }
}

/// `tenants.toml` 的文件结构
#[derive(Debug, Deserialize)]
pub struct TenantsFile {
    /// 租户策略列表
    #[serde(default)]
    pub tenants: Vec<TenantPolicy>,
}
