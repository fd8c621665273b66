//! # 模型与提供商路由解析
//!
//! 解析本次请求实际使用的模型与提供商路由提示。非默认模型必须由调用方
//! 自带凭证，绝不静默回退为默认模型。

use std::sync::LazyLock;

use regex::Regex;

use crate::auth::types::CredentialSource;
use crate::config::{ModelDefaults, TenantPolicy};
use crate::error::{GatewayError, Result};

/// 保守的模型名形状：`creator/model-name` 形式的受限字符集，
/// 防止把攻击者可控的任意字符串透传进下游路由参数
static MODEL_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.-]{0,63}/[A-Za-z0-9][A-Za-z0-9_.:-]{0,63}$")
        .unwrap_or_else(|e| panic!("{e}"))
});

/// 解析结果：模型与可选的提供商路由提示
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelChoice {
    /// 实际使用的模型
    pub model: String,
    /// 提供商路由提示；自定义模型没有提示
    pub provider: Option<String>,
}

/// 模型选择器
pub struct ModelSelector {
    platform_default: String,
    platform_provider: Option<String>,
}

impl ModelSelector {
    /// 从平台默认值创建
    pub fn new(defaults: &ModelDefaults) -> Self {
        Self {
            platform_default: defaults.default_model.clone(),
            platform_provider: defaults.default_model_provider.clone(),
        }
    }

    /// 租户生效的默认模型与提供商
    fn effective_default<'a>(&'a self, policy: &'a TenantPolicy) -> (&'a str, Option<&'a str>) {
        match &policy.default_model {
            Some(model) => (model.as_str(), policy.default_model_provider.as_deref()),
            None => (
                self.platform_default.as_str(),
                self.platform_provider.as_deref(),
            ),
        }
    }

    /// 解析本次请求的模型选择
    pub fn select(
        &self,
        policy: &TenantPolicy,
        requested_model: Option<&str>,
        credential_source: CredentialSource,
    ) -> Result<ModelChoice> {
        let (default_model, default_provider) = self.effective_default(policy);

        let requested = match requested_model {
            None => {
                return Ok(ModelChoice {
                    model: default_model.to_string(),
                    provider: default_provider.map(ToString::to_string),
                });
            }
            Some(requested) if requested == default_model => {
                return Ok(ModelChoice {
                    model: default_model.to_string(),
                    provider: default_provider.map(ToString::to_string),
                });
            }
            Some(requested) => requested,
        };

        if credential_source != CredentialSource::Caller {
            return Err(GatewayError::credential_required_for_model(
                requested,
                format!(
                    "Custom model '{requested}' requires your own API key. Supply it via \
                     the X-OpenRouter-Key header."
                ),
            ));
        }

        if !MODEL_NAME_RE.is_match(requested) {
            return Err(GatewayError::invalid_model(format!(
                "'{requested}' is not a valid model identifier (expected creator/model-name)"
            )));
        }

        // 自定义模型绕过租户级提供商路由：那个提示只为租户选定的默认模型调优
        Ok(ModelChoice {
            model: requested.to_string(),
            provider: None,
        })
    }
}
