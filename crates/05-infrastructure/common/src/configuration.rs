//! 容器配置
//!
//! 加载顺序：内置默认值 ← 可选 TOML 文件 ← `ARC_` 前缀环境变量（层级分隔符 `__`），
//! 例如 `ARC_LOGGING__FILTER=debug`。

use crate::errors::{ConfigError, ConfigResult};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::debug;

/// 环境变量前缀
pub const ENV_PREFIX: &str = "ARC";
/// 环境变量层级分隔符
pub const ENV_SEPARATOR: &str = "__";

/// 没有事务钩子或没有活动事务时，事务阶段观察者的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionFallback {
    /// 像立即观察者一样同步通知
    NotifyImmediately,
    /// 跳过通知
    Skip,
}

impl Default for TransactionFallback {
    fn default() -> Self {
        Self::NotifyImmediately
    }
}

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// `EnvFilter` 过滤表达式
    pub filter: String,
    /// 是否输出 JSON 格式
    pub json: bool,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

/// 容器配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContainerConfig {
    /// 严格兼容模式下，观察者通知不会自动激活请求上下文
    pub strict_compatibility: bool,
    /// 事务阶段观察者的回退策略
    pub transaction_fallback: TransactionFallback,
    /// 解析失败但有已移除组件可匹配时输出警告
    pub remove_unused_warning: bool,
    /// 日志配置
    pub logging: LoggingSettings,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            strict_compatibility: false,
            transaction_fallback: TransactionFallback::default(),
            remove_unused_warning: true,
            logging: LoggingSettings::default(),
        }
    }
}

impl ContainerConfig {
    /// 从可选的 TOML 文件与环境变量加载配置
    pub fn load(path: Option<&Path>) -> ConfigResult<Self> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            if !path.exists() {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
            debug!("加载容器配置文件: {}", path.display());
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator(ENV_SEPARATOR)
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// 从 TOML 文本加载配置（不读取环境变量）
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let config: Self = config::Config::builder()
            .add_source(config::File::from_str(content, config::FileFormat::Toml))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// 校验配置
    pub fn validate(&self) -> ConfigResult<()> {
        if self.logging.filter.trim().is_empty() {
            return Err(ConfigError::ValidationError {
                message: "logging.filter 不能为空".to_string(),
            });
        }
        Ok(())
    }

    /// 设置严格兼容模式
    pub fn with_strict_compatibility(mut self, strict: bool) -> Self {
        self.strict_compatibility = strict;
        self
    }

    /// 设置事务回退策略
    pub fn with_transaction_fallback(mut self, fallback: TransactionFallback) -> Self {
        self.transaction_fallback = fallback;
        self
    }
}
