//! 日志初始化

use infrastructure_common::{InfrastructureError, InfrastructureResult, LoggingSettings};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// 日志配置
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// `EnvFilter` 过滤表达式，`RUST_LOG` 存在时优先
    pub filter: String,
    /// 是否显示目标
    pub show_target: bool,
    /// 是否显示线程ID
    pub show_thread_ids: bool,
    /// 是否显示文件名
    pub show_file: bool,
    /// 是否显示行号
    pub show_line_number: bool,
    /// 是否使用 JSON 格式
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            show_target: true,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// 创建开发环境日志配置
    pub fn development() -> Self {
        Self {
            filter: "debug".to_string(),
            show_target: true,
            show_thread_ids: true,
            show_file: true,
            show_line_number: true,
            json_format: false,
        }
    }

    /// 创建生产环境日志配置
    pub fn production() -> Self {
        Self {
            filter: "info".to_string(),
            show_target: false,
            show_thread_ids: false,
            show_file: false,
            show_line_number: false,
            json_format: true,
        }
    }

    /// 由容器配置中的日志设置创建
    pub fn from_settings(settings: &LoggingSettings) -> Self {
        Self {
            filter: settings.filter.clone(),
            json_format: settings.json,
            ..Self::default()
        }
    }

    /// 设置过滤表达式
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    fn env_filter(&self) -> InfrastructureResult<EnvFilter> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.filter).map_err(|e| InfrastructureError::BootstrapFailed {
            message: format!("日志过滤表达式无效: {}, 原因: {}", self.filter, e),
        })
    }

    /// 安装全局订阅者；已有订阅者时不做任何事并返回 `false`
    pub fn try_init(&self) -> InfrastructureResult<bool> {
        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(self.env_filter()?)
            .with_target(self.show_target)
            .with_thread_ids(self.show_thread_ids)
            .with_file(self.show_file)
            .with_line_number(self.show_line_number);

        let installed = if self.json_format {
            subscriber.json().try_init()
        } else {
            subscriber.try_init()
        };

        match installed {
            Ok(()) => {
                info!("日志系统初始化完成");
                Ok(true)
            }
            Err(e) => {
                debug!("日志系统已初始化, 跳过: {}", e);
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试预设与从容器配置转换
    #[test]
    fn test_presets() {
        let development = LoggingConfig::development();
        assert_eq!(development.filter, "debug");
        assert!(development.show_line_number);
        assert!(LoggingConfig::production().json_format);

        let settings = LoggingSettings {
            filter: "di_impl=trace".to_string(),
            json: true,
        };
        let config = LoggingConfig::from_settings(&settings);
        assert_eq!(config.filter, "di_impl=trace");
        assert!(config.json_format);
        assert!(config.show_target);
    }

    /// 测试重复初始化不会失败
    #[test]
    fn test_try_init_is_idempotent() {
        let config = LoggingConfig::default().with_filter("warn");
        assert!(config.try_init().is_ok());
        assert!(!config.try_init().unwrap());
    }
}
