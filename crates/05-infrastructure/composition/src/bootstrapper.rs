//! 容器启动器
//!
//! 启动顺序：加载配置 → 初始化日志 → 合并提供者内容并构建注册表 → 构建并初始化容器
//! → （可选）安装为进程级容器。

use crate::logging::LoggingConfig;
use crate::provider::ComponentsProvider;
use crate::runtime::Runtime;
use di_abstractions::{AsyncObserverExceptionHandler, ComponentRegistry, TransactionHook};
use di_impl::{global, DiContainer};
use infrastructure_common::{ContainerConfig, InfrastructureError, InfrastructureResult};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, info};

/// 容器启动器
pub struct ContainerBootstrapper {
    /// 容器名称
    name: String,
    /// 显式配置，优先于配置文件
    config: Option<ContainerConfig>,
    /// 配置文件路径
    config_file: Option<PathBuf>,
    /// 日志配置
    logging: Option<LoggingConfig>,
    /// 按容器配置中的日志设置初始化日志
    logging_from_config: bool,
    /// 注册表内容提供者
    providers: Vec<Box<dyn ComponentsProvider>>,
    transaction_hook: Option<Arc<dyn TransactionHook>>,
    exception_handler: Option<Arc<dyn AsyncObserverExceptionHandler>>,
    runtime: Option<Handle>,
    /// 是否安装为进程级容器
    register_global: bool,
}

impl ContainerBootstrapper {
    /// 创建新的启动器
    pub fn new() -> Self {
        Self {
            name: "default".to_string(),
            config: None,
            config_file: None,
            logging: None,
            logging_from_config: false,
            providers: Vec::new(),
            transaction_hook: None,
            exception_handler: None,
            runtime: None,
            register_global: false,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// 使用显式配置
    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// 从 TOML 文件加载配置（环境变量覆盖文件）
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// 启动时初始化日志
    pub fn with_logging(mut self, logging: LoggingConfig) -> Self {
        self.logging = Some(logging);
        self
    }

    /// 启动时按容器配置的日志设置初始化日志
    pub fn with_logging_from_config(mut self) -> Self {
        self.logging_from_config = true;
        self
    }

    /// 添加注册表内容提供者
    pub fn add_provider(mut self, provider: impl ComponentsProvider + 'static) -> Self {
        self.providers.push(Box::new(provider));
        self
    }

    pub fn with_transaction_hook(mut self, hook: Arc<dyn TransactionHook>) -> Self {
        self.transaction_hook = Some(hook);
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn AsyncObserverExceptionHandler>) -> Self {
        self.exception_handler = Some(handler);
        self
    }

    /// 异步事件使用的运行时
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 是否安装为进程级容器
    pub fn register_global(mut self, enabled: bool) -> Self {
        self.register_global = enabled;
        self
    }

    fn load_config(&mut self) -> InfrastructureResult<ContainerConfig> {
        if let Some(config) = self.config.take() {
            config.validate()?;
            return Ok(config);
        }
        let config = ContainerConfig::load(self.config_file.as_deref())?;
        debug!("容器配置加载完成: {:?}", config);
        Ok(config)
    }

    fn initialize_logging(&self, config: &ContainerConfig) -> InfrastructureResult<()> {
        let logging = match (&self.logging, self.logging_from_config) {
            (Some(logging), _) => logging.clone(),
            (None, true) => LoggingConfig::from_settings(&config.logging),
            (None, false) => return Ok(()),
        };
        logging.try_init()?;
        Ok(())
    }

    fn build_registry(&self) -> InfrastructureResult<ComponentRegistry> {
        let contributions = self.providers.iter().map(|provider| {
            debug!("加载注册表内容提供者: {}", provider.name());
            provider.components()
        });
        ComponentRegistry::build(contributions).map_err(|e| {
            error!("构建组件注册表失败: {}", e);
            InfrastructureError::from(e)
        })
    }

    /// 启动容器
    pub fn bootstrap(mut self) -> InfrastructureResult<Runtime> {
        let config = self.load_config()?;
        self.initialize_logging(&config)?;
        info!("开始启动容器: {}", self.name);

        let registry = self.build_registry()?;

        let mut builder = DiContainer::builder(registry)
            .with_name(self.name.clone())
            .with_config(config.clone());
        if let Some(hook) = self.transaction_hook.take() {
            builder = builder.with_transaction_hook(hook);
        }
        if let Some(handler) = self.exception_handler.take() {
            builder = builder.with_exception_handler(handler);
        }
        if let Some(runtime) = self.runtime.take() {
            builder = builder.with_runtime(runtime);
        }
        let container = builder.build();

        if let Err(e) = container.init() {
            error!("容器初始化失败: {}", e);
            container.shutdown();
            return Err(InfrastructureError::BootstrapFailed {
                message: format!("容器初始化失败: {e}"),
            });
        }

        if self.register_global {
            global::init(container.clone());
        }

        info!(
            "容器启动完成: {}, 提供者数: {}",
            self.name,
            self.providers.len()
        );
        Ok(Runtime::new(
            container,
            config,
            self.register_global,
            self.providers.len(),
        ))
    }
}

impl Default for ContainerBootstrapper {
    fn default() -> Self {
        Self::new()
    }
}
