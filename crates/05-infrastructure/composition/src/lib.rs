//! # 容器组合层
//!
//! 负责把配置、日志与各提供者贡献的组件组合成一个可运行的依赖注入容器。
//!
//! ## 主要功能
//!
//! - **启动器**: [`ContainerBootstrapper`] 使用构建者模式加载配置、构建注册表并初始化容器
//! - **注册表内容提供者**: [`ComponentsProvider`] 是注册表内容的唯一来源
//! - **日志初始化**: [`LoggingConfig`] 提供开发与生产环境预设
//! - **生命周期管理**: [`Runtime`] 持有已启动的容器并负责关闭
//!
//! ## 基本使用
//!
//! ```rust,no_run
//! use di_abstractions::{factory_fn, instance, Components};
//! use infrastructure_common::{ComponentDefinition, TypeDescriptor};
//! use infrastructure_composition::{ContainerBootstrapper, FnComponentsProvider, LoggingConfig};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let runtime = ContainerBootstrapper::new()
//!         .with_logging(LoggingConfig::development())
//!         .add_provider(FnComponentsProvider::new("app", || {
//!             Components::new().with_component(
//!                 ComponentDefinition::new("greeter", TypeDescriptor::class("Greeter")),
//!                 factory_fn(|_| Ok(instance("hello".to_string()))),
//!             )
//!         }))
//!         .bootstrap()?;
//!
//!     let greeting = runtime
//!         .container()
//!         .get::<String>(TypeDescriptor::class("Greeter"), [])?;
//!     println!("{}", greeting);
//!
//!     runtime.shutdown();
//!     Ok(())
//! }
//! ```

pub mod bootstrapper;
pub mod logging;
pub mod provider;
pub mod runtime;

// 重新导出主要类型
pub use bootstrapper::ContainerBootstrapper;
pub use logging::LoggingConfig;
pub use provider::{ComponentsProvider, FnComponentsProvider};
pub use runtime::{Runtime, RuntimeMetrics, RuntimeStatus};

// 重新导出错误类型
pub use infrastructure_common::InfrastructureError;
