//! # Infrastructure Common
//!
//! 这个 crate 提供了依赖注入运行时各层共享的值类型。
//!
//! ## 核心类型
//!
//! - [`TypeDescriptor`] / [`TypeHierarchy`] - 结构化类型模型与类型闭包
//! - [`Qualifier`] / [`BindingRules`] - 限定符、拦截器绑定及其匹配规则
//! - [`ScopeKind`] - 组件作用域
//! - [`ComponentDefinition`] - 组件定义
//! - [`ObserverMetadata`] / [`InterceptorMetadata`] / [`DecoratorMetadata`] - 元数据
//! - [`ContainerError`] - 容器错误分类
//! - [`ContainerConfig`] - 容器配置
//!
//! ## 设计原则
//!
//! - 所有定义在注册表构建后只读
//! - 限定符与类型都是可比较、可哈希的结构化值，不依赖运行时反射

pub mod component;
pub mod configuration;
pub mod errors;
pub mod lifecycle;
pub mod metadata;
pub mod qualifier;
pub mod types;

pub use component::*;
pub use configuration::*;
pub use errors::*;
pub use lifecycle::*;
pub use metadata::*;
pub use qualifier::*;
pub use types::*;
