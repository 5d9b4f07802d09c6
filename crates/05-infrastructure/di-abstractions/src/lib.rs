//! # Dependency Injection Abstractions
//!
//! 依赖注入抽象层，定义容器运行时各引擎之间的接缝。
//!
//! ## 核心接口
//!
//! - [`ComponentFactory`] - 组件工厂接口
//! - [`CreationalContext`] - 创建上下文树
//! - [`InjectableContext`] / [`ManagedContext`] - 作用域上下文接口
//! - [`InterceptorDefinition`] / [`InvocationContext`] - 拦截器调用链
//! - [`ObserverMethod`] / [`TransactionHook`] - 事件观察者与事务钩子
//! - [`ComponentRegistry`] - 只读组件注册表

pub mod context;
pub mod creational;
pub mod event;
pub mod factory;
pub mod interceptor;
pub mod registry;

pub use context::*;
pub use creational::*;
pub use event::*;
pub use factory::*;
pub use interceptor::*;
pub use registry::*;
