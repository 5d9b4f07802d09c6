//! # 依赖注入运行时实现
//!
//! 基于 `di-abstractions` 的接口提供容器运行时：
//!
//! - [`ComputingCache`] - 按键只计算一次的并发缓存
//! - [`Resolver`] - 类型安全解析与歧义消解
//! - [`ContextManager`] - 单例、应用、请求与自定义作用域上下文
//! - [`InterceptionExecutor`] - 拦截器链构建与执行
//! - [`EventNotifier`] - 同步、异步与事务观察者通知
//! - [`DiContainer`] - 对外的容器门面
//!
//! ## 使用示例
//!
//! ```rust,ignore
//! use di_abstractions::{factory_fn, instance, ComponentRegistry, Components};
//! use di_impl::DiContainer;
//! use infrastructure_common::{ComponentDefinition, TypeDescriptor};
//!
//! let registry = ComponentRegistry::build([Components::new().with_component(
//!     ComponentDefinition::new("greeter", TypeDescriptor::class("Greeter")),
//!     factory_fn(|_| Ok(instance("hello".to_string()))),
//! )])?;
//! let container = DiContainer::builder(registry).build();
//! container.init()?;
//! let greeting = container.get::<String>(TypeDescriptor::class("Greeter"), [])?;
//! container.shutdown();
//! ```

pub mod assignability;
pub mod builtin;
pub mod cache;
pub mod container;
pub mod context;
pub mod event;
pub mod global;
pub mod handle;
pub mod interception;
pub mod proxy;
pub mod resolver;

pub use assignability::{BeanTypeRules, EventTypeRules};
pub use builtin::{EventPublisher, InstanceProvider};
pub use cache::ComputingCache;
pub use container::{DiContainer, DiContainerBuilder, InstanceSupplier};
pub use context::{
    ContextManager, ManagedContextImpl, RequestActivation, ScopedState, SharedContext,
    CONTEXT_LIFECYCLE_EVENT_TYPE,
};
pub use event::{event_metadata, lifecycle_metadata, EventNotifier};
pub use handle::{FactoryDestroyer, InstanceDestroyer, InstanceHandle};
pub use interception::{InterceptionExecutor, InterceptorChain};
pub use proxy::ClientProxy;
pub use resolver::{
    resolve_ambiguity, Resolvable, Resolved, Resolver, BUILT_IN_TYPES, EVENT_TYPE,
    INJECTION_POINT_TYPE, INSTANCE_TYPE,
};
