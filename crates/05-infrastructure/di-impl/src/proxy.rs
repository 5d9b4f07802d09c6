//! 客户端代理
//!
//! 容器外部持有的普通作用域组件代理：每次调用都从当前激活的上下文中取实例，
//! 因此同一个代理在不同请求中指向不同的实例。注入到工厂中的普通作用域依赖
//! 是无类型的 [`di_abstractions::ContextualReference`]，转发语义相同。

use crate::container::DiContainer;
use di_abstractions::{downcast_instance, InjectableComponent};
use infrastructure_common::{ContainerError, ContainerResult};
use std::any::Any;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// 普通作用域组件的客户端代理
pub struct ClientProxy<T> {
    container: DiContainer,
    component: Arc<InjectableComponent>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Any + Send + Sync> ClientProxy<T> {
    pub(crate) fn new(
        container: DiContainer,
        component: Arc<InjectableComponent>,
    ) -> ContainerResult<Self> {
        if !component.scope().is_normal() {
            return Err(ContainerError::invalid_argument(format!(
                "组件不是普通作用域, 无法创建客户端代理: {}",
                component.identifier()
            )));
        }
        Ok(Self {
            container,
            component,
            _marker: PhantomData,
        })
    }

    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }

    /// 当前上下文中的实例
    pub fn get(&self) -> ContainerResult<Arc<T>> {
        let instance = self.container.get_component(&self.component)?;
        downcast_instance(instance, self.component.identifier())
    }

    /// 以当前实例执行操作
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> ContainerResult<R> {
        let target = self.get()?;
        Ok(f(&target))
    }
}

impl<T> Clone for ClientProxy<T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            component: Arc::clone(&self.component),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for ClientProxy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientProxy")
            .field("component", &self.component.identifier())
            .field("scope", self.component.scope())
            .finish()
    }
}
