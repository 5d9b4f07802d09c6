//! 实例句柄
//!
//! 句柄包装一个已创建的实例，记录所属组件、创建上下文和可选的父创建上下文。
//! 销毁恰好执行一次，与调用者数量无关。

use crate::context::ScopedState;
use di_abstractions::{
    downcast_instance, ContextState, CreationalContext, DestroyableInstance,
    InjectableComponent, InjectableContext, Instance,
};
use infrastructure_common::{ContainerError, ContainerResult};
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::trace;

/// 实例销毁逻辑
pub trait InstanceDestroyer: Send + Sync {
    /// 销毁实例并释放其创建上下文
    fn destroy_instance(
        &self,
        component: &InjectableComponent,
        instance: &Instance,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<()>;
}

/// 只调用工厂销毁回调的默认销毁逻辑
#[derive(Debug, Default, Clone, Copy)]
pub struct FactoryDestroyer;

impl InstanceDestroyer for FactoryDestroyer {
    fn destroy_instance(
        &self,
        component: &InjectableComponent,
        instance: &Instance,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<()> {
        let result = component.factory().destroy(instance);
        creational.release();
        result
    }
}

enum DestroyLogic {
    /// 直接销毁实例（依赖作用域或上下文内部存储）
    Instance(Arc<dyn InstanceDestroyer>),
    /// 从创建时所在的上下文状态中移除并销毁
    State(Arc<ScopedState>),
    /// 外部上下文：只有当前状态仍是创建时的状态才销毁
    Context {
        context: Arc<dyn InjectableContext>,
        state_id: String,
    },
}

/// 实例句柄
pub struct InstanceHandle {
    instance: Instance,
    component: Arc<InjectableComponent>,
    creational: Arc<CreationalContext>,
    parent: Option<Arc<CreationalContext>>,
    destroy_logic: DestroyLogic,
    destroyed: AtomicBool,
}

impl InstanceHandle {
    /// 直接持有实例的句柄，销毁时调用 `destroyer`
    pub fn new(
        instance: Instance,
        component: Arc<InjectableComponent>,
        creational: Arc<CreationalContext>,
        destroyer: Arc<dyn InstanceDestroyer>,
    ) -> Self {
        Self {
            instance,
            component,
            creational,
            parent: None,
            destroy_logic: DestroyLogic::Instance(destroyer),
            destroyed: AtomicBool::new(false),
        }
    }

    /// 普通作用域实例的句柄，销毁时从所属的上下文状态中移除
    pub fn contextual(
        instance: Instance,
        component: Arc<InjectableComponent>,
        creational: Arc<CreationalContext>,
        state: Arc<ScopedState>,
    ) -> Self {
        Self::with_logic(instance, component, creational, DestroyLogic::State(state))
    }

    /// 外部上下文实例的句柄，记录创建时的状态标识
    pub fn foreign(
        instance: Instance,
        component: Arc<InjectableComponent>,
        creational: Arc<CreationalContext>,
        context: Arc<dyn InjectableContext>,
        state_id: impl Into<String>,
    ) -> Self {
        let logic = DestroyLogic::Context {
            context,
            state_id: state_id.into(),
        };
        Self::with_logic(instance, component, creational, logic)
    }

    fn with_logic(
        instance: Instance,
        component: Arc<InjectableComponent>,
        creational: Arc<CreationalContext>,
        destroy_logic: DestroyLogic,
    ) -> Self {
        Self {
            instance,
            component,
            creational,
            parent: None,
            destroy_logic,
            destroyed: AtomicBool::new(false),
        }
    }

    /// 设置父创建上下文，销毁后一并释放
    pub fn with_parent(mut self, parent: Arc<CreationalContext>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }

    pub fn creational(&self) -> &Arc<CreationalContext> {
        &self.creational
    }

    /// 实例是否仍然可用
    pub fn is_available(&self) -> bool {
        !self.destroyed.load(Ordering::Acquire)
    }

    /// 获取实例
    pub fn instance(&self) -> ContainerResult<Instance> {
        if !self.is_available() {
            return Err(ContainerError::InstanceDestroyed {
                component: self.component.identifier().to_string(),
            });
        }
        Ok(Arc::clone(&self.instance))
    }

    /// 获取并转型实例
    pub fn get<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let instance = self.instance()?;
        downcast_instance(instance, self.component.identifier())
    }

    /// 销毁实例，只有第一次调用生效
    pub fn destroy(&self) -> ContainerResult<()> {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        trace!("销毁实例: {}", self.component.identifier());
        let result = match &self.destroy_logic {
            DestroyLogic::Instance(destroyer) => {
                destroyer.destroy_instance(&self.component, &self.instance, &self.creational)
            }
            DestroyLogic::State(state) => state.destroy_component(self.component.identifier()),
            DestroyLogic::Context { context, state_id } => match context.state() {
                Ok(current) if current.id() == state_id => {
                    context.destroy_component(&self.component)
                }
                _ => {
                    trace!("所属状态已不是当前状态，跳过: {}", self.component.identifier());
                    Ok(())
                }
            },
        };
        if let Some(parent) = &self.parent {
            parent.release();
        }
        result
    }
}

impl DestroyableInstance for InstanceHandle {
    fn component_id(&self) -> &str {
        self.component.identifier()
    }

    fn destroy(&self) -> ContainerResult<()> {
        InstanceHandle::destroy(self)
    }
}

impl fmt::Debug for InstanceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceHandle")
            .field("component", &self.component.identifier())
            .field("available", &self.is_available())
            .finish()
    }
}
