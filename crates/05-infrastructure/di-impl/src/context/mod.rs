//! 上下文管理
//!
//! - [`SharedContext`] 单例与应用作用域，始终激活
//! - [`ManagedContextImpl`] 请求作用域，状态绑定到当前线程
//! - 注册表提供的自定义上下文
//!
//! [`ContextManager`] 按作用域查找唯一的激活上下文。

mod managed;
mod shared;
mod state;

pub use managed::ManagedContextImpl;
pub use shared::SharedContext;
pub use state::{downcast_state, ScopedState};

use crate::handle::InstanceDestroyer;
use di_abstractions::{InjectableContext, ManagedContext};
use infrastructure_common::{ContainerError, ContainerResult, ScopeKind};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 上下文生命周期事件的事件类型名
pub const CONTEXT_LIFECYCLE_EVENT_TYPE: &str = "ContextLifecycleEvent";

/// 上下文管理器
pub struct ContextManager {
    singleton: Arc<SharedContext>,
    application: Arc<SharedContext>,
    request: Arc<ManagedContextImpl>,
    contexts: HashMap<ScopeKind, Vec<Arc<dyn InjectableContext>>>,
}

impl ContextManager {
    /// 创建内置上下文并登记自定义上下文
    pub fn new(
        custom: &[Arc<dyn InjectableContext>],
        destroyer: Arc<dyn InstanceDestroyer>,
    ) -> Self {
        let singleton = Arc::new(SharedContext::with_destroyer(
            ScopeKind::Singleton,
            Arc::clone(&destroyer),
        ));
        let application = Arc::new(SharedContext::with_destroyer(
            ScopeKind::Application,
            Arc::clone(&destroyer),
        ));
        let request = Arc::new(ManagedContextImpl::with_destroyer(
            ScopeKind::Request,
            destroyer,
        ));

        let mut contexts: HashMap<ScopeKind, Vec<Arc<dyn InjectableContext>>> = HashMap::new();
        contexts.insert(
            ScopeKind::Singleton,
            vec![Arc::clone(&singleton) as Arc<dyn InjectableContext>],
        );
        contexts.insert(
            ScopeKind::Application,
            vec![Arc::clone(&application) as Arc<dyn InjectableContext>],
        );
        contexts.insert(
            ScopeKind::Request,
            vec![Arc::clone(&request) as Arc<dyn InjectableContext>],
        );
        for context in custom {
            debug!("登记自定义上下文: {}", context.scope());
            contexts
                .entry(context.scope().clone())
                .or_default()
                .push(Arc::clone(context));
        }

        Self {
            singleton,
            application,
            request,
            contexts,
        }
    }

    pub fn singleton(&self) -> &Arc<SharedContext> {
        &self.singleton
    }

    pub fn application(&self) -> &Arc<SharedContext> {
        &self.application
    }

    pub fn request(&self) -> &Arc<ManagedContextImpl> {
        &self.request
    }

    /// 作用域的所有上下文，不论是否激活
    pub fn contexts(&self, scope: &ScopeKind) -> Vec<Arc<dyn InjectableContext>> {
        self.contexts.get(scope).cloned().unwrap_or_default()
    }

    /// 已登记的作用域
    pub fn scopes(&self) -> impl Iterator<Item = &ScopeKind> {
        self.contexts.keys()
    }

    /// 作用域当前唯一的激活上下文；没有激活上下文时返回 `None`
    pub fn get_active_context(
        &self,
        scope: &ScopeKind,
    ) -> ContainerResult<Option<Arc<dyn InjectableContext>>> {
        let Some(contexts) = self.contexts.get(scope) else {
            return Ok(None);
        };
        let mut active = contexts.iter().filter(|context| context.is_active());
        let first = active.next().cloned();
        let others = active.count();
        if others > 0 {
            return Err(ContainerError::MultipleActiveContexts {
                scope: scope.clone(),
                count: others + 1,
            });
        }
        Ok(first)
    }

    /// 激活的上下文，不存在时返回上下文未激活错误
    pub fn active_context(&self, scope: &ScopeKind) -> ContainerResult<Arc<dyn InjectableContext>> {
        self.get_active_context(scope)?
            .ok_or_else(|| ContainerError::ContextNotActive {
                scope: scope.clone(),
            })
    }
}

impl fmt::Debug for ContextManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut scopes: Vec<String> = self
            .contexts
            .iter()
            .map(|(scope, contexts)| format!("{}x{}", scope, contexts.len()))
            .collect();
        scopes.sort();
        f.debug_struct("ContextManager")
            .field("scopes", &scopes)
            .finish()
    }
}

/// 请求上下文激活守卫：未激活时激活，离开作用域时终止
pub struct RequestActivation {
    context: Arc<ManagedContextImpl>,
    activated: bool,
}

impl RequestActivation {
    /// 请求上下文未激活时激活新状态
    pub fn activate_if_inactive(context: Arc<ManagedContextImpl>) -> ContainerResult<Self> {
        let activated = if context.is_active() {
            false
        } else {
            context.activate(None)?;
            true
        };
        Ok(Self { context, activated })
    }

    /// 不做任何激活的空守卫
    pub fn noop(context: Arc<ManagedContextImpl>) -> Self {
        Self {
            context,
            activated: false,
        }
    }

    /// 本守卫是否激活了请求上下文
    pub fn activated(&self) -> bool {
        self.activated
    }
}

impl Drop for RequestActivation {
    fn drop(&mut self) {
        if self.activated {
            self.context.terminate();
        }
    }
}
