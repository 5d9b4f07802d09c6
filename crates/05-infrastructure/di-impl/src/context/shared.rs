//! 始终激活的共享上下文（单例、应用作用域以及自定义的全局作用域）

use super::state::ScopedState;
use crate::handle::{FactoryDestroyer, InstanceDestroyer, InstanceHandle};
use di_abstractions::{
    ContextState, CreationalContext, InjectableComponent, InjectableContext, Instance,
};
use infrastructure_common::{ContainerResult, ScopeKind};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// 共享上下文：所有线程共享一个状态，销毁后换上新的状态
pub struct SharedContext {
    scope: ScopeKind,
    state: RwLock<Arc<ScopedState>>,
    destroyer: Arc<dyn InstanceDestroyer>,
}

impl SharedContext {
    pub fn new(scope: ScopeKind) -> Self {
        Self::with_destroyer(scope, Arc::new(FactoryDestroyer))
    }

    /// 使用指定的实例销毁逻辑
    pub fn with_destroyer(scope: ScopeKind, destroyer: Arc<dyn InstanceDestroyer>) -> Self {
        Self {
            state: RwLock::new(Arc::new(ScopedState::new(scope.clone()))),
            scope,
            destroyer,
        }
    }

    fn current(&self) -> Arc<ScopedState> {
        Arc::clone(&self.state.read())
    }
}

impl InjectableContext for SharedContext {
    fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    fn is_active(&self) -> bool {
        true
    }

    fn get(
        &self,
        component: &Arc<InjectableComponent>,
        creational: &Arc<CreationalContext>,
        create: &dyn Fn() -> ContainerResult<Instance>,
    ) -> ContainerResult<Instance> {
        let handle = self.current().get_or_create(component.identifier(), || {
            let instance = create()?;
            Ok(Arc::new(InstanceHandle::new(
                instance,
                Arc::clone(component),
                Arc::clone(creational),
                Arc::clone(&self.destroyer),
            )))
        })?;
        handle.instance()
    }

    fn get_if_present(&self, component: &InjectableComponent) -> ContainerResult<Option<Instance>> {
        match self.current().get_if_present(component.identifier())? {
            Some(handle) => handle.instance().map(Some),
            None => Ok(None),
        }
    }

    fn destroy_component(&self, component: &InjectableComponent) -> ContainerResult<()> {
        self.current().destroy_component(component.identifier())
    }

    fn destroy(&self) -> ContainerResult<()> {
        let previous = {
            let mut state = self.state.write();
            std::mem::replace(&mut *state, Arc::new(ScopedState::new(self.scope.clone())))
        };
        if previous.invalidate() {
            debug!(
                "销毁共享上下文: {}, 实例数: {}",
                self.scope,
                previous.instance_count()
            );
            previous.destroy_instances();
        }
        Ok(())
    }

    fn state(&self) -> ContainerResult<Arc<dyn ContextState>> {
        let state: Arc<dyn ContextState> = self.current();
        Ok(state)
    }
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext")
            .field("scope", &self.scope)
            .field("state", &*self.state.read())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{factory_fn, instance, CreationContext, LambdaFactory};
    use infrastructure_common::{ComponentDefinition, TypeDescriptor};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Barrier;
    use std::thread;

    fn component(id: &str) -> Arc<InjectableComponent> {
        Arc::new(InjectableComponent::new(
            ComponentDefinition::new(id, TypeDescriptor::class(id)).with_scope(ScopeKind::Application),
            factory_fn(|_| Ok(instance(()))),
        ))
    }

    /// 测试并发首次访问只创建一个实例
    #[test]
    fn test_concurrent_get_creates_once() {
        let context = Arc::new(SharedContext::new(ScopeKind::Application));
        let component = component("counter");
        let created = Arc::new(AtomicUsize::new(0));
        let barrier = Arc::new(Barrier::new(6));

        let handles: Vec<_> = (0..6)
            .map(|_| {
                let context = Arc::clone(&context);
                let component = Arc::clone(&component);
                let created = Arc::clone(&created);
                let barrier = Arc::clone(&barrier);
                thread::spawn(move || {
                    barrier.wait();
                    let create = || -> ContainerResult<Instance> {
                        let id = created.fetch_add(1, Ordering::SeqCst);
                        Ok(instance(id))
                    };
                    context
                        .get(&component, &CreationalContext::for_component("counter"), &create)
                        .unwrap()
                })
            })
            .collect();

        let instances: Vec<Instance> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(instances.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
    }

    /// 测试销毁后换上新状态并销毁旧实例
    #[test]
    fn test_destroy_replaces_state() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let component = Arc::new(InjectableComponent::new(
            ComponentDefinition::new("service", TypeDescriptor::class("Service")),
            LambdaFactory::new(|_: &CreationContext<'_>| Ok(instance(())))
                .on_destroy(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .shared(),
        ));
        let context = SharedContext::new(ScopeKind::Singleton);
        let creational = CreationalContext::for_component("service");
        let create = || -> ContainerResult<Instance> { Ok(instance(())) };

        let first = context.get(&component, &creational, &create).unwrap();
        let old_state = context.state().unwrap();
        context.destroy().unwrap();

        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert!(!old_state.is_valid());
        assert!(context.state().unwrap().is_valid());
        assert!(context.get_if_present(&component).unwrap().is_none());

        let second = context.get(&component, &creational, &create).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));

        context.destroy_component(&component).unwrap();
        assert_eq!(destroyed.load(Ordering::SeqCst), 2);
    }
}
