//! 受管上下文
//!
//! 当前状态通过线程局部存储绑定到调用线程，这是唯一使用线程局部存储的地方：
//! 每个线程为每个受管上下文最多绑定一个状态。状态可以在一个线程上解绑，
//! 再通过 [`ManagedContext::activate`] 绑定到另一个线程。
//! 上下文另外以弱引用登记所有未销毁的状态，[`ManagedContextImpl::destroy_all`]
//! 销毁它们，不论绑定在哪个线程上。

use super::state::{downcast_state, ScopedState};
use crate::handle::{FactoryDestroyer, InstanceDestroyer, InstanceHandle};
use di_abstractions::{
    ContextLifecycleEvent, ContextLifecycleListener, ContextState, CreationalContext,
    InjectableComponent, InjectableContext, Instance, ManagedContext,
};
use infrastructure_common::{
    ContainerError, ContainerResult, LifecycleError, LifecycleEventKind, ScopeKind,
};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, warn};

static NEXT_CONTEXT_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    static CURRENT_STATES: RefCell<HashMap<u64, Arc<ScopedState>>> = RefCell::new(HashMap::new());
}

/// 绑定到当前线程的受管上下文
pub struct ManagedContextImpl {
    id: u64,
    scope: ScopeKind,
    destroyer: Arc<dyn InstanceDestroyer>,
    listener: OnceCell<Weak<dyn ContextLifecycleListener>>,
    live: Mutex<Vec<Weak<ScopedState>>>,
}

impl ManagedContextImpl {
    pub fn new(scope: ScopeKind) -> Self {
        Self::with_destroyer(scope, Arc::new(FactoryDestroyer))
    }

    /// 使用指定的实例销毁逻辑
    pub fn with_destroyer(scope: ScopeKind, destroyer: Arc<dyn InstanceDestroyer>) -> Self {
        Self {
            id: NEXT_CONTEXT_ID.fetch_add(1, Ordering::Relaxed),
            scope,
            destroyer,
            listener: OnceCell::new(),
            live: Mutex::new(Vec::new()),
        }
    }

    /// 设置生命周期监听器，只能设置一次
    pub fn set_listener(&self, listener: Weak<dyn ContextLifecycleListener>) -> bool {
        self.listener.set(listener).is_ok()
    }

    fn current(&self) -> Option<Arc<ScopedState>> {
        CURRENT_STATES.with(|states| states.borrow().get(&self.id).cloned())
    }

    fn bind(&self, state: Arc<ScopedState>) {
        CURRENT_STATES.with(|states| {
            states.borrow_mut().insert(self.id, state);
        });
    }

    fn unbind(&self) -> Option<Arc<ScopedState>> {
        CURRENT_STATES.with(|states| states.borrow_mut().remove(&self.id))
    }

    fn active_state(&self) -> ContainerResult<Arc<ScopedState>> {
        self.current()
            .filter(|state| state.is_valid())
            .ok_or_else(|| ContainerError::ContextNotActive {
                scope: self.scope.clone(),
            })
    }

    /// 通知生命周期监听器，失败只记录日志
    fn fire(&self, kind: LifecycleEventKind, state: &ScopedState) {
        let Some(listener) = self.listener.get().and_then(Weak::upgrade) else {
            return;
        };
        let event = ContextLifecycleEvent {
            kind,
            scope: self.scope.clone(),
            state_id: state.id().to_string(),
        };
        if let Err(e) = listener.on_lifecycle_event(&event) {
            warn!(
                "上下文生命周期通知失败: {:?}, 作用域: {}, 原因: {}",
                kind, self.scope, e
            );
        }
    }

    /// 激活具体状态
    pub fn activate_state(&self, state: Arc<ScopedState>) -> ContainerResult<Arc<ScopedState>> {
        if !state.is_valid() {
            return Err(LifecycleError::InvalidState {
                scope: self.scope.clone(),
            }
            .into());
        }
        self.bind(Arc::clone(&state));
        if state.mark_initialized() {
            self.track(&state);
            debug!("上下文状态初始化: {}, 状态: {}", self.scope, state.id());
            self.fire(LifecycleEventKind::Initialized, &state);
        }
        Ok(state)
    }

    fn track(&self, state: &Arc<ScopedState>) {
        let mut live = self.live.lock();
        live.retain(|tracked| tracked.upgrade().is_some_and(|tracked| tracked.is_valid()));
        live.push(Arc::downgrade(state));
    }

    /// 未销毁的状态数量
    pub fn live_state_count(&self) -> usize {
        self.live
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .filter(|state| state.is_valid())
            .count()
    }

    /// 销毁所有未销毁的状态，包括绑定在其它线程上的状态，并解绑当前线程
    pub fn destroy_all(&self) {
        self.unbind();
        let live = std::mem::take(&mut *self.live.lock());
        let states: Vec<Arc<ScopedState>> = live.iter().filter_map(Weak::upgrade).collect();
        if !states.is_empty() {
            debug!("销毁全部上下文状态: {}, 状态数: {}", self.scope, states.len());
        }
        for state in &states {
            self.destroy_scoped_state(state);
        }
    }

    /// 销毁具体状态：即将销毁通知最多一次，翻转有效标志失败时为空操作
    pub fn destroy_scoped_state(&self, state: &Arc<ScopedState>) {
        if state.mark_before_destroyed() {
            self.fire(LifecycleEventKind::BeforeDestroyed, state);
        }
        if !state.invalidate() {
            return;
        }
        debug!(
            "销毁上下文状态: {}, 状态: {}, 实例数: {}",
            self.scope,
            state.id(),
            state.instance_count()
        );
        state.destroy_instances();
        self.fire(LifecycleEventKind::Destroyed, state);
    }
}

impl InjectableContext for ManagedContextImpl {
    fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    fn is_active(&self) -> bool {
        self.current().is_some_and(|state| state.is_valid())
    }

    fn get(
        &self,
        component: &Arc<InjectableComponent>,
        creational: &Arc<CreationalContext>,
        create: &dyn Fn() -> ContainerResult<Instance>,
    ) -> ContainerResult<Instance> {
        let state = self.active_state()?;
        let handle = state.get_or_create(component.identifier(), || {
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
        match self.active_state()?.get_if_present(component.identifier())? {
            Some(handle) => handle.instance().map(Some),
            None => Ok(None),
        }
    }

    fn destroy_component(&self, component: &InjectableComponent) -> ContainerResult<()> {
        self.active_state()?.destroy_component(component.identifier())
    }

    fn destroy(&self) -> ContainerResult<()> {
        if let Some(state) = self.current() {
            self.destroy_scoped_state(&state);
        }
        Ok(())
    }

    fn state(&self) -> ContainerResult<Arc<dyn ContextState>> {
        let state: Arc<dyn ContextState> = self.active_state()?;
        Ok(state)
    }
}

impl ManagedContext for ManagedContextImpl {
    fn activate(
        &self,
        initial: Option<Arc<dyn ContextState>>,
    ) -> ContainerResult<Arc<dyn ContextState>> {
        let state = match initial {
            Some(state) => downcast_state(state).ok_or_else(|| LifecycleError::ForeignState {
                scope: self.scope.clone(),
            })?,
            None => Arc::new(ScopedState::new(self.scope.clone())),
        };
        let state: Arc<dyn ContextState> = self.activate_state(state)?;
        Ok(state)
    }

    fn deactivate(&self) {
        self.unbind();
    }

    fn destroy_state(&self, state: &Arc<dyn ContextState>) -> ContainerResult<()> {
        let state = downcast_state(Arc::clone(state)).ok_or_else(|| LifecycleError::ForeignState {
            scope: self.scope.clone(),
        })?;
        self.destroy_scoped_state(&state);
        Ok(())
    }

    fn terminate(&self) {
        if let Some(state) = self.unbind() {
            self.destroy_scoped_state(&state);
        }
    }
}

impl fmt::Debug for ManagedContextImpl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ManagedContextImpl")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("active", &self.is_active())
            .finish()
    }
}
