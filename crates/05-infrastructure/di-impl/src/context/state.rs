//! 上下文状态
//!
//! 状态拥有实例存储、有效标志以及两个一次性触发的生命周期闩锁。
//! 有效标志只能从有效翻转为无效一次；翻转持有写锁，与并发的获取操作串行化。

use crate::cache::ComputingCache;
use crate::handle::InstanceHandle;
use chrono::{DateTime, Utc};
use di_abstractions::{ContextState, Instance};
use infrastructure_common::{ContainerError, ContainerResult, ScopeKind};
use parking_lot::RwLock;
use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::warn;
use uuid::Uuid;

/// 作用域上下文状态
pub struct ScopedState {
    id: String,
    scope: ScopeKind,
    created_at: DateTime<Utc>,
    instances: ComputingCache<String, Arc<InstanceHandle>>,
    valid: AtomicBool,
    initialized: AtomicBool,
    before_destroyed: AtomicBool,
    lifecycle: RwLock<()>,
}

impl ScopedState {
    pub fn new(scope: ScopeKind) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            scope,
            created_at: Utc::now(),
            instances: ComputingCache::new(),
            valid: AtomicBool::new(true),
            initialized: AtomicBool::new(false),
            before_destroyed: AtomicBool::new(false),
            lifecycle: RwLock::new(()),
        }
    }

    pub fn scope(&self) -> &ScopeKind {
        &self.scope
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn not_active(&self) -> ContainerError {
        ContainerError::ContextNotActive {
            scope: self.scope.clone(),
        }
    }

    /// 获取实例，不存在时创建；每个组件在同一状态中只创建一次
    pub fn get_or_create(
        &self,
        component: &str,
        create: impl FnOnce() -> ContainerResult<Arc<InstanceHandle>>,
    ) -> ContainerResult<Arc<InstanceHandle>> {
        // 嵌套创建会在同一线程上再次获取读锁
        let _guard = self.lifecycle.read_recursive();
        if !self.is_valid() {
            return Err(self.not_active());
        }
        self.instances
            .try_get_or_compute(&component.to_string(), |_| create())
    }

    /// 获取已存在的实例
    pub fn get_if_present(&self, component: &str) -> ContainerResult<Option<Arc<InstanceHandle>>> {
        let _guard = self.lifecycle.read_recursive();
        if !self.is_valid() {
            return Err(self.not_active());
        }
        Ok(self.instances.get_if_present(&component.to_string()))
    }

    /// 移除实例，不销毁
    pub fn remove(&self, component: &str) -> Option<Arc<InstanceHandle>> {
        self.instances.remove(&component.to_string())
    }

    /// 从本状态中移除并销毁实例，不存在时为空操作
    pub fn destroy_component(&self, component: &str) -> ContainerResult<()> {
        match self.remove(component) {
            Some(handle) => handle.destroy(),
            None => Ok(()),
        }
    }

    /// 第一次调用返回 `true`
    pub fn mark_initialized(&self) -> bool {
        self.initialized
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 第一次调用返回 `true`
    pub fn mark_before_destroyed(&self) -> bool {
        self.before_destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 把状态翻转为无效；已经无效时返回 `false`
    pub fn invalidate(&self) -> bool {
        let _guard = self.lifecycle.write();
        self.valid
            .compare_exchange(true, false, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 销毁并清空所有实例，失败只记录日志
    pub fn destroy_instances(&self) {
        for (component, handle) in self.instances.drain() {
            if let Err(e) = handle.destroy() {
                warn!("销毁上下文实例失败: {}, 作用域: {}, 原因: {}", component, self.scope, e);
            }
        }
    }

    /// 当前存储的实例数量
    pub fn instance_count(&self) -> usize {
        self.instances.len()
    }
}

impl ContextState for ScopedState {
    fn id(&self) -> &str {
        &self.id
    }

    fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    fn contextual_instances(&self) -> Vec<(String, Instance)> {
        let mut instances = Vec::new();
        self.instances.for_each(|component, handle| {
            if let Ok(instance) = handle.instance() {
                instances.push((component.clone(), instance));
            }
        });
        instances
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

impl fmt::Debug for ScopedState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScopedState")
            .field("id", &self.id)
            .field("scope", &self.scope)
            .field("created_at", &self.created_at)
            .field("valid", &self.is_valid())
            .field("instances", &self.instances.len())
            .finish()
    }
}

/// 把抽象状态还原为具体状态
pub fn downcast_state(state: Arc<dyn ContextState>) -> Option<Arc<ScopedState>> {
    state.into_any().downcast::<ScopedState>().ok()
}
