//! 上下文抽象接口
//!
//! 每种作用域由一个上下文对象负责：普通作用域上下文缓存实例，
//! 受管上下文还可以在当前工作单元上激活、停用和销毁状态。

use crate::creational::CreationalContext;
use crate::factory::Instance;
use crate::registry::InjectableComponent;
use infrastructure_common::{ContainerResult, LifecycleEventKind, ScopeKind};
use std::any::Any;
use std::sync::Arc;

/// 上下文状态
pub trait ContextState: Send + Sync {
    /// 状态标识
    fn id(&self) -> &str;

    /// 状态是否有效（尚未销毁）
    fn is_valid(&self) -> bool;

    /// 当前缓存的实例：组件标识与实例
    fn contextual_instances(&self) -> Vec<(String, Instance)>;

    /// 用于向下转型为具体状态类型
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

/// 可注入上下文
pub trait InjectableContext: Send + Sync {
    /// 负责的作用域
    fn scope(&self) -> &ScopeKind;

    /// 当前是否激活
    fn is_active(&self) -> bool;

    /// 获取实例，不存在时通过 `create` 创建并缓存；并发首次访问只创建一次
    fn get(
        &self,
        component: &Arc<InjectableComponent>,
        creational: &Arc<CreationalContext>,
        create: &dyn Fn() -> ContainerResult<Instance>,
    ) -> ContainerResult<Instance>;

    /// 获取已存在的实例，不会创建
    fn get_if_present(&self, component: &InjectableComponent) -> ContainerResult<Option<Instance>>;

    /// 销毁指定组件在当前状态中的实例
    fn destroy_component(&self, component: &InjectableComponent) -> ContainerResult<()>;

    /// 销毁当前状态中的所有实例
    fn destroy(&self) -> ContainerResult<()>;

    /// 当前状态
    fn state(&self) -> ContainerResult<Arc<dyn ContextState>>;
}

/// 受管上下文：状态可以绑定到当前工作单元、解绑并在之后重新绑定
pub trait ManagedContext: InjectableContext {
    /// 激活上下文；传入已有状态时重新绑定该状态，否则创建新状态
    fn activate(
        &self,
        initial: Option<Arc<dyn ContextState>>,
    ) -> ContainerResult<Arc<dyn ContextState>>;

    /// 解绑当前状态但不销毁
    fn deactivate(&self);

    /// 销毁指定状态；重复销毁为空操作
    fn destroy_state(&self, state: &Arc<dyn ContextState>) -> ContainerResult<()>;

    /// 销毁当前状态并解绑
    fn terminate(&self) {
        if let Ok(state) = self.state() {
            if let Err(e) = self.destroy_state(&state) {
                tracing::warn!("终止上下文失败: {}, 原因: {}", self.scope(), e);
            }
        }
        self.deactivate();
    }
}

/// 上下文生命周期事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextLifecycleEvent {
    /// 事件类型
    pub kind: LifecycleEventKind,
    /// 作用域
    pub scope: ScopeKind,
    /// 状态标识
    pub state_id: String,
}

/// 上下文生命周期监听器
pub trait ContextLifecycleListener: Send + Sync {
    /// 上下文状态初始化、即将销毁或已销毁时调用
    fn on_lifecycle_event(&self, event: &ContextLifecycleEvent) -> ContainerResult<()>;
}
