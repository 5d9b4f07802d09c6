//! 创建上下文
//!
//! 每次解析请求构建一棵创建上下文树：节点记录父节点、当前注入点、
//! 当前装饰器委托以及传递创建的依赖作用域实例。释放节点会递归销毁这些实例。

use crate::factory::Instance;
use infrastructure_common::{ContainerResult, InjectionPoint};
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::warn;

/// 可销毁的依赖实例
pub trait DestroyableInstance: Send + Sync {
    /// 组件标识
    fn component_id(&self) -> &str;

    /// 销毁实例，重复调用为空操作
    fn destroy(&self) -> ContainerResult<()>;
}

/// 创建上下文树节点
pub struct CreationalContext {
    component: Option<String>,
    parent: Option<Weak<CreationalContext>>,
    injection_point: Option<InjectionPoint>,
    dependents: Mutex<Vec<Arc<dyn DestroyableInstance>>>,
    decorator_delegate: Mutex<Option<Instance>>,
}

impl CreationalContext {
    fn with_parts(
        component: Option<String>,
        parent: Option<Weak<CreationalContext>>,
        injection_point: Option<InjectionPoint>,
    ) -> Arc<Self> {
        Arc::new(Self {
            component,
            parent,
            injection_point,
            dependents: Mutex::new(Vec::new()),
            decorator_delegate: Mutex::new(None),
        })
    }

    /// 创建根节点
    pub fn root() -> Arc<Self> {
        Self::with_parts(None, None, None)
    }

    /// 创建指定组件的根节点
    pub fn for_component(component: impl Into<String>) -> Arc<Self> {
        Self::with_parts(Some(component.into()), None, None)
    }

    /// 创建子节点
    pub fn child(self: &Arc<Self>, component: impl Into<String>) -> Arc<Self> {
        Self::with_parts(Some(component.into()), Some(Arc::downgrade(self)), None)
    }

    /// 创建携带注入点的子节点
    pub fn child_for_injection(
        self: &Arc<Self>,
        component: impl Into<String>,
        injection_point: InjectionPoint,
    ) -> Arc<Self> {
        Self::with_parts(
            Some(component.into()),
            Some(Arc::downgrade(self)),
            Some(injection_point),
        )
    }

    /// 父节点，父节点已释放时返回 `None`
    pub fn parent(&self) -> Option<Arc<Self>> {
        self.parent.as_ref().and_then(Weak::upgrade)
    }

    /// 正在创建的组件标识
    pub fn component(&self) -> Option<&str> {
        self.component.as_deref()
    }

    /// 当前注入点
    pub fn injection_point(&self) -> Option<&InjectionPoint> {
        self.injection_point.as_ref()
    }

    /// 记录依赖作用域实例
    pub fn add_dependent_instance(&self, instance: Arc<dyn DestroyableInstance>) {
        self.dependents.lock().push(instance);
    }

    /// 把依赖作用域实例记录到父节点；没有父节点时返回 `false`
    pub fn add_dependency_to_parent(&self, instance: Arc<dyn DestroyableInstance>) -> bool {
        match self.parent() {
            Some(parent) => {
                parent.add_dependent_instance(instance);
                true
            }
            None => false,
        }
    }

    pub fn dependent_count(&self) -> usize {
        self.dependents.lock().len()
    }

    pub fn has_dependents(&self) -> bool {
        !self.dependents.lock().is_empty()
    }

    /// 按创建的逆序销毁所有依赖实例，失败只记录日志
    pub fn release(&self) {
        let dependents = std::mem::take(&mut *self.dependents.lock());
        for dependent in dependents.into_iter().rev() {
            if let Err(e) = dependent.destroy() {
                warn!("销毁依赖实例失败: {}, 原因: {}", dependent.component_id(), e);
            }
        }
    }

    /// 设置装饰器委托，返回之前的委托
    pub fn set_decorator_delegate(&self, delegate: Option<Instance>) -> Option<Instance> {
        std::mem::replace(&mut *self.decorator_delegate.lock(), delegate)
    }

    /// 当前装饰器委托
    pub fn decorator_delegate(&self) -> Option<Instance> {
        self.decorator_delegate.lock().clone()
    }
}

impl fmt::Debug for CreationalContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CreationalContext")
            .field("component", &self.component)
            .field("injection_point", &self.injection_point)
            .field("dependents", &self.dependent_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    struct Recorded {
        id: String,
        destroyed: AtomicBool,
        order: Arc<Mutex<Vec<String>>>,
        nested: Option<Arc<CreationalContext>>,
    }

    impl DestroyableInstance for Recorded {
        fn component_id(&self) -> &str {
            &self.id
        }

        fn destroy(&self) -> ContainerResult<()> {
            if self.destroyed.swap(true, Ordering::SeqCst) {
                return Ok(());
            }
            if let Some(nested) = &self.nested {
                nested.release();
            }
            self.order.lock().push(self.id.clone());
            Ok(())
        }
    }

    fn recorded(
        id: &str,
        order: &Arc<Mutex<Vec<String>>>,
        nested: Option<Arc<CreationalContext>>,
    ) -> Arc<Recorded> {
        Arc::new(Recorded {
            id: id.to_string(),
            destroyed: AtomicBool::new(false),
            order: Arc::clone(order),
            nested,
        })
    }

    /// 测试释放时递归销毁依赖实例
    #[test]
    fn test_release_destroys_dependents_recursively() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = CreationalContext::root();
        let child = root.child("service");

        child.add_dependent_instance(recorded("leaf", &order, None));
        root.add_dependent_instance(recorded("service", &order, Some(Arc::clone(&child))));
        root.add_dependent_instance(recorded("other", &order, None));

        assert_eq!(root.dependent_count(), 2);
        assert!(order.lock().is_empty());

        root.release();

        assert_eq!(*order.lock(), vec!["other", "leaf", "service"]);
        assert!(!root.has_dependents());
        assert!(!child.has_dependents());
    }

    /// 测试记录到父节点
    #[test]
    fn test_add_dependency_to_parent() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let root = CreationalContext::root();
        let child = root.child("a");

        assert!(child.add_dependency_to_parent(recorded("a", &order, None)));
        assert_eq!(root.dependent_count(), 1);
        assert!(!root.add_dependency_to_parent(recorded("b", &order, None)));
    }

    /// 测试注入点与装饰器委托沿节点传递
    #[test]
    fn test_injection_point_and_delegate() {
        let root = CreationalContext::root();
        let point = InjectionPoint::new(
            infrastructure_common::TypeDescriptor::class("Greeter"),
            std::iter::empty(),
        );
        let child = root.child_for_injection("greeter", point.clone());
        assert_eq!(child.injection_point(), Some(&point));
        assert_eq!(child.component(), Some("greeter"));
        assert!(child.parent().is_some());

        let counter = AtomicUsize::new(0);
        counter.fetch_add(1, Ordering::SeqCst);
        let delegate: Instance = Arc::new(counter);
        assert!(child.set_decorator_delegate(Some(delegate)).is_none());
        assert!(child.decorator_delegate().is_some());
    }
}
