//! 组件工厂抽象接口
//!
//! 工厂负责创建组件实例；依赖通过 [`CreationContext`] 查找，
//! 依赖作用域的依赖会记录到当前创建上下文中以便统一销毁。
//! 普通作用域的依赖注入为 [`ContextualReference`]，每次访问都从激活的上下文取实例。

use crate::creational::CreationalContext;
use crate::registry::InjectableComponent;
use infrastructure_common::{
    ContainerError, ContainerResult, InjectionPoint, Qualifier, TypeDescriptor,
};
use std::any::Any;
use std::fmt;
use std::sync::{Arc, Weak};

/// 容器管理的组件实例
pub type Instance = Arc<dyn Any + Send + Sync>;

/// 把值包装为组件实例
pub fn instance<T: Any + Send + Sync>(value: T) -> Instance {
    Arc::new(value)
}

/// 把组件实例向下转型为具体类型
pub fn downcast_instance<T: Any + Send + Sync>(
    instance: Instance,
    component: &str,
) -> ContainerResult<Arc<T>> {
    instance
        .downcast::<T>()
        .map_err(|_| ContainerError::TypeMismatch {
            component: component.to_string(),
            expected: std::any::type_name::<T>().to_string(),
        })
}

/// 依赖查找
pub trait DependencyLookup: Send + Sync {
    /// 为注入点解析并获取依赖实例，依赖作用域实例记录到 `parent`
    fn dependency(
        &self,
        injection_point: InjectionPoint,
        parent: &Arc<CreationalContext>,
    ) -> ContainerResult<Instance>;
}

/// 普通作用域实例的来源
pub trait ContextualLookup: Send + Sync {
    /// 当前激活的上下文中的实例
    fn current_instance(&self, component: &Arc<InjectableComponent>) -> ContainerResult<Instance>;
}

/// 普通作用域依赖的转发引用
///
/// 引用本身不持有实例；[`ContextualReference::get`] 每次都经由当前激活的上下文获取，
/// 所以应用作用域组件持有的请求作用域依赖总是指向当前请求的实例。
#[derive(Clone)]
pub struct ContextualReference {
    lookup: Weak<dyn ContextualLookup>,
    component: Arc<InjectableComponent>,
}

impl ContextualReference {
    pub fn new(lookup: Weak<dyn ContextualLookup>, component: Arc<InjectableComponent>) -> Self {
        Self { lookup, component }
    }

    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }

    /// 当前上下文中的实例
    pub fn instance(&self) -> ContainerResult<Instance> {
        let lookup = self
            .lookup
            .upgrade()
            .ok_or_else(|| ContainerError::ContainerNotRunning {
                container: "released".to_string(),
            })?;
        lookup.current_instance(&self.component)
    }

    /// 当前上下文中的实例并转型
    pub fn get<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        downcast_instance(self.instance()?, self.component.identifier())
    }
}

impl fmt::Debug for ContextualReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextualReference")
            .field("component", &self.component.identifier())
            .finish()
    }
}

/// 传给工厂的创建上下文
pub struct CreationContext<'a> {
    creational: &'a Arc<CreationalContext>,
    lookup: &'a dyn DependencyLookup,
}

impl<'a> CreationContext<'a> {
    /// 创建上下文
    pub fn new(creational: &'a Arc<CreationalContext>, lookup: &'a dyn DependencyLookup) -> Self {
        Self { creational, lookup }
    }

    /// 当前创建上下文节点
    pub fn creational(&self) -> &Arc<CreationalContext> {
        self.creational
    }

    /// 当前组件被注入的位置
    pub fn injection_point(&self) -> Option<&InjectionPoint> {
        self.creational.injection_point()
    }

    /// 装饰器的委托实例
    pub fn decorator_delegate(&self) -> Option<Instance> {
        self.creational.decorator_delegate()
    }

    /// 获取依赖实例
    pub fn dependency(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Instance> {
        let mut injection_point = InjectionPoint::new(required_type, qualifiers);
        if let Some(component) = self.creational.component() {
            injection_point = injection_point.declared_by(component);
        }
        self.lookup.dependency(injection_point, self.creational)
    }

    /// 获取依赖实例并转型；普通作用域依赖用 `inject::<ContextualReference>`
    pub fn inject<T: Any + Send + Sync>(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Arc<T>> {
        let label = required_type.to_string();
        let instance = self.dependency(required_type, qualifiers)?;
        downcast_instance(instance, &label)
    }
}

/// 组件工厂 trait
pub trait ComponentFactory: Send + Sync {
    /// 创建组件实例
    fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance>;

    /// 自定义销毁逻辑；创建上下文由调用方释放
    fn destroy(&self, instance: &Instance) -> ContainerResult<()> {
        let _ = instance;
        Ok(())
    }
}

type DestroyFn = Box<dyn Fn(&Instance) -> ContainerResult<()> + Send + Sync>;

/// Lambda 工厂包装器
pub struct LambdaFactory<F> {
    factory_fn: F,
    destroy_fn: Option<DestroyFn>,
}

impl<F> LambdaFactory<F>
where
    F: Fn(&CreationContext<'_>) -> ContainerResult<Instance> + Send + Sync + 'static,
{
    pub fn new(factory_fn: F) -> Self {
        Self {
            factory_fn,
            destroy_fn: None,
        }
    }

    /// 设置销毁回调
    pub fn on_destroy<D>(mut self, destroy_fn: D) -> Self
    where
        D: Fn(&Instance) -> ContainerResult<()> + Send + Sync + 'static,
    {
        self.destroy_fn = Some(Box::new(destroy_fn));
        self
    }

    /// 包装为共享工厂
    pub fn shared(self) -> Arc<dyn ComponentFactory> {
        Arc::new(self)
    }
}

impl<F> ComponentFactory for LambdaFactory<F>
where
    F: Fn(&CreationContext<'_>) -> ContainerResult<Instance> + Send + Sync + 'static,
{
    fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance> {
        (self.factory_fn)(context)
    }

    fn destroy(&self, instance: &Instance) -> ContainerResult<()> {
        match &self.destroy_fn {
            Some(destroy_fn) => destroy_fn(instance),
            None => Ok(()),
        }
    }
}

/// 以闭包创建共享工厂
pub fn factory_fn<F>(factory: F) -> Arc<dyn ComponentFactory>
where
    F: Fn(&CreationContext<'_>) -> ContainerResult<Instance> + Send + Sync + 'static,
{
    LambdaFactory::new(factory).shared()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;

    struct Recording {
        points: Mutex<Vec<InjectionPoint>>,
    }

    impl DependencyLookup for Recording {
        fn dependency(
            &self,
            injection_point: InjectionPoint,
            _parent: &Arc<CreationalContext>,
        ) -> ContainerResult<Instance> {
            self.points.lock().push(injection_point);
            Ok(instance(42_u32))
        }
    }

    /// 测试工厂通过创建上下文获取依赖
    #[test]
    fn test_factory_resolves_dependencies() {
        let lookup = Recording {
            points: Mutex::new(Vec::new()),
        };
        let creational = CreationalContext::for_component("consumer");
        let context = CreationContext::new(&creational, &lookup);

        let factory = LambdaFactory::new(|ctx: &CreationContext<'_>| {
            let answer = ctx.inject::<u32>(TypeDescriptor::class("u32"), [])?;
            Ok(instance(format!("answer={answer}")))
        });

        let created = factory.create(&context).unwrap();
        let text = downcast_instance::<String>(created, "consumer").unwrap();
        assert_eq!(text.as_str(), "answer=42");

        let points = lookup.points.lock();
        assert_eq!(points.len(), 1);
        assert_eq!(points[0].declaring_component.as_deref(), Some("consumer"));
    }

    /// 测试向下转型失败
    #[test]
    fn test_downcast_mismatch() {
        let result = downcast_instance::<String>(instance(1_i32), "number");
        assert!(matches!(result, Err(ContainerError::TypeMismatch { .. })));
    }

    /// 测试销毁回调
    #[test]
    fn test_destroy_callback() {
        let destroyed = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&destroyed);
        let factory = LambdaFactory::new(|_: &CreationContext<'_>| Ok(instance(())))
            .on_destroy(move |_| {
                *counter.lock() += 1;
                Ok(())
            });

        factory.destroy(&instance(())).unwrap();
        assert_eq!(*destroyed.lock(), 1);
    }
}
