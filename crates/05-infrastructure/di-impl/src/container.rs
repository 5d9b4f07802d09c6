//! 依赖注入容器
//!
//! [`DiContainer`] 是运行时的入口：解析、获取与销毁实例，触发事件，构建并执行拦截器链，
//! 以及访问上下文。容器在 [`DiContainer::shutdown`] 之后拒绝所有调用。

use crate::builtin;
use crate::context::{downcast_state, ContextManager, ManagedContextImpl};
use crate::event::{event_metadata, EventNotifier};
use crate::handle::{FactoryDestroyer, InstanceDestroyer, InstanceHandle};
use crate::interception::{InterceptionExecutor, InterceptorChain};
use crate::proxy::ClientProxy;
use crate::resolver::{resolve_ambiguity, Resolvable, Resolved, Resolver};
use di_abstractions::{
    downcast_instance, instance, AsyncObserverExceptionHandler, ComponentRegistry,
    ContextLifecycleEvent, ContextLifecycleListener, ContextState, ContextualLookup,
    ContextualReference, CreationContext, CreationalContext, DependencyLookup, Event,
    InjectableComponent, InjectableContext, Instance, InvocationContext,
    LoggingAsyncObserverExceptionHandler, ManagedContext, TransactionHook, Value,
};
use infrastructure_common::{
    ComponentKind, ContainerConfig, ContainerError, ContainerResult, InjectionPoint,
    InterceptionKind, LifecycleEventKind, MethodDescriptor, Qualifier, ScopeKind, TypeDescriptor,
};
use parking_lot::Mutex;
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::runtime::Handle;
use tracing::{debug, info, warn};

const DEFAULT_CONTAINER_NAME: &str = "default";
const RELEASED_CONTAINER_NAME: &str = "released";

/// 升级容器弱引用并检查容器仍在运行
pub(crate) fn upgrade(container: &Weak<ContainerInner>) -> ContainerResult<Arc<ContainerInner>> {
    let container = container
        .upgrade()
        .ok_or_else(|| ContainerError::ContainerNotRunning {
            container: RELEASED_CONTAINER_NAME.to_string(),
        })?;
    container.ensure_running()?;
    Ok(container)
}

/// 容器内部状态，由所有句柄共享
pub(crate) struct ContainerInner {
    this: Weak<ContainerInner>,
    name: String,
    config: ContainerConfig,
    resolver: Arc<Resolver>,
    contexts: ContextManager,
    interception: InterceptionExecutor,
    events: Arc<EventNotifier>,
    destroyer: Arc<dyn InstanceDestroyer>,
    running: AtomicBool,
    lifecycle: Mutex<()>,
}

impl ContainerInner {
    pub(crate) fn ensure_running(&self) -> ContainerResult<()> {
        if self.running.load(Ordering::Acquire) {
            Ok(())
        } else {
            Err(ContainerError::ContainerNotRunning {
                container: self.name.clone(),
            })
        }
    }

    pub(crate) fn resolver(&self) -> &Arc<Resolver> {
        &self.resolver
    }

    pub(crate) fn events(&self) -> &Arc<EventNotifier> {
        &self.events
    }

    fn destroyer(&self) -> Arc<dyn InstanceDestroyer> {
        Arc::clone(&self.destroyer)
    }

    /// 创建实例；失败时释放已记录到创建上下文中的拦截器与依赖实例
    fn create_instance(
        &self,
        component: &Arc<InjectableComponent>,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<Instance> {
        let created = self.construct(component, creational);
        if created.is_err() {
            creational.release();
        }
        created
    }

    /// 构造拦截、构造完成回调、装饰器
    fn construct(
        &self,
        component: &Arc<InjectableComponent>,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<Instance> {
        let bindings = &component.definition().interceptor_bindings;
        let create =
            || -> ContainerResult<Instance> { component.create(&CreationContext::new(creational, self)) };

        let instance = if bindings.is_empty() {
            create()?
        } else {
            let chain = self.interception.build_chain(
                InterceptionKind::AroundConstruct,
                bindings,
                creational,
                self,
            )?;
            let instance = if chain.is_empty() {
                create()?
            } else {
                chain.construct(&create)?
            };
            self.interception
                .build_chain(InterceptionKind::PostConstruct, bindings, creational, self)?
                .invoke_lifecycle(&instance)?;
            instance
        };
        debug!("创建组件实例: {}", component.identifier());
        self.decorate(component, instance, creational)
    }

    /// 按优先级降序创建装饰器，优先级最低的装饰器位于最外层
    fn decorate(
        &self,
        component: &Arc<InjectableComponent>,
        instance: Instance,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<Instance> {
        let definition = component.definition();
        if definition.kind != ComponentKind::Normal {
            return Ok(instance);
        }
        let decorators = self
            .resolver
            .resolve_decorators(&definition.types, &definition.qualifiers);
        let mut current = instance;
        for decorator in decorators.iter().rev() {
            let decorator_component = decorator.component();
            let child = creational.child(decorator_component.identifier());
            child.set_decorator_delegate(Some(Arc::clone(&current)));
            let decorated = decorator_component.create(&CreationContext::new(&child, self))?;
            creational.add_dependent_instance(Arc::new(InstanceHandle::new(
                Arc::clone(&decorated),
                Arc::clone(decorator_component),
                child,
                Arc::new(FactoryDestroyer),
            )));
            current = decorated;
        }
        Ok(current)
    }

    /// 销毁实例：销毁前回调、工厂销毁逻辑、释放创建上下文
    fn destroy_instance(
        &self,
        component: &InjectableComponent,
        instance: &Instance,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<()> {
        let bindings = &component.definition().interceptor_bindings;
        let pre_destroy = if bindings.is_empty() {
            Ok(())
        } else {
            self.interception
                .build_chain(InterceptionKind::PreDestroy, bindings, creational, self)
                .and_then(|chain| chain.invoke_lifecycle(instance))
        };
        if let Err(e) = &pre_destroy {
            warn!("销毁前回调失败: {}, 原因: {}", component.identifier(), e);
        }
        let destroyed = component.factory().destroy(instance);
        creational.release();
        pre_destroy.and(destroyed)
    }

    /// 普通作用域与单例作用域实例，从激活的上下文中获取
    pub(crate) fn contextual_instance(
        &self,
        component: &Arc<InjectableComponent>,
    ) -> ContainerResult<Instance> {
        let context = self.contexts.active_context(component.scope())?;
        let creational = CreationalContext::for_component(component.identifier());
        let create = || self.create_instance(component, &creational);
        context.get(component, &creational, &create)
    }

    /// 获取实例句柄；依赖作用域实例记录到 `owner`，没有 `owner` 时句柄持有独立的根节点
    pub(crate) fn instance_handle(
        &self,
        component: Arc<InjectableComponent>,
        owner: Option<&Arc<CreationalContext>>,
        injection_point: Option<InjectionPoint>,
    ) -> ContainerResult<Arc<InstanceHandle>> {
        if component.definition().is_dependent() {
            let root = CreationalContext::root();
            let parent = owner.unwrap_or(&root);
            let creational = match injection_point {
                Some(injection_point) => {
                    parent.child_for_injection(component.identifier(), injection_point)
                }
                None => parent.child(component.identifier()),
            };
            let instance = self.create_instance(&component, &creational)?;
            let handle = InstanceHandle::new(instance, component, creational, self.destroyer());
            return Ok(match owner {
                Some(owner) => {
                    let handle = Arc::new(handle);
                    owner.add_dependent_instance(Arc::clone(&handle) as _);
                    handle
                }
                None => Arc::new(handle.with_parent(root)),
            });
        }

        let context = self.contexts.active_context(component.scope())?;
        let state = context.state()?;
        let creational = CreationalContext::for_component(component.identifier());
        let create = || self.create_instance(&component, &creational);
        let instance = context.get(&component, &creational, &create)?;
        let state_id = state.id().to_string();
        let handle = match downcast_state(state) {
            Some(state) => InstanceHandle::contextual(instance, component, creational, state),
            None => InstanceHandle::foreign(instance, component, creational, context, state_id),
        };
        Ok(Arc::new(handle))
    }

    /// 解析注入点；`forward` 为真时普通作用域依赖以转发引用注入
    pub(crate) fn resolve_dependency(
        &self,
        injection_point: InjectionPoint,
        parent: &Arc<CreationalContext>,
        forward: bool,
    ) -> ContainerResult<Instance> {
        let resolvable = Resolvable::new(
            injection_point.required_type.clone(),
            injection_point.qualifiers.iter().cloned(),
        );
        let component = self.resolver.resolve_single(&resolvable)?;
        if component.definition().is_dependent() {
            return self
                .instance_handle(component, Some(parent), Some(injection_point))?
                .instance();
        }
        if forward && component.scope().is_normal() {
            let lookup: Weak<dyn ContextualLookup> = self.this.clone();
            return Ok(instance(ContextualReference::new(lookup, component)));
        }
        self.contextual_instance(&component)
    }

    fn fire_lifecycle(&self, kind: LifecycleEventKind, scope: ScopeKind, state_id: String) {
        let lifecycle = ContextLifecycleEvent {
            kind,
            scope,
            state_id,
        };
        if let Err(e) = self.events.on_lifecycle_event(&lifecycle) {
            warn!(
                "上下文生命周期事件通知失败: {}, 作用域: {}, 原因: {}",
                kind, lifecycle.scope, e
            );
        }
    }

    fn application_state_id(&self) -> String {
        self.contexts
            .application()
            .state()
            .map(|state| state.id().to_string())
            .unwrap_or_default()
    }
}

impl DependencyLookup for ContainerInner {
    fn dependency(
        &self,
        injection_point: InjectionPoint,
        parent: &Arc<CreationalContext>,
    ) -> ContainerResult<Instance> {
        self.resolve_dependency(injection_point, parent, true)
    }
}

impl ContextualLookup for ContainerInner {
    fn current_instance(&self, component: &Arc<InjectableComponent>) -> ContainerResult<Instance> {
        self.ensure_running()?;
        self.contextual_instance(component)
    }
}

/// 带容器生命周期回调的实例销毁逻辑
struct ContainerDestroyer {
    container: Weak<ContainerInner>,
}

impl InstanceDestroyer for ContainerDestroyer {
    fn destroy_instance(
        &self,
        component: &InjectableComponent,
        instance: &Instance,
        creational: &Arc<CreationalContext>,
    ) -> ContainerResult<()> {
        match self.container.upgrade() {
            Some(container) => container.destroy_instance(component, instance, creational),
            None => FactoryDestroyer.destroy_instance(component, instance, creational),
        }
    }
}

/// 容器构建器
pub struct DiContainerBuilder {
    registry: ComponentRegistry,
    name: String,
    config: ContainerConfig,
    transaction_hook: Option<Arc<dyn TransactionHook>>,
    exception_handler: Arc<dyn AsyncObserverExceptionHandler>,
    runtime: Option<Handle>,
}

impl DiContainerBuilder {
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_config(mut self, config: ContainerConfig) -> Self {
        self.config = config;
        self
    }

    /// 设置事务钩子
    pub fn with_transaction_hook(mut self, hook: Arc<dyn TransactionHook>) -> Self {
        self.transaction_hook = Some(hook);
        self
    }

    /// 设置异步观察者异常处理器
    pub fn with_exception_handler(mut self, handler: Arc<dyn AsyncObserverExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }

    /// 设置异步事件使用的运行时
    pub fn with_runtime(mut self, runtime: Handle) -> Self {
        self.runtime = Some(runtime);
        self
    }

    /// 构建容器，容器内置组件被追加到注册表
    pub fn build(self) -> DiContainer {
        let Self {
            registry,
            name,
            config,
            transaction_hook,
            exception_handler,
            runtime,
        } = self;

        let inner = Arc::new_cyclic(|weak: &Weak<ContainerInner>| {
            let registry = Arc::new(registry.with_built_ins(builtin::built_in_components(weak)));
            let resolver = Arc::new(
                Resolver::new(Arc::clone(&registry))
                    .with_remove_unused_warning(config.remove_unused_warning),
            );
            let destroyer: Arc<dyn InstanceDestroyer> = Arc::new(ContainerDestroyer {
                container: weak.clone(),
            });
            let contexts = ContextManager::new(registry.contexts(), Arc::clone(&destroyer));
            let events = Arc::new(
                EventNotifier::new(Arc::clone(&resolver), Arc::clone(contexts.request()))
                    .with_config(&config)
                    .with_transaction_hook(transaction_hook)
                    .with_exception_handler(exception_handler)
                    .with_runtime(runtime),
            );
            ContainerInner {
                this: weak.clone(),
                interception: InterceptionExecutor::new(Arc::clone(&resolver)),
                name,
                config,
                resolver,
                contexts,
                events,
                destroyer,
                running: AtomicBool::new(true),
                lifecycle: Mutex::new(()),
            }
        });

        let listener: Weak<dyn ContextLifecycleListener> =
            Arc::downgrade(&inner.events) as Weak<dyn ContextLifecycleListener>;
        inner.contexts.request().set_listener(listener);

        info!(
            "依赖注入容器已创建: {}, 组件数: {}",
            inner.name,
            inner.resolver.registry().components().len()
        );
        DiContainer { inner }
    }
}

/// 依赖注入容器
#[derive(Clone)]
pub struct DiContainer {
    inner: Arc<ContainerInner>,
}

impl DiContainer {
    /// 以注册表创建容器构建器
    pub fn builder(registry: ComponentRegistry) -> DiContainerBuilder {
        DiContainerBuilder {
            registry,
            name: DEFAULT_CONTAINER_NAME.to_string(),
            config: ContainerConfig::default(),
            transaction_hook: None,
            exception_handler: Arc::new(LoggingAsyncObserverExceptionHandler),
            runtime: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.inner.config
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// 初始化容器，通知应用上下文已初始化
    pub fn init(&self) -> ContainerResult<()> {
        self.inner.ensure_running()?;
        let _lifecycle = self.inner.lifecycle.lock();
        info!("初始化依赖注入容器: {}", self.inner.name);
        let lifecycle = ContextLifecycleEvent {
            kind: LifecycleEventKind::Initialized,
            scope: ScopeKind::Application,
            state_id: self.inner.application_state_id(),
        };
        self.inner.events.on_lifecycle_event(&lifecycle)
    }

    /// 关闭容器；重复调用为空操作
    pub fn shutdown(&self) {
        let inner = &self.inner;
        let _lifecycle = inner.lifecycle.lock();
        if !inner.running.load(Ordering::Acquire) {
            return;
        }
        info!("关闭依赖注入容器: {}", inner.name);

        inner.contexts.request().destroy_all();

        let state_id = inner.application_state_id();
        inner.fire_lifecycle(
            LifecycleEventKind::BeforeDestroyed,
            ScopeKind::Application,
            state_id.clone(),
        );
        if let Err(e) = inner.contexts.application().destroy() {
            warn!("销毁应用上下文失败: {}", e);
        }
        inner.fire_lifecycle(LifecycleEventKind::Destroyed, ScopeKind::Application, state_id);
        if let Err(e) = inner.contexts.singleton().destroy() {
            warn!("销毁单例上下文失败: {}", e);
        }

        inner.resolver.clear();
        inner.interception.clear();
        inner.events.clear();
        inner.running.store(false, Ordering::Release);
        info!("依赖注入容器已关闭: {}", inner.name);
    }

    /// 解析组件集合
    pub fn resolve(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Resolved> {
        self.inner.ensure_running()?;
        Ok(self
            .inner
            .resolver
            .resolve(&Resolvable::new(required_type, qualifiers)))
    }

    /// 解析唯一组件
    pub fn resolve_single(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Arc<InjectableComponent>> {
        self.inner.ensure_running()?;
        self.inner
            .resolver
            .resolve_single(&Resolvable::new(required_type, qualifiers))
    }

    /// 解析唯一组件并返回实例句柄
    pub fn instance(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Arc<InstanceHandle>> {
        let qualifiers: BTreeSet<Qualifier> = qualifiers.into_iter().collect();
        let component = self.resolve_single(required_type.clone(), qualifiers.iter().cloned())?;
        // 内置组件需要请求的类型，例如事件发布者的事件类型
        let injection_point = (component.definition().kind == ComponentKind::BuiltIn)
            .then(|| InjectionPoint::new(required_type, qualifiers));
        self.inner.instance_handle(component, None, injection_point)
    }

    /// 解析唯一组件并转型实例
    pub fn get<T: Any + Send + Sync>(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Arc<T>> {
        self.instance(required_type, qualifiers)?.get::<T>()
    }

    /// 按标识获取实例句柄
    pub fn instance_by_id(&self, identifier: &str) -> ContainerResult<Option<Arc<InstanceHandle>>> {
        self.inner.ensure_running()?;
        match self.inner.resolver.component_by_id(identifier) {
            Some(component) => self.inner.instance_handle(component, None, None).map(Some),
            None => Ok(None),
        }
    }

    /// 按名称获取实例句柄
    pub fn instance_by_name(&self, name: &str) -> ContainerResult<Option<Arc<InstanceHandle>>> {
        self.inner.ensure_running()?;
        match self.inner.resolver.resolve_by_name(name)? {
            Some(component) => self.inner.instance_handle(component, None, None).map(Some),
            None => Ok(None),
        }
    }

    /// 获取组件实例；普通作用域实例来自激活的上下文，依赖作用域每次创建新实例
    pub fn get_component(&self, component: &Arc<InjectableComponent>) -> ContainerResult<Instance> {
        self.inner.ensure_running()?;
        self.inner.instance_handle(Arc::clone(component), None, None)?.instance()
    }

    /// 获取已存在的上下文实例；上下文未激活或依赖作用域时返回 `None`
    pub fn get_if_active(&self, component: &InjectableComponent) -> ContainerResult<Option<Instance>> {
        self.inner.ensure_running()?;
        if component.definition().is_dependent() {
            return Ok(None);
        }
        match self.inner.contexts.get_active_context(component.scope())? {
            Some(context) => context.get_if_present(component),
            None => Ok(None),
        }
    }

    /// 销毁组件在激活上下文中的实例
    pub fn destroy(&self, component: &InjectableComponent) -> ContainerResult<()> {
        self.inner.ensure_running()?;
        if component.definition().is_dependent() {
            return Err(ContainerError::invalid_argument(format!(
                "依赖作用域组件没有上下文实例, 请通过实例句柄销毁: {}",
                component.identifier()
            )));
        }
        self.inner
            .contexts
            .active_context(component.scope())?
            .destroy_component(component)
    }

    /// 类型精确匹配的实例提供者；没有匹配时返回 `None`
    pub fn instance_supplier(
        &self,
        required_type: &TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Option<InstanceSupplier>> {
        self.inner.ensure_running()?;
        let resolvable = Resolvable::new(required_type.clone(), qualifiers);
        let registry = self.inner.resolver.registry();
        let exact: Vec<Arc<InjectableComponent>> = registry
            .components()
            .iter()
            .filter(|component| {
                let definition = component.definition();
                definition.types.contains(&resolvable.required_type)
                    && registry
                        .binding_rules()
                        .contains_all(&definition.qualifiers, &resolvable.qualifiers)
            })
            .cloned()
            .collect();
        match resolve_ambiguity(exact).as_slice() {
            [] => Ok(None),
            [component] => Ok(Some(InstanceSupplier {
                container: Arc::downgrade(&self.inner),
                component: Arc::clone(component),
            })),
            many => Err(ContainerError::AmbiguousResolution {
                required_type: resolvable.required_type.to_string(),
                qualifiers: infrastructure_common::display_qualifiers(&resolvable.qualifiers),
                candidates: many.iter().map(|c| c.identifier().to_string()).collect(),
            }),
        }
    }

    /// 普通作用域组件的客户端代理
    pub fn client_proxy<T: Any + Send + Sync>(
        &self,
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<ClientProxy<T>> {
        let component = self.resolve_single(required_type, qualifiers)?;
        ClientProxy::new(self.clone(), component)
    }

    /// 同步触发事件
    pub fn fire(
        &self,
        payload: &Event,
        event_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<()> {
        self.inner.ensure_running()?;
        self.inner.events.fire(payload, event_type, qualifiers)
    }

    /// 异步触发事件
    pub fn fire_async(
        &self,
        payload: Event,
        event_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> impl Future<Output = ContainerResult<()>> + Send + 'static {
        let metadata = event_metadata(event_type, qualifiers);
        let delivery = self
            .inner
            .ensure_running()
            .map(|()| self.inner.events.fire_async_event(payload, metadata));
        async move { delivery?.await }
    }

    /// 构建拦截器链，拦截器实例在链释放时销毁
    pub fn build_chain(
        &self,
        kind: InterceptionKind,
        bindings: &BTreeSet<Qualifier>,
    ) -> ContainerResult<InterceptorChain> {
        self.inner.ensure_running()?;
        let creational = CreationalContext::root();
        self.inner
            .interception
            .build_chain(kind, bindings, &creational, self.inner.as_ref())
    }

    /// 通过拦截器链调用目标方法
    pub fn invoke<F>(
        &self,
        chain: &InterceptorChain,
        target: Instance,
        method: &MethodDescriptor,
        parameters: Vec<Value>,
        target_method: F,
    ) -> ContainerResult<Value>
    where
        F: for<'b> Fn(&mut InvocationContext<'b>) -> ContainerResult<Value>,
    {
        self.inner.ensure_running()?;
        chain.invoke(Some(target), Some(method), parameters, target_method)
    }

    /// 作用域的所有上下文
    pub fn contexts(&self, scope: &ScopeKind) -> Vec<Arc<dyn InjectableContext>> {
        self.inner.contexts.contexts(scope)
    }

    /// 作用域当前唯一的激活上下文
    pub fn get_active_context(
        &self,
        scope: &ScopeKind,
    ) -> ContainerResult<Option<Arc<dyn InjectableContext>>> {
        self.inner.ensure_running()?;
        self.inner.contexts.get_active_context(scope)
    }

    /// 请求上下文，用于激活、停用和销毁请求状态
    pub fn request_context(&self) -> Arc<ManagedContextImpl> {
        Arc::clone(self.inner.contexts.request())
    }

    pub fn resolver(&self) -> &Arc<Resolver> {
        &self.inner.resolver
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        self.inner.resolver.registry()
    }
}

impl fmt::Debug for DiContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiContainer")
            .field("name", &self.inner.name)
            .field("running", &self.is_running())
            .field("contexts", &self.inner.contexts)
            .finish()
    }
}

/// 可重复使用的实例提供者
#[derive(Clone)]
pub struct InstanceSupplier {
    container: Weak<ContainerInner>,
    component: Arc<InjectableComponent>,
}

impl InstanceSupplier {
    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }

    /// 获取实例句柄
    pub fn get(&self) -> ContainerResult<Arc<InstanceHandle>> {
        let container = upgrade(&self.container)?;
        container.instance_handle(Arc::clone(&self.component), None, None)
    }

    /// 获取并转型实例
    pub fn get_as<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let instance = self.get()?.instance()?;
        downcast_instance(instance, self.component.identifier())
    }
}

impl fmt::Debug for InstanceSupplier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceSupplier")
            .field("component", &self.component.identifier())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{event, factory_fn, instance, Components, LambdaFactory};
    use infrastructure_common::{ComponentDefinition, ObserverMetadata};
    use parking_lot::Mutex as TestMutex;
    use std::sync::atomic::AtomicUsize;

    fn class(name: &str) -> TypeDescriptor {
        TypeDescriptor::class(name)
    }

    fn container(components: Components) -> DiContainer {
        let registry = ComponentRegistry::build([components]).unwrap();
        let container = DiContainer::builder(registry).build();
        container.init().unwrap();
        container
    }

    struct Repository {
        url: String,
    }

    struct Service {
        repository: ContextualReference,
    }

    struct Cart {
        id: usize,
    }

    struct Shop {
        cart: ContextualReference,
    }

    struct Peer {
        name: &'static str,
        other: ContextualReference,
    }

    /// 测试依赖注入与应用作用域共享
    #[test]
    fn test_dependency_injection() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&created);
        let container = container(
            Components::new()
                .with_component(
                    ComponentDefinition::new("repository", class("Repository"))
                        .with_scope(ScopeKind::Application),
                    factory_fn(move |_| {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Ok(instance(Repository {
                            url: "memory://".to_string(),
                        }))
                    }),
                )
                .with_component(
                    ComponentDefinition::new("service", class("Service")),
                    factory_fn(|ctx| {
                        let repository =
                            ctx.inject::<ContextualReference>(TypeDescriptor::class("Repository"), [])?;
                        Ok(instance(Service {
                            repository: (*repository).clone(),
                        }))
                    }),
                ),
        );

        let first = container.get::<Service>(class("Service"), []).unwrap();
        let second = container.get::<Service>(class("Service"), []).unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        let repository = first.repository.get::<Repository>().unwrap();
        assert!(Arc::ptr_eq(
            &repository,
            &second.repository.get::<Repository>().unwrap()
        ));
        assert_eq!(repository.url, "memory://");
        assert_eq!(created.load(Ordering::SeqCst), 1);
    }

    fn shop_container(destroyed: &Arc<TestMutex<Vec<usize>>>) -> DiContainer {
        let next = Arc::new(AtomicUsize::new(0));
        let log = Arc::clone(destroyed);
        container(
            Components::new()
                .with_component(
                    ComponentDefinition::new("cart", class("Cart")).with_scope(ScopeKind::Request),
                    LambdaFactory::new(move |_: &CreationContext<'_>| {
                        Ok(instance(Cart {
                            id: next.fetch_add(1, Ordering::SeqCst),
                        }))
                    })
                    .on_destroy(move |cart| {
                        if let Some(cart) = cart.downcast_ref::<Cart>() {
                            log.lock().push(cart.id);
                        }
                        Ok(())
                    })
                    .shared(),
                )
                .with_component(
                    ComponentDefinition::new("shop", class("Shop")).with_scope(ScopeKind::Application),
                    factory_fn(|ctx| {
                        let cart = ctx.inject::<ContextualReference>(class("Cart"), [])?;
                        Ok(instance(Shop {
                            cart: (*cart).clone(),
                        }))
                    }),
                ),
        )
    }

    /// 测试应用作用域组件中的请求作用域依赖跟随当前请求
    #[test]
    fn test_request_dependency_follows_active_request() {
        let destroyed = Arc::new(TestMutex::new(Vec::new()));
        let container = shop_container(&destroyed);
        let request = container.request_context();

        // 创建应用作用域组件时不需要激活的请求
        let shop = container.get::<Shop>(class("Shop"), []).unwrap();
        assert!(matches!(
            shop.cart.get::<Cart>(),
            Err(ContainerError::ContextNotActive { .. })
        ));

        request.activate(None).unwrap();
        assert_eq!(shop.cart.get::<Cart>().unwrap().id, 0);
        request.terminate();

        request.activate(None).unwrap();
        let again = container.get::<Shop>(class("Shop"), []).unwrap();
        assert!(Arc::ptr_eq(&shop, &again));
        assert_eq!(again.cart.get::<Cart>().unwrap().id, 1);
        assert_eq!(container.get::<Cart>(class("Cart"), []).unwrap().id, 1);
        request.terminate();

        assert_eq!(*destroyed.lock(), vec![0, 1]);
    }

    /// 测试互相依赖的应用作用域组件
    #[test]
    fn test_mutually_dependent_application_components() {
        let peer = |id: &'static str, other: &'static str| {
            (
                ComponentDefinition::new(id, class(id)).with_scope(ScopeKind::Application),
                factory_fn(move |ctx| {
                    let other = ctx.inject::<ContextualReference>(class(other), [])?;
                    Ok(instance(Peer {
                        name: id,
                        other: (*other).clone(),
                    }))
                }),
            )
        };
        let (alpha, alpha_factory) = peer("Alpha", "Beta");
        let (beta, beta_factory) = peer("Beta", "Alpha");
        let container = container(
            Components::new()
                .with_component(alpha, alpha_factory)
                .with_component(beta, beta_factory),
        );

        let alpha = container.get::<Peer>(class("Alpha"), []).unwrap();
        let beta = alpha.other.get::<Peer>().unwrap();
        assert_eq!(beta.name, "Beta");
        assert!(Arc::ptr_eq(&alpha, &beta.other.get::<Peer>().unwrap()));
    }

    /// 测试句柄只销毁创建它的请求状态中的实例
    #[test]
    fn test_handle_destroys_its_own_request_state() {
        let destroyed = Arc::new(TestMutex::new(Vec::new()));
        let container = shop_container(&destroyed);
        let request = container.request_context();

        let first_state = request.activate(None).unwrap();
        let first = container.instance(class("Cart"), []).unwrap();
        request.deactivate();

        request.activate(None).unwrap();
        let second = container.instance(class("Cart"), []).unwrap();

        first.destroy().unwrap();
        assert_eq!(*destroyed.lock(), vec![0]);
        assert!(!first.is_available());
        assert!(second.is_available());
        assert_eq!(container.get::<Cart>(class("Cart"), []).unwrap().id, 1);
        request.terminate();

        // 第一个状态中的实例已被移除，销毁状态时不会再次销毁
        request.destroy_state(&first_state).unwrap();
        assert_eq!(*destroyed.lock(), vec![0, 1]);
    }

    /// 测试关闭容器时销毁绑定在其它线程上的请求状态
    #[test]
    fn test_shutdown_destroys_requests_on_other_threads() {
        let destroyed = Arc::new(TestMutex::new(Vec::new()));
        let container = shop_container(&destroyed);
        let (bound_tx, bound_rx) = std::sync::mpsc::channel();
        let (done_tx, done_rx) = std::sync::mpsc::channel::<()>();

        let worker = {
            let container = container.clone();
            std::thread::spawn(move || {
                let request = container.request_context();
                request.activate(None).unwrap();
                let cart = container.get::<Cart>(class("Cart"), []).unwrap();
                bound_tx.send(cart.id).unwrap();
                done_rx.recv().unwrap();
                // 状态仍绑定在本线程上，但已被销毁
                assert!(!request.is_active());
            })
        };

        assert_eq!(bound_rx.recv().unwrap(), 0);
        assert_eq!(container.request_context().live_state_count(), 1);
        container.shutdown();
        assert_eq!(*destroyed.lock(), vec![0]);
        assert_eq!(container.request_context().live_state_count(), 0);

        done_tx.send(()).unwrap();
        worker.join().unwrap();
    }

    /// 测试依赖作用域实例随父实例销毁
    #[test]
    fn test_dependent_destroyed_with_parent() {
        let destroyed = Arc::new(TestMutex::new(Vec::new()));
        let log = Arc::clone(&destroyed);
        let container = container(
            Components::new()
                .with_component(
                    ComponentDefinition::new("helper", class("Helper")),
                    LambdaFactory::new(|_: &CreationContext<'_>| Ok(instance(())))
                        .on_destroy(move |_| {
                            log.lock().push("helper");
                            Ok(())
                        })
                        .shared(),
                )
                .with_component(
                    ComponentDefinition::new("owner", class("Owner")),
                    factory_fn(|ctx| {
                        ctx.dependency(TypeDescriptor::class("Helper"), [])?;
                        Ok(instance(()))
                    }),
                ),
        );

        let owner = container.instance(class("Owner"), []).unwrap();
        assert_eq!(owner.creational().dependent_count(), 1);
        assert!(destroyed.lock().is_empty());

        owner.destroy().unwrap();
        assert_eq!(*destroyed.lock(), vec!["helper"]);
    }

    /// 测试请求作用域需要激活的上下文
    #[test]
    fn test_request_scope_requires_active_context() {
        let container = container(Components::new().with_component(
            ComponentDefinition::new("cart", class("Cart")).with_scope(ScopeKind::Request),
            factory_fn(|_| Ok(instance(Vec::<String>::new()))),
        ));

        assert!(matches!(
            container.instance(class("Cart"), []),
            Err(ContainerError::ContextNotActive { .. })
        ));

        let request = container.request_context();
        request.activate(None).unwrap();
        let first = container.instance(class("Cart"), []).unwrap();
        let second = container.instance(class("Cart"), []).unwrap();
        assert!(Arc::ptr_eq(&first.instance().unwrap(), &second.instance().unwrap()));

        let component = Arc::clone(first.component());
        assert!(container.get_if_active(&component).unwrap().is_some());
        request.terminate();
        assert!(container.get_if_active(&component).unwrap().is_none());
    }

    /// 测试关闭后的调用被拒绝，应用上下文实例被销毁
    #[test]
    fn test_shutdown() {
        let destroyed = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&destroyed);
        let lifecycle = Arc::new(TestMutex::new(Vec::new()));
        let events = Arc::clone(&lifecycle);
        let container = container(
            Components::new()
                .with_component(
                    ComponentDefinition::new("cache", class("Cache")).with_scope(ScopeKind::Application),
                    LambdaFactory::new(|_: &CreationContext<'_>| Ok(instance(())))
                        .on_destroy(move |_| {
                            counter.fetch_add(1, Ordering::SeqCst);
                            Ok(())
                        })
                        .shared(),
                )
                .with_observer(di_abstractions::ObserverMethod::new(
                    ObserverMetadata::new("lifecycle", class(crate::context::CONTEXT_LIFECYCLE_EVENT_TYPE)),
                    move |ctx: &di_abstractions::EventContext<'_>| -> Result<(), infrastructure_common::BoxError> {
                        if let Some(lifecycle) = ctx.event::<ContextLifecycleEvent>() {
                            if lifecycle.scope == ScopeKind::Application {
                                events.lock().push(lifecycle.kind);
                            }
                        }
                        Ok(())
                    },
                )),
        );

        container.get_component(&container.resolve_single(class("Cache"), []).unwrap()).unwrap();
        container.shutdown();
        container.shutdown();

        assert!(!container.is_running());
        assert_eq!(destroyed.load(Ordering::SeqCst), 1);
        assert_eq!(
            *lifecycle.lock(),
            vec![
                LifecycleEventKind::Initialized,
                LifecycleEventKind::BeforeDestroyed,
                LifecycleEventKind::Destroyed,
            ]
        );
        assert!(matches!(
            container.resolve(class("Cache"), []),
            Err(ContainerError::ContainerNotRunning { .. })
        ));
        assert!(matches!(
            container.fire(&event(()), class("Anything"), []),
            Err(ContainerError::ContainerNotRunning { .. })
        ));
    }

    /// 测试按标识、名称与精确类型获取
    #[test]
    fn test_lookup_by_id_name_and_supplier() {
        let container = container(
            Components::new()
                .with_component(
                    ComponentDefinition::new("greeter", class("EnglishGreeter"))
                        .with_type(class("Greeter"))
                        .with_name("greeter"),
                    factory_fn(|_| Ok(instance("hello".to_string()))),
                )
                .with_component(
                    ComponentDefinition::new("fallback", class("SilentGreeter"))
                        .with_type(class("Greeter"))
                        .as_default(),
                    factory_fn(|_| Ok(instance(String::new()))),
                ),
        );

        let by_id = container.instance_by_id("greeter").unwrap().unwrap();
        assert_eq!(by_id.get::<String>().unwrap().as_str(), "hello");
        assert!(container.instance_by_id("missing").unwrap().is_none());
        assert!(container.instance_by_name("greeter").unwrap().is_some());

        let supplier = container
            .instance_supplier(&class("Greeter"), [])
            .unwrap()
            .unwrap();
        assert_eq!(supplier.component().identifier(), "greeter");
        assert_eq!(supplier.get_as::<String>().unwrap().as_str(), "hello");
        assert!(container
            .instance_supplier(&class("Unknown"), [])
            .unwrap()
            .is_none());
    }
}
