//! 组件注册表
//!
//! 注册表在启动时由一个或多个 [`Components`] 贡献一次性构建，之后只读，
//! 可以在多线程之间无锁共享。

use crate::context::InjectableContext;
use crate::event::ObserverMethod;
use crate::factory::{ComponentFactory, CreationContext, Instance};
use crate::interceptor::InterceptorDefinition;
use infrastructure_common::{
    BindingRules, ComponentDefinition, ComponentKind, ContainerError, ContainerResult,
    DecoratorMetadata, LifecycleError, Qualifier, TypeDeclaration, TypeDescriptor, TypeHierarchy,
};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 可注入组件：组件定义与其工厂
pub struct InjectableComponent {
    definition: Arc<ComponentDefinition>,
    factory: Arc<dyn ComponentFactory>,
}

impl InjectableComponent {
    pub fn new(definition: ComponentDefinition, factory: Arc<dyn ComponentFactory>) -> Self {
        Self {
            definition: Arc::new(definition),
            factory,
        }
    }

    pub fn definition(&self) -> &Arc<ComponentDefinition> {
        &self.definition
    }

    pub fn factory(&self) -> &Arc<dyn ComponentFactory> {
        &self.factory
    }

    pub fn identifier(&self) -> &str {
        &self.definition.identifier
    }

    pub fn scope(&self) -> &infrastructure_common::ScopeKind {
        &self.definition.scope
    }

    /// 调用工厂创建实例
    pub fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance> {
        self.factory.create(context)
    }
}

impl fmt::Debug for InjectableComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InjectableComponent")
            .field("identifier", &self.definition.identifier)
            .field("scope", &self.definition.scope)
            .field("kind", &self.definition.kind)
            .finish()
    }
}

/// 装饰器定义
///
/// 装饰器工厂通过 [`CreationContext::decorator_delegate`] 获得被装饰的实例。
pub struct DecoratorDefinition {
    component: Arc<InjectableComponent>,
    metadata: DecoratorMetadata,
}

impl DecoratorDefinition {
    pub fn new(
        definition: ComponentDefinition,
        factory: Arc<dyn ComponentFactory>,
        metadata: DecoratorMetadata,
    ) -> Self {
        let definition = definition.with_kind(ComponentKind::Decorator).normalized();
        Self {
            component: Arc::new(InjectableComponent::new(definition, factory)),
            metadata,
        }
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn priority(&self) -> i32 {
        self.metadata.priority
    }

    pub fn delegate_type(&self) -> &TypeDescriptor {
        &self.metadata.delegate_type
    }

    pub fn delegate_qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.metadata.delegate_qualifiers
    }

    pub fn decorated_types(&self) -> &[TypeDescriptor] {
        &self.metadata.decorated_types
    }

    pub fn metadata(&self) -> &DecoratorMetadata {
        &self.metadata
    }

    /// 装饰器自身的组件
    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }
}

impl fmt::Debug for DecoratorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoratorDefinition")
            .field("metadata", &self.metadata)
            .finish()
    }
}

/// 一次注册表贡献
#[derive(Default)]
pub struct Components {
    components: Vec<(ComponentDefinition, Arc<dyn ComponentFactory>)>,
    removed: Vec<ComponentDefinition>,
    interceptors: Vec<InterceptorDefinition>,
    decorators: Vec<DecoratorDefinition>,
    observers: Vec<ObserverMethod>,
    transitive_bindings: HashMap<String, BTreeSet<Qualifier>>,
    types: Vec<TypeDeclaration>,
    binding_rules: BindingRules,
    contexts: Vec<Arc<dyn InjectableContext>>,
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    /// 添加组件
    pub fn with_component(
        mut self,
        definition: ComponentDefinition,
        factory: Arc<dyn ComponentFactory>,
    ) -> Self {
        self.components.push((definition, factory));
        self
    }

    /// 添加构建期被移除的组件，仅用于诊断
    pub fn with_removed(mut self, definition: ComponentDefinition) -> Self {
        self.removed.push(definition);
        self
    }

    pub fn with_interceptor(mut self, interceptor: InterceptorDefinition) -> Self {
        self.interceptors.push(interceptor);
        self
    }

    pub fn with_decorator(mut self, decorator: DecoratorDefinition) -> Self {
        self.decorators.push(decorator);
        self
    }

    pub fn with_observer(mut self, observer: ObserverMethod) -> Self {
        self.observers.push(observer);
        self
    }

    /// 声明传递绑定：`binding` 隐含 `implied`
    pub fn with_transitive_binding(mut self, binding: impl Into<String>, implied: Qualifier) -> Self {
        self.transitive_bindings
            .entry(binding.into())
            .or_default()
            .insert(implied);
        self
    }

    /// 声明类型层次
    pub fn with_type(mut self, declaration: TypeDeclaration) -> Self {
        self.types.push(declaration);
        self
    }

    /// 声明非绑定成员
    pub fn with_non_binding(mut self, kind: impl Into<String>, member: impl Into<String>) -> Self {
        self.binding_rules.add_non_binding(kind, member);
        self
    }

    /// 注册自定义作用域上下文
    pub fn with_context(mut self, context: Arc<dyn InjectableContext>) -> Self {
        self.contexts.push(context);
        self
    }

    /// 合并另一份贡献
    pub fn merge(mut self, other: Components) -> Self {
        self.components.extend(other.components);
        self.removed.extend(other.removed);
        self.interceptors.extend(other.interceptors);
        self.decorators.extend(other.decorators);
        self.observers.extend(other.observers);
        for (binding, implied) in other.transitive_bindings {
            self.transitive_bindings
                .entry(binding)
                .or_default()
                .extend(implied);
        }
        self.types.extend(other.types);
        self.binding_rules.merge(&other.binding_rules);
        self.contexts.extend(other.contexts);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.components.is_empty()
            && self.interceptors.is_empty()
            && self.decorators.is_empty()
            && self.observers.is_empty()
    }
}

impl fmt::Debug for Components {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Components")
            .field("components", &self.components.len())
            .field("removed", &self.removed.len())
            .field("interceptors", &self.interceptors.len())
            .field("decorators", &self.decorators.len())
            .field("observers", &self.observers.len())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

/// 只读组件注册表
pub struct ComponentRegistry {
    components: Vec<Arc<InjectableComponent>>,
    removed: Vec<Arc<ComponentDefinition>>,
    interceptors: Vec<Arc<InterceptorDefinition>>,
    decorators: Vec<Arc<DecoratorDefinition>>,
    observers: Vec<Arc<ObserverMethod>>,
    transitive_bindings: HashMap<String, BTreeSet<Qualifier>>,
    hierarchy: TypeHierarchy,
    binding_rules: BindingRules,
    contexts: Vec<Arc<dyn InjectableContext>>,
}

impl ComponentRegistry {
    /// 空注册表
    pub fn empty() -> Self {
        Self {
            components: Vec::new(),
            removed: Vec::new(),
            interceptors: Vec::new(),
            decorators: Vec::new(),
            observers: Vec::new(),
            transitive_bindings: HashMap::new(),
            hierarchy: TypeHierarchy::new(),
            binding_rules: BindingRules::new(),
            contexts: Vec::new(),
        }
    }

    /// 由贡献构建注册表
    ///
    /// 组件限定符被规范化；观察者、拦截器和装饰器按优先级稳定排序。
    /// 重复的标识以及为内置作用域注册的自定义上下文会导致构建失败。
    pub fn build(contributions: impl IntoIterator<Item = Components>) -> ContainerResult<Self> {
        let merged = contributions
            .into_iter()
            .fold(Components::new(), Components::merge);

        let mut identifiers = HashSet::new();
        let mut check_unique = |identifier: &str| -> ContainerResult<()> {
            if identifiers.insert(identifier.to_string()) {
                Ok(())
            } else {
                Err(ContainerError::invalid_argument(format!(
                    "组件标识重复: {identifier}"
                )))
            }
        };

        let mut components = Vec::with_capacity(merged.components.len());
        for (definition, factory) in merged.components {
            let definition = definition.normalized();
            check_unique(&definition.identifier)?;
            debug!("注册组件: {}, 作用域: {}", definition.identifier, definition.scope);
            components.push(Arc::new(InjectableComponent::new(definition, factory)));
        }

        let mut interceptors = Vec::with_capacity(merged.interceptors.len());
        for interceptor in merged.interceptors {
            check_unique(interceptor.component().identifier())?;
            interceptors.push(Arc::new(interceptor));
        }
        interceptors.sort_by_key(|interceptor| interceptor.priority());

        let mut decorators = Vec::with_capacity(merged.decorators.len());
        for decorator in merged.decorators {
            check_unique(decorator.component().identifier())?;
            decorators.push(Arc::new(decorator));
        }
        decorators.sort_by_key(|decorator| decorator.priority());

        let mut observers: Vec<Arc<ObserverMethod>> =
            merged.observers.into_iter().map(Arc::new).collect();
        observers.sort_by_key(|observer| observer.priority());

        for context in &merged.contexts {
            if context.scope().is_built_in() {
                return Err(LifecycleError::BuiltInScope {
                    scope: context.scope().clone(),
                }
                .into());
            }
        }

        let mut hierarchy = TypeHierarchy::new();
        for declaration in merged.types {
            hierarchy.declare(declaration);
        }

        let removed: Vec<Arc<ComponentDefinition>> = merged
            .removed
            .into_iter()
            .map(|definition| Arc::new(definition.normalized()))
            .collect();

        info!(
            "组件注册表构建完成: {} 个组件, {} 个拦截器, {} 个装饰器, {} 个观察者, {} 个已移除组件",
            components.len(),
            interceptors.len(),
            decorators.len(),
            observers.len(),
            removed.len()
        );

        Ok(Self {
            components,
            removed,
            interceptors,
            decorators,
            observers,
            transitive_bindings: merged.transitive_bindings,
            hierarchy,
            binding_rules: merged.binding_rules,
            contexts: merged.contexts,
        })
    }

    /// 追加容器内置组件；与已有组件标识冲突的内置组件被忽略
    pub fn with_built_ins(
        mut self,
        built_ins: impl IntoIterator<Item = (ComponentDefinition, Arc<dyn ComponentFactory>)>,
    ) -> Self {
        for (definition, factory) in built_ins {
            let definition = definition.with_kind(ComponentKind::BuiltIn).normalized();
            if self.component(&definition.identifier).is_some() {
                warn!("内置组件标识已被占用, 忽略: {}", definition.identifier);
                continue;
            }
            self.components
                .push(Arc::new(InjectableComponent::new(definition, factory)));
        }
        self
    }

    pub fn components(&self) -> &[Arc<InjectableComponent>] {
        &self.components
    }

    /// 按标识查找组件
    pub fn component(&self, identifier: &str) -> Option<&Arc<InjectableComponent>> {
        self.components
            .iter()
            .find(|component| component.identifier() == identifier)
    }

    pub fn removed_components(&self) -> &[Arc<ComponentDefinition>] {
        &self.removed
    }

    /// 按优先级升序排列的拦截器
    pub fn interceptors(&self) -> &[Arc<InterceptorDefinition>] {
        &self.interceptors
    }

    /// 按优先级升序排列的装饰器
    pub fn decorators(&self) -> &[Arc<DecoratorDefinition>] {
        &self.decorators
    }

    /// 按优先级升序排列的观察者
    pub fn observers(&self) -> &[Arc<ObserverMethod>] {
        &self.observers
    }

    pub fn transitive_bindings(&self) -> &HashMap<String, BTreeSet<Qualifier>> {
        &self.transitive_bindings
    }

    pub fn hierarchy(&self) -> &TypeHierarchy {
        &self.hierarchy
    }

    pub fn binding_rules(&self) -> &BindingRules {
        &self.binding_rules
    }

    /// 自定义作用域上下文
    pub fn contexts(&self) -> &[Arc<dyn InjectableContext>] {
        &self.contexts
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.components.len())
            .field("removed", &self.removed.len())
            .field("interceptors", &self.interceptors.len())
            .field("decorators", &self.decorators.len())
            .field("observers", &self.observers.len())
            .field("contexts", &self.contexts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory::{factory_fn, instance};
    use infrastructure_common::{
        InterceptorMetadata, ObserverMetadata, ScopeKind, DEFAULT_QUALIFIER,
    };

    fn component(id: &str) -> (ComponentDefinition, Arc<dyn ComponentFactory>) {
        (
            ComponentDefinition::new(id, TypeDescriptor::class(id)),
            factory_fn(|_| Ok(instance(()))),
        )
    }

    /// 测试构建时规范化限定符并排序
    #[test]
    fn test_build_normalizes_and_sorts() {
        let (definition, factory) = component("greeter");
        let observer = |priority: i32| {
            ObserverMethod::new(
                ObserverMetadata::new("greeter", TypeDescriptor::class("Greeting"))
                    .with_priority(priority),
                |_| Ok(()),
            )
        };
        let registry = ComponentRegistry::build([
            Components::new()
                .with_component(definition, factory)
                .with_observer(observer(20)),
            Components::new().with_observer(observer(10)),
        ])
        .unwrap();

        let greeter = registry.component("greeter").unwrap();
        assert!(greeter
            .definition()
            .qualifiers
            .iter()
            .any(|q| q.kind() == DEFAULT_QUALIFIER));
        assert!(greeter.definition().qualifiers.contains(&Qualifier::any()));

        let priorities: Vec<i32> = registry.observers().iter().map(|o| o.priority()).collect();
        assert_eq!(priorities, vec![10, 20]);
    }

    /// 测试重复标识
    #[test]
    fn test_duplicate_identifier_rejected() {
        let (a, fa) = component("same");
        let (b, fb) = component("same");
        let result = ComponentRegistry::build([Components::new()
            .with_component(a, fa)
            .with_component(b, fb)]);
        assert!(matches!(result, Err(ContainerError::InvalidArgument { .. })));
    }

    /// 测试拦截器与组件标识冲突
    #[test]
    fn test_interceptor_identifier_must_be_unique() {
        let (definition, factory) = component("logging");
        let interceptor = InterceptorDefinition::new(
            ComponentDefinition::new("logging", TypeDescriptor::class("LoggingInterceptor")),
            factory_fn(|_| Ok(instance(()))),
            InterceptorMetadata::new("logging", 1),
        );
        let result = ComponentRegistry::build([Components::new()
            .with_component(definition, factory)
            .with_interceptor(interceptor)]);
        assert!(result.is_err());
    }

    /// 测试合并传递绑定
    #[test]
    fn test_merge_transitive_bindings() {
        let registry = ComponentRegistry::build([
            Components::new().with_transitive_binding("Audited", Qualifier::new("Logged")),
            Components::new().with_transitive_binding("Audited", Qualifier::new("Timed")),
        ])
        .unwrap();

        assert_eq!(registry.transitive_bindings()["Audited"].len(), 2);
    }

    /// 测试内置组件不覆盖已有组件
    #[test]
    fn test_built_ins_do_not_override() {
        let (definition, factory) = component("event");
        let registry = ComponentRegistry::build([Components::new().with_component(definition, factory)])
            .unwrap()
            .with_built_ins([component("event"), component("instance")]);

        assert_eq!(registry.components().len(), 2);
        assert_eq!(
            registry.component("instance").unwrap().definition().kind,
            ComponentKind::BuiltIn
        );
        assert_eq!(
            registry.component("event").unwrap().definition().kind,
            ComponentKind::Normal
        );
        assert_eq!(registry.component("event").unwrap().scope(), &ScopeKind::Dependent);
    }
}
