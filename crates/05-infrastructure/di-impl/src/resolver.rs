//! 类型安全解析
//!
//! 解析器根据注入点类型与限定符从注册表中选出组件，结果按 [`Resolvable`]
//! 缓存在计算缓存中。多个候选时按 默认组件 → 备选优先级 → 最高优先级 的
//! 顺序消解歧义。

use crate::assignability::{BeanTypeRules, EventTypeRules};
use crate::cache::ComputingCache;
use di_abstractions::{
    ComponentRegistry, DecoratorDefinition, InjectableComponent, InterceptorDefinition,
    ObserverMethod,
};
use infrastructure_common::{
    display_qualifiers, ComponentDefinition, ContainerError, ContainerResult, InterceptionKind,
    Qualifier, TypeDescriptor,
};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// 事件发布者的原始类型
pub const EVENT_TYPE: &str = "Event";
/// 动态查找的原始类型
pub const INSTANCE_TYPE: &str = "Instance";
/// 当前注入点的原始类型
pub const INJECTION_POINT_TYPE: &str = "InjectionPoint";

/// 容器内置类型的原始名称
pub const BUILT_IN_TYPES: [&str; 3] = [EVENT_TYPE, INSTANCE_TYPE, INJECTION_POINT_TYPE];

/// 解析键：注入点类型与限定符
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resolvable {
    pub required_type: TypeDescriptor,
    pub qualifiers: BTreeSet<Qualifier>,
}

impl Resolvable {
    /// 创建解析键
    ///
    /// 内置类型被规范化为原始类型与 `@Any`，使所有同形注入点共享一个缓存条目；
    /// 没有限定符的请求等价于 `@Default`。
    pub fn new(required_type: TypeDescriptor, qualifiers: impl IntoIterator<Item = Qualifier>) -> Self {
        if let Some(raw) = required_type.raw_name() {
            if BUILT_IN_TYPES.contains(&raw) {
                return Self {
                    required_type: TypeDescriptor::class(raw),
                    qualifiers: BTreeSet::from([Qualifier::any()]),
                };
            }
        }
        let mut qualifiers: BTreeSet<Qualifier> = qualifiers.into_iter().collect();
        if qualifiers.is_empty() {
            qualifiers.insert(Qualifier::default_qualifier());
        }
        Self {
            required_type,
            qualifiers,
        }
    }
}

impl fmt::Display for Resolvable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} [{}]",
            self.required_type,
            display_qualifiers(&self.qualifiers)
        )
    }
}

/// 解析结果
pub type Resolved = Arc<Vec<Arc<InjectableComponent>>>;

/// 消解歧义
///
/// 1. 存在非默认组件时移除所有默认组件
/// 2. 存在带优先级的组件时移除没有优先级的组件
/// 3. 只保留优先级最高的组件
///
/// 任一步骤后只剩一个候选时立即返回。
pub fn resolve_ambiguity(candidates: Vec<Arc<InjectableComponent>>) -> Vec<Arc<InjectableComponent>> {
    if candidates.len() <= 1 {
        return candidates;
    }

    let mut remaining = candidates;
    if remaining.iter().any(|c| !c.definition().default_component) {
        remaining.retain(|c| !c.definition().default_component);
    } else {
        return remaining;
    }
    if remaining.len() == 1 {
        return remaining;
    }

    if remaining
        .iter()
        .any(|c| c.definition().alternative_priority().is_some())
    {
        remaining.retain(|c| c.definition().alternative_priority().is_some());
    }
    if remaining.len() == 1 {
        return remaining;
    }

    if let Some(highest) = remaining
        .iter()
        .filter_map(|c| c.definition().alternative_priority())
        .max()
    {
        remaining.retain(|c| c.definition().alternative_priority() == Some(highest));
    }
    remaining
}

/// 类型安全解析器
pub struct Resolver {
    registry: Arc<ComponentRegistry>,
    resolved: ComputingCache<Resolvable, Resolved>,
    by_id: ComputingCache<String, Option<Arc<InjectableComponent>>>,
    by_name: ComputingCache<String, Resolved>,
    remove_unused_warning: bool,
}

impl Resolver {
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            resolved: ComputingCache::new(),
            by_id: ComputingCache::new(),
            by_name: ComputingCache::new(),
            remove_unused_warning: true,
        }
    }

    /// 设置是否在解析结果为空时提示被移除的组件
    pub fn with_remove_unused_warning(mut self, enabled: bool) -> Self {
        self.remove_unused_warning = enabled;
        self
    }

    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// 解析组件集合，结果经过歧义消解并被缓存
    pub fn resolve(&self, resolvable: &Resolvable) -> Resolved {
        self.resolved.get_or_compute(resolvable, |key| {
            let matching = self.matching(&key.required_type, &key.qualifiers);
            if matching.is_empty() {
                self.warn_if_removed(key);
            }
            let resolved = resolve_ambiguity(matching);
            trace!("解析完成: {}, 结果数: {}", key, resolved.len());
            Arc::new(resolved)
        })
    }

    /// 解析唯一组件
    pub fn resolve_single(&self, resolvable: &Resolvable) -> ContainerResult<Arc<InjectableComponent>> {
        let resolved = self.resolve(resolvable);
        match resolved.as_slice() {
            [single] => Ok(Arc::clone(single)),
            [] => Err(ContainerError::UnsatisfiedResolution {
                required_type: resolvable.required_type.to_string(),
                qualifiers: display_qualifiers(&resolvable.qualifiers),
            }),
            many => Err(ContainerError::AmbiguousResolution {
                required_type: resolvable.required_type.to_string(),
                qualifiers: display_qualifiers(&resolvable.qualifiers),
                candidates: many.iter().map(|c| c.identifier().to_string()).collect(),
            }),
        }
    }

    /// 所有可赋值且限定符匹配的组件，不消解歧义也不缓存
    pub fn matching_components(
        &self,
        required_type: &TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> Vec<Arc<InjectableComponent>> {
        let resolvable = Resolvable::new(required_type.clone(), qualifiers);
        self.matching(&resolvable.required_type, &resolvable.qualifiers)
    }

    fn matching(
        &self,
        required_type: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Vec<Arc<InjectableComponent>> {
        self.registry
            .components()
            .iter()
            .filter(|component| self.definition_matches(component.definition(), required_type, qualifiers))
            .cloned()
            .collect()
    }

    fn definition_matches(
        &self,
        definition: &ComponentDefinition,
        required_type: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> bool {
        BeanTypeRules::new(self.registry.hierarchy()).matches_any(required_type, &definition.types)
            && self
                .registry
                .binding_rules()
                .contains_all(&definition.qualifiers, qualifiers)
    }

    fn warn_if_removed(&self, resolvable: &Resolvable) {
        if !self.remove_unused_warning {
            return;
        }
        let removed: Vec<&str> = self
            .registry
            .removed_components()
            .iter()
            .filter(|definition| {
                self.definition_matches(definition, &resolvable.required_type, &resolvable.qualifiers)
            })
            .map(|definition| definition.identifier.as_str())
            .collect();
        if !removed.is_empty() {
            warn!(
                "没有组件满足 {}, 但以下组件因未被使用在构建时被移除: {}",
                resolvable,
                removed.join(", ")
            );
        }
    }

    /// 按标识查找组件
    pub fn component_by_id(&self, identifier: &str) -> Option<Arc<InjectableComponent>> {
        self.by_id.get_or_compute(&identifier.to_string(), |identifier| {
            self.registry.component(identifier).cloned()
        })
    }

    /// 按名称解析组件；多个候选无法消解时返回歧义错误
    pub fn resolve_by_name(&self, name: &str) -> ContainerResult<Option<Arc<InjectableComponent>>> {
        let resolved = self.by_name.get_or_compute(&name.to_string(), |name| {
            let matching: Vec<Arc<InjectableComponent>> = self
                .registry
                .components()
                .iter()
                .filter(|component| component.definition().name.as_deref() == Some(name.as_str()))
                .cloned()
                .collect();
            Arc::new(resolve_ambiguity(matching))
        });
        match resolved.as_slice() {
            [] => Ok(None),
            [single] => Ok(Some(Arc::clone(single))),
            many => Err(ContainerError::AmbiguousResolution {
                required_type: format!("@Named(\"{name}\")"),
                qualifiers: String::new(),
                candidates: many.iter().map(|c| c.identifier().to_string()).collect(),
            }),
        }
    }

    /// 匹配事件的观察者，按优先级升序
    pub fn resolve_observers(
        &self,
        event_type: &TypeDescriptor,
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Vec<Arc<ObserverMethod>> {
        let rules = EventTypeRules::new(self.registry.hierarchy());
        let binding_rules = self.registry.binding_rules();
        let observers: Vec<Arc<ObserverMethod>> = self
            .registry
            .observers()
            .iter()
            .filter(|observer| {
                rules.matches(observer.observed_type(), event_type)
                    && binding_rules.contains_all(qualifiers, observer.observed_qualifiers())
            })
            .cloned()
            .collect();
        debug!(
            "事件 {} [{}] 匹配到 {} 个观察者",
            event_type,
            display_qualifiers(qualifiers),
            observers.len()
        );
        observers
    }

    /// 作用于组件的装饰器，按优先级升序
    pub fn resolve_decorators(
        &self,
        types: &[TypeDescriptor],
        qualifiers: &BTreeSet<Qualifier>,
    ) -> Vec<Arc<DecoratorDefinition>> {
        let rules = BeanTypeRules::new(self.registry.hierarchy());
        let binding_rules = self.registry.binding_rules();
        let default_delegate = BTreeSet::from([Qualifier::default_qualifier()]);
        self.registry
            .decorators()
            .iter()
            .filter(|decorator| {
                let delegate_qualifiers = if decorator.delegate_qualifiers().is_empty() {
                    &default_delegate
                } else {
                    decorator.delegate_qualifiers()
                };
                rules.matches_any(decorator.delegate_type(), types)
                    && binding_rules.contains_all(qualifiers, delegate_qualifiers)
            })
            .cloned()
            .collect()
    }

    /// 拦截指定类型且绑定是 `bindings` 子集的拦截器，按优先级升序
    pub fn resolve_interceptors(
        &self,
        kind: InterceptionKind,
        bindings: &BTreeSet<Qualifier>,
    ) -> Vec<Arc<InterceptorDefinition>> {
        let binding_rules = self.registry.binding_rules();
        self.registry
            .interceptors()
            .iter()
            .filter(|interceptor| {
                interceptor.intercepts(kind)
                    && !interceptor.bindings().is_empty()
                    && binding_rules.contains_all(bindings, interceptor.bindings())
            })
            .cloned()
            .collect()
    }

    /// 清空所有缓存
    pub fn clear(&self) {
        self.resolved.clear();
        self.by_id.clear();
        self.by_name.clear();
    }
}

impl fmt::Debug for Resolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Resolver")
            .field("registry", &self.registry)
            .field("resolved", &self.resolved.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use di_abstractions::{factory_fn, instance, Components};
    use infrastructure_common::{ComponentDefinition, TypeDeclaration};

    fn component(definition: ComponentDefinition) -> Components {
        Components::new().with_component(definition, factory_fn(|_| Ok(instance(()))))
    }

    fn service(id: &str) -> ComponentDefinition {
        ComponentDefinition::new(id, TypeDescriptor::class(id)).with_type(TypeDescriptor::class("Service"))
    }

    fn resolver(contributions: Vec<Components>) -> Resolver {
        Resolver::new(Arc::new(ComponentRegistry::build(contributions).unwrap()))
    }

    fn ids(resolved: &Resolved) -> Vec<&str> {
        resolved.iter().map(|c| c.identifier()).collect()
    }

    fn service_type() -> Resolvable {
        Resolvable::new(TypeDescriptor::class("Service"), [])
    }

    /// 测试歧义消解：默认组件、优先级、最高优先级
    #[test]
    fn test_ambiguity_tie_break() {
        let a = || component(service("A").as_default());
        let b = || component(service("B"));
        let c = || component(service("C").with_priority(10));

        let all = resolver(vec![a(), b(), c()]);
        assert_eq!(ids(&all.resolve(&service_type())), vec!["C"]);

        let two = resolver(vec![a(), b()]);
        assert_eq!(ids(&two.resolve(&service_type())), vec!["B"]);

        let one = resolver(vec![a()]);
        assert_eq!(ids(&one.resolve(&service_type())), vec!["A"]);
    }

    /// 测试只剩默认组件或同级优先级时保持歧义
    #[test]
    fn test_unresolved_ambiguity() {
        let defaults = resolver(vec![
            component(service("A").as_default()),
            component(service("B").as_default()),
        ]);
        assert_eq!(defaults.resolve(&service_type()).len(), 2);

        let tied = resolver(vec![
            component(service("A").with_priority(5)),
            component(service("B").with_priority(5)),
            component(service("C").with_priority(1)),
        ]);
        assert_eq!(ids(&tied.resolve(&service_type())), vec!["A", "B"]);
        let error = tied.resolve_single(&service_type()).unwrap_err();
        assert!(matches!(
            error,
            ContainerError::AmbiguousResolution { ref candidates, .. } if candidates.len() == 2
        ));
    }

    /// 测试声明组件的优先级被继承
    #[test]
    fn test_declaring_priority_is_inherited() {
        let declaring = Arc::new(ComponentDefinition::new("Producer", TypeDescriptor::class("Producer")).with_priority(7));
        let resolver = resolver(vec![
            component(service("plain")),
            component(service("produced").declared_by(declaring)),
        ]);
        assert_eq!(ids(&resolver.resolve(&service_type())), vec!["produced"]);
    }

    /// 测试限定符匹配与默认限定符
    #[test]
    fn test_qualifier_matching() {
        let resolver = resolver(vec![
            component(service("plain")),
            component(service("fast").with_qualifier(Qualifier::new("Fast"))),
            component(service("named").with_name("special")),
        ]);

        let default = resolver.resolve(&service_type());
        let mut default_ids = ids(&default);
        default_ids.sort_unstable();
        assert_eq!(default_ids, vec!["named", "plain"]);

        let fast = resolver.resolve(&Resolvable::new(
            TypeDescriptor::class("Service"),
            [Qualifier::new("Fast")],
        ));
        assert_eq!(ids(&fast), vec!["fast"]);

        let any = resolver.matching_components(&TypeDescriptor::class("Service"), [Qualifier::any()]);
        assert_eq!(any.len(), 3);

        assert_eq!(
            resolver.resolve_by_name("special").unwrap().unwrap().identifier(),
            "named"
        );
        assert!(resolver.resolve_by_name("missing").unwrap().is_none());
    }

    /// 测试无关组件不会改变已有解析结果
    #[test]
    fn test_unrelated_component_does_not_change_result() {
        let before = resolver(vec![component(service("A"))]);
        let after = resolver(vec![
            component(service("A")),
            component(ComponentDefinition::new("Other", TypeDescriptor::class("Other"))),
        ]);
        assert_eq!(ids(&before.resolve(&service_type())), ids(&after.resolve(&service_type())));
    }

    /// 测试未满足依赖与缓存
    #[test]
    fn test_unsatisfied_and_memoized() {
        let resolver = resolver(vec![component(service("A"))]);
        let missing = Resolvable::new(TypeDescriptor::class("Missing"), []);
        assert!(matches!(
            resolver.resolve_single(&missing),
            Err(ContainerError::UnsatisfiedResolution { .. })
        ));

        let first = resolver.resolve(&service_type());
        let second = resolver.resolve(&service_type());
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(resolver.component_by_id("A").unwrap().identifier(), "A");
        assert!(resolver.component_by_id("B").is_none());
    }

    /// 测试通过类型层次解析父类型
    #[test]
    fn test_resolution_through_hierarchy_types() {
        let resolver = resolver(vec![component(
            ComponentDefinition::new("list", TypeDescriptor::class("ArrayList")).with_types([
                TypeDescriptor::parameterized("List", [TypeDescriptor::class("String")]),
            ]),
        )
        .with_type(TypeDeclaration::new("ArrayList"))]);

        let strings = Resolvable::new(
            TypeDescriptor::parameterized("List", [TypeDescriptor::class("String")]),
            [],
        );
        assert_eq!(resolver.resolve(&strings).len(), 1);

        let numbers = Resolvable::new(
            TypeDescriptor::parameterized("List", [TypeDescriptor::class("Integer")]),
            [],
        );
        assert!(resolver.resolve(&numbers).is_empty());
    }

    /// 测试内置类型的解析键规范化
    #[test]
    fn test_built_in_resolvable() {
        let key = Resolvable::new(
            TypeDescriptor::parameterized(EVENT_TYPE, [TypeDescriptor::class("OrderPlaced")]),
            [Qualifier::new("Fast")],
        );
        assert_eq!(key.required_type, TypeDescriptor::class(EVENT_TYPE));
        assert_eq!(key.qualifiers, BTreeSet::from([Qualifier::any()]));
    }
}
