//! 组件定义
//!
//! 组件定义在注册表构建时确定，之后只读，由注册表在进程生命周期内持有。

use crate::lifecycle::ScopeKind;
use crate::qualifier::Qualifier;
use crate::types::TypeDescriptor;
use std::collections::BTreeSet;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// 组件种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// 普通组件
    Normal,
    /// 拦截器
    Interceptor,
    /// 装饰器
    Decorator,
    /// 容器内置组件
    BuiltIn,
}

impl Default for ComponentKind {
    fn default() -> Self {
        Self::Normal
    }
}

/// 组件定义
#[derive(Debug, Clone)]
pub struct ComponentDefinition {
    /// 唯一且稳定的组件标识
    pub identifier: String,
    /// 实现类型
    pub implementation: TypeDescriptor,
    /// 组件满足的类型闭包
    pub types: Vec<TypeDescriptor>,
    /// 限定符集合
    pub qualifiers: BTreeSet<Qualifier>,
    /// 作用域
    pub scope: ScopeKind,
    /// 备选优先级，仅用于歧义消解
    pub priority: Option<i32>,
    /// 是否为默认组件
    pub default_component: bool,
    /// 组件种类
    pub kind: ComponentKind,
    /// 组件名称
    pub name: Option<String>,
    /// 声明该组件的组件（生产者方法等）
    pub declaring: Option<Arc<ComponentDefinition>>,
    /// 类级别拦截器绑定，用于生命周期拦截
    pub interceptor_bindings: BTreeSet<Qualifier>,
}

impl ComponentDefinition {
    /// 创建组件定义，类型闭包初始为实现类型与 `Object`
    pub fn new(identifier: impl Into<String>, implementation: TypeDescriptor) -> Self {
        let mut types = vec![implementation.clone()];
        if !implementation.is_object() {
            types.push(TypeDescriptor::object());
        }
        Self {
            identifier: identifier.into(),
            implementation,
            types,
            qualifiers: BTreeSet::new(),
            scope: ScopeKind::default(),
            priority: None,
            default_component: false,
            kind: ComponentKind::default(),
            name: None,
            declaring: None,
            interceptor_bindings: BTreeSet::new(),
        }
    }

    /// 添加组件类型
    pub fn with_type(mut self, ty: TypeDescriptor) -> Self {
        if !self.types.contains(&ty) {
            self.types.push(ty);
        }
        self
    }

    /// 批量添加组件类型
    pub fn with_types(self, types: impl IntoIterator<Item = TypeDescriptor>) -> Self {
        types.into_iter().fold(self, Self::with_type)
    }

    /// 添加限定符
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.qualifiers.insert(qualifier);
        self
    }

    /// 设置作用域
    pub fn with_scope(mut self, scope: ScopeKind) -> Self {
        self.scope = scope;
        self
    }

    /// 设置备选优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// 标记为默认组件
    pub fn as_default(mut self) -> Self {
        self.default_component = true;
        self
    }

    /// 设置组件种类
    pub fn with_kind(mut self, kind: ComponentKind) -> Self {
        self.kind = kind;
        self
    }

    /// 设置组件名称，同时添加 `@Named` 限定符
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.qualifiers.insert(Qualifier::named(name.clone()));
        self.name = Some(name);
        self
    }

    /// 设置声明组件
    pub fn declared_by(mut self, declaring: Arc<ComponentDefinition>) -> Self {
        self.declaring = Some(declaring);
        self
    }

    /// 添加拦截器绑定
    pub fn with_interceptor_binding(mut self, binding: Qualifier) -> Self {
        self.interceptor_bindings.insert(binding);
        self
    }

    /// 参与歧义消解的优先级，未声明时取声明组件的优先级
    pub fn alternative_priority(&self) -> Option<i32> {
        self.priority
            .or_else(|| self.declaring.as_ref().and_then(|declaring| declaring.priority))
    }

    pub fn is_dependent(&self) -> bool {
        self.scope == ScopeKind::Dependent
    }

    /// 规范化限定符：总是带有 `@Any`；只有 `@Named`/`@Any` 时补充 `@Default`
    pub fn normalized(mut self) -> Self {
        normalize_qualifiers(&mut self.qualifiers);
        if !self.types.iter().any(TypeDescriptor::is_object) {
            self.types.push(TypeDescriptor::object());
        }
        self
    }
}

impl PartialEq for ComponentDefinition {
    fn eq(&self, other: &Self) -> bool {
        self.identifier == other.identifier
    }
}

impl Eq for ComponentDefinition {}

impl Hash for ComponentDefinition {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.identifier.hash(state);
    }
}

/// 组件限定符规范化
pub fn normalize_qualifiers(qualifiers: &mut BTreeSet<Qualifier>) {
    qualifiers.insert(Qualifier::any());
    if qualifiers
        .iter()
        .all(|qualifier| qualifier.is_any() || qualifier.is_named())
    {
        qualifiers.insert(Qualifier::default_qualifier());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试限定符规范化
    #[test]
    fn test_normalized_qualifiers() {
        let plain = ComponentDefinition::new("plain", TypeDescriptor::class("Foo")).normalized();
        assert!(plain.qualifiers.contains(&Qualifier::any()));
        assert!(plain.qualifiers.contains(&Qualifier::default_qualifier()));

        let named = ComponentDefinition::new("named", TypeDescriptor::class("Foo"))
            .with_name("foo")
            .normalized();
        assert!(named.qualifiers.contains(&Qualifier::default_qualifier()));

        let qualified = ComponentDefinition::new("qualified", TypeDescriptor::class("Foo"))
            .with_qualifier(Qualifier::new("Blue"))
            .normalized();
        assert!(!qualified.qualifiers.contains(&Qualifier::default_qualifier()));
        assert!(qualified.qualifiers.contains(&Qualifier::any()));
    }

    /// 测试备选优先级回退到声明组件
    #[test]
    fn test_alternative_priority_from_declaring() {
        let declaring = Arc::new(
            ComponentDefinition::new("producer-owner", TypeDescriptor::class("Owner"))
                .with_priority(7),
        );
        let produced = ComponentDefinition::new("produced", TypeDescriptor::class("Foo"))
            .declared_by(declaring);
        assert_eq!(produced.alternative_priority(), Some(7));
        assert_eq!(
            produced.clone().with_priority(1).alternative_priority(),
            Some(1)
        );
    }
}
