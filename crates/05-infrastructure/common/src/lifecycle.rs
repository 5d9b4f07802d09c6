//! 作用域与上下文生命周期

use crate::qualifier::{MemberValue, Qualifier, VALUE_MEMBER};
use std::fmt;

/// 组件作用域
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ScopeKind {
    /// 依赖作用域 - 每次注入创建新实例，由请求方独占
    Dependent,
    /// 单例作用域 - 进程内一个实例，不使用客户端代理
    Singleton,
    /// 应用作用域 - 进程内一个实例
    Application,
    /// 请求作用域 - 每个工作单元一个实例，绑定到当前线程
    Request,
    /// 自定义作用域
    Custom(String),
}

impl Default for ScopeKind {
    fn default() -> Self {
        Self::Dependent
    }
}

impl ScopeKind {
    /// 作用域名称
    pub fn name(&self) -> &str {
        match self {
            Self::Dependent => "Dependent",
            Self::Singleton => "Singleton",
            Self::Application => "ApplicationScoped",
            Self::Request => "RequestScoped",
            Self::Custom(name) => name,
        }
    }

    /// 是否为普通作用域（实例由上下文缓存并可通过客户端代理访问）
    pub fn is_normal(&self) -> bool {
        !matches!(self, Self::Dependent | Self::Singleton)
    }

    /// 是否为容器内置且始终激活的作用域
    pub fn is_always_active(&self) -> bool {
        matches!(self, Self::Singleton | Self::Application)
    }

    /// 是否为容器内置作用域
    pub fn is_built_in(&self) -> bool {
        !matches!(self, Self::Custom(_))
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// 上下文生命周期事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleEventKind {
    /// 上下文状态初始化
    Initialized,
    /// 上下文状态即将销毁
    BeforeDestroyed,
    /// 上下文状态已销毁
    Destroyed,
}

impl LifecycleEventKind {
    /// 事件限定符名称
    pub fn qualifier_kind(self) -> &'static str {
        match self {
            Self::Initialized => "Initialized",
            Self::BeforeDestroyed => "BeforeDestroyed",
            Self::Destroyed => "Destroyed",
        }
    }

    /// 针对指定作用域的事件限定符，如 `@Initialized(value=RequestScoped.class)`
    pub fn qualifier(self, scope: &ScopeKind) -> Qualifier {
        Qualifier::new(self.qualifier_kind())
            .with_member(VALUE_MEMBER, MemberValue::Class(scope.name().to_string()))
    }
}

impl fmt::Display for LifecycleEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.qualifier_kind())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试作用域分类
    #[test]
    fn test_scope_classification() {
        assert!(!ScopeKind::Dependent.is_normal());
        assert!(!ScopeKind::Singleton.is_normal());
        assert!(ScopeKind::Request.is_normal());
        assert!(ScopeKind::Custom("Session".into()).is_normal());
        assert!(ScopeKind::Application.is_always_active());
        assert!(!ScopeKind::Custom("Session".into()).is_built_in());
        assert_eq!(ScopeKind::default(), ScopeKind::Dependent);
    }

    /// 测试生命周期事件限定符
    #[test]
    fn test_lifecycle_qualifier() {
        let qualifier = LifecycleEventKind::Initialized.qualifier(&ScopeKind::Request);
        assert_eq!(qualifier.kind(), "Initialized");
        assert_eq!(
            qualifier.member(VALUE_MEMBER),
            Some(&MemberValue::Class("RequestScoped".to_string()))
        );
    }
}
