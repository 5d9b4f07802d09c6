//! 元数据定义
//!
//! 拦截器、观察者、装饰器、注入点和被拦截方法的纯数据描述。
//! 回调本身由 `di-abstractions` 与这些元数据配对。

use crate::qualifier::Qualifier;
use crate::types::TypeDescriptor;
use std::collections::BTreeSet;
use std::fmt;

/// 观察者默认优先级
pub const DEFAULT_OBSERVER_PRIORITY: i32 = 2500;

/// 拦截类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum InterceptionKind {
    /// 业务方法调用
    AroundInvoke,
    /// 组件构造
    AroundConstruct,
    /// 构造完成回调
    PostConstruct,
    /// 销毁前回调
    PreDestroy,
}

impl fmt::Display for InterceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::AroundInvoke => "AroundInvoke",
            Self::AroundConstruct => "AroundConstruct",
            Self::PostConstruct => "PostConstruct",
            Self::PreDestroy => "PreDestroy",
        };
        f.write_str(name)
    }
}

/// 拦截器元数据
#[derive(Debug, Clone)]
pub struct InterceptorMetadata {
    /// 拦截器组件标识
    pub identifier: String,
    /// 声明的拦截器绑定
    pub bindings: BTreeSet<Qualifier>,
    /// 优先级，升序执行
    pub priority: i32,
}

impl InterceptorMetadata {
    /// 创建拦截器元数据
    pub fn new(identifier: impl Into<String>, priority: i32) -> Self {
        Self {
            identifier: identifier.into(),
            bindings: BTreeSet::new(),
            priority,
        }
    }

    /// 添加拦截器绑定
    pub fn with_binding(mut self, binding: Qualifier) -> Self {
        self.bindings.insert(binding);
        self
    }
}

/// 事务阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionPhase {
    /// 立即通知
    InProgress,
    /// 事务完成前
    BeforeCompletion,
    /// 事务完成后
    AfterCompletion,
    /// 事务成功提交后
    AfterSuccess,
    /// 事务失败后
    AfterFailure,
}

impl Default for TransactionPhase {
    fn default() -> Self {
        Self::InProgress
    }
}

impl TransactionPhase {
    /// 是否需要延迟到事务完成时通知
    pub fn is_transactional(self) -> bool {
        self != Self::InProgress
    }

    /// 是否在 `before_completion` 回调中通知
    pub fn is_before_completion(self) -> bool {
        self == Self::BeforeCompletion
    }
}

/// 观察者元数据
#[derive(Debug, Clone)]
pub struct ObserverMetadata {
    /// 观察的事件类型
    pub observed_type: TypeDescriptor,
    /// 观察的限定符
    pub observed_qualifiers: BTreeSet<Qualifier>,
    /// 声明该观察者的组件标识
    pub declaring_component: String,
    /// 优先级，升序通知
    pub priority: i32,
    /// 是否为异步观察者
    pub is_async: bool,
    /// 事务阶段
    pub transaction_phase: TransactionPhase,
}

impl ObserverMetadata {
    /// 创建同步、立即通知、默认优先级的观察者元数据
    pub fn new(declaring_component: impl Into<String>, observed_type: TypeDescriptor) -> Self {
        Self {
            observed_type,
            observed_qualifiers: BTreeSet::new(),
            declaring_component: declaring_component.into(),
            priority: DEFAULT_OBSERVER_PRIORITY,
            is_async: false,
            transaction_phase: TransactionPhase::default(),
        }
    }

    /// 添加观察的限定符
    pub fn with_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.observed_qualifiers.insert(qualifier);
        self
    }

    /// 设置优先级
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// 标记为异步观察者
    pub fn asynchronous(mut self) -> Self {
        self.is_async = true;
        self
    }

    /// 设置事务阶段
    pub fn with_transaction_phase(mut self, phase: TransactionPhase) -> Self {
        self.transaction_phase = phase;
        self
    }
}

/// 装饰器元数据
#[derive(Debug, Clone)]
pub struct DecoratorMetadata {
    /// 装饰器组件标识
    pub identifier: String,
    /// 委托注入点类型
    pub delegate_type: TypeDescriptor,
    /// 委托注入点限定符
    pub delegate_qualifiers: BTreeSet<Qualifier>,
    /// 被装饰的类型
    pub decorated_types: Vec<TypeDescriptor>,
    /// 优先级，升序应用
    pub priority: i32,
}

impl DecoratorMetadata {
    /// 创建装饰器元数据，被装饰类型默认为委托类型
    pub fn new(identifier: impl Into<String>, delegate_type: TypeDescriptor, priority: i32) -> Self {
        Self {
            identifier: identifier.into(),
            decorated_types: vec![delegate_type.clone()],
            delegate_type,
            delegate_qualifiers: BTreeSet::new(),
            priority,
        }
    }

    /// 添加委托限定符
    pub fn with_delegate_qualifier(mut self, qualifier: Qualifier) -> Self {
        self.delegate_qualifiers.insert(qualifier);
        self
    }

    /// 添加被装饰类型
    pub fn with_decorated_type(mut self, ty: TypeDescriptor) -> Self {
        if !self.decorated_types.contains(&ty) {
            self.decorated_types.push(ty);
        }
        self
    }
}

/// 被拦截的方法描述
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodDescriptor {
    /// 声明方法的类型
    pub declaring_type: TypeDescriptor,
    /// 方法名
    pub name: String,
    /// 参数类型
    pub parameter_types: Vec<TypeDescriptor>,
    /// 返回类型
    pub return_type: Option<TypeDescriptor>,
}

impl MethodDescriptor {
    /// 创建无参、无返回值的方法描述
    pub fn new(declaring_type: TypeDescriptor, name: impl Into<String>) -> Self {
        Self {
            declaring_type,
            name: name.into(),
            parameter_types: Vec::new(),
            return_type: None,
        }
    }

    /// 添加参数类型
    pub fn with_parameter(mut self, ty: TypeDescriptor) -> Self {
        self.parameter_types.push(ty);
        self
    }

    /// 设置返回类型
    pub fn returning(mut self, ty: TypeDescriptor) -> Self {
        self.return_type = Some(ty);
        self
    }
}

impl fmt::Display for MethodDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}(", self.declaring_type, self.name)?;
        for (index, parameter) in self.parameter_types.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{parameter}")?;
        }
        f.write_str(")")
    }
}

/// 注入点
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InjectionPoint {
    /// 要求的类型
    pub required_type: TypeDescriptor,
    /// 要求的限定符
    pub qualifiers: BTreeSet<Qualifier>,
    /// 注入点所属组件标识，程序化查找时为空
    pub declaring_component: Option<String>,
}

impl InjectionPoint {
    /// 创建注入点
    pub fn new(
        required_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> Self {
        Self {
            required_type,
            qualifiers: qualifiers.into_iter().collect(),
            declaring_component: None,
        }
    }

    /// 设置所属组件
    pub fn declared_by(mut self, component: impl Into<String>) -> Self {
        self.declaring_component = Some(component.into());
        self
    }
}
