//! 类型模型
//!
//! 组件类型与事件类型都以结构化值表示：原始类型、参数化类型、数组、
//! 类型变量与通配符各有对应的变体。[`TypeHierarchy`] 记录每个原始类型声明的
//! 类型参数和直接父类型，用于计算带类型变量替换的类型闭包。

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

/// 根类型名称，任何类型都可以赋值给它
pub const OBJECT_TYPE: &str = "Object";

/// 结构化类型描述
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeDescriptor {
    /// 原始类型，如 `String`
    Class(String),
    /// 参数化类型，如 `List<String>`
    Parameterized {
        raw: String,
        arguments: Vec<TypeDescriptor>,
    },
    /// 数组类型
    Array(Box<TypeDescriptor>),
    /// 类型变量，`bounds` 为空表示上界为 `Object`
    Variable {
        name: String,
        bounds: Vec<TypeDescriptor>,
    },
    /// 通配符
    Wildcard {
        upper: Vec<TypeDescriptor>,
        lower: Vec<TypeDescriptor>,
    },
}

impl TypeDescriptor {
    /// 创建原始类型
    pub fn class(name: impl Into<String>) -> Self {
        Self::Class(name.into())
    }

    /// 根类型 `Object`
    pub fn object() -> Self {
        Self::Class(OBJECT_TYPE.to_string())
    }

    /// 创建参数化类型
    pub fn parameterized(
        raw: impl Into<String>,
        arguments: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self::Parameterized {
            raw: raw.into(),
            arguments: arguments.into_iter().collect(),
        }
    }

    /// 创建数组类型
    pub fn array(component: TypeDescriptor) -> Self {
        Self::Array(Box::new(component))
    }

    /// 创建无上界的类型变量
    pub fn variable(name: impl Into<String>) -> Self {
        Self::Variable {
            name: name.into(),
            bounds: Vec::new(),
        }
    }

    /// 创建带上界的类型变量
    pub fn bounded_variable(
        name: impl Into<String>,
        bounds: impl IntoIterator<Item = TypeDescriptor>,
    ) -> Self {
        Self::Variable {
            name: name.into(),
            bounds: bounds.into_iter().collect(),
        }
    }

    /// 无界通配符 `?`
    pub fn wildcard() -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: Vec::new(),
        }
    }

    /// 上界通配符 `? extends T`
    pub fn wildcard_extends(upper: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: vec![upper],
            lower: Vec::new(),
        }
    }

    /// 下界通配符 `? super T`
    pub fn wildcard_super(lower: TypeDescriptor) -> Self {
        Self::Wildcard {
            upper: Vec::new(),
            lower: vec![lower],
        }
    }

    /// 原始类型名称；数组、类型变量和通配符没有原始名称
    pub fn raw_name(&self) -> Option<&str> {
        match self {
            Self::Class(name) | Self::Parameterized { raw: name, .. } => Some(name),
            _ => None,
        }
    }

    /// 擦除类型参数后的类型
    pub fn raw_type(&self) -> Self {
        match self {
            Self::Parameterized { raw, .. } => Self::Class(raw.clone()),
            Self::Array(component) => Self::array(component.raw_type()),
            other => other.clone(),
        }
    }

    /// 是否为根类型
    pub fn is_object(&self) -> bool {
        matches!(self, Self::Class(name) if name == OBJECT_TYPE)
    }

    pub fn is_parameterized(&self) -> bool {
        matches!(self, Self::Parameterized { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self, Self::Variable { .. })
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Wildcard { .. })
    }

    /// 类型参数列表，非参数化类型返回空切片
    pub fn arguments(&self) -> &[TypeDescriptor] {
        match self {
            Self::Parameterized { arguments, .. } => arguments,
            _ => &[],
        }
    }

    /// 是否为上界只有 `Object` 的类型变量
    pub fn is_unbounded_variable(&self) -> bool {
        matches!(self, Self::Variable { bounds, .. } if bounds.iter().all(Self::is_object))
    }

    /// 上界列表，类型变量与通配符缺省为 `Object`
    pub fn upper_bounds(&self) -> Vec<TypeDescriptor> {
        match self {
            Self::Variable { bounds, .. } | Self::Wildcard { upper: bounds, .. }
                if !bounds.is_empty() =>
            {
                bounds.clone()
            }
            Self::Variable { .. } | Self::Wildcard { .. } => vec![Self::object()],
            other => vec![other.clone()],
        }
    }

    /// 下界列表，仅通配符可能有下界
    pub fn lower_bounds(&self) -> &[TypeDescriptor] {
        match self {
            Self::Wildcard { lower, .. } => lower,
            _ => &[],
        }
    }

    /// 是否仍包含未解析的类型变量
    pub fn contains_type_variable(&self) -> bool {
        match self {
            Self::Class(_) => false,
            Self::Variable { .. } => true,
            Self::Array(component) => component.contains_type_variable(),
            Self::Parameterized { arguments, .. } => {
                arguments.iter().any(Self::contains_type_variable)
            }
            Self::Wildcard { upper, lower } => upper
                .iter()
                .chain(lower.iter())
                .any(Self::contains_type_variable),
        }
    }

    /// 用给定绑定替换类型变量
    pub fn substitute(&self, bindings: &HashMap<String, TypeDescriptor>) -> Self {
        let substitute_all = |types: &[TypeDescriptor]| {
            types
                .iter()
                .map(|ty| ty.substitute(bindings))
                .collect::<Vec<_>>()
        };
        match self {
            Self::Class(_) => self.clone(),
            Self::Variable { name, bounds } => bindings.get(name).cloned().unwrap_or_else(|| {
                Self::Variable {
                    name: name.clone(),
                    bounds: bounds.clone(),
                }
            }),
            Self::Array(component) => Self::array(component.substitute(bindings)),
            Self::Parameterized { raw, arguments } => Self::Parameterized {
                raw: raw.clone(),
                arguments: substitute_all(arguments),
            },
            Self::Wildcard { upper, lower } => Self::Wildcard {
                upper: substitute_all(upper),
                lower: substitute_all(lower),
            },
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Class(name) | Self::Variable { name, .. } => f.write_str(name),
            Self::Parameterized { raw, arguments } => {
                write!(f, "{raw}<")?;
                for (index, argument) in arguments.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{argument}")?;
                }
                f.write_str(">")
            }
            Self::Array(component) => write!(f, "{component}[]"),
            Self::Wildcard { upper, lower } => {
                if let Some(lower) = lower.first() {
                    write!(f, "? super {lower}")
                } else if let Some(upper) = upper.first().filter(|upper| !upper.is_object()) {
                    write!(f, "? extends {upper}")
                } else {
                    f.write_str("?")
                }
            }
        }
    }
}

/// 原始类型声明：类型参数与直接父类型
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDeclaration {
    pub name: String,
    pub parameters: Vec<String>,
    pub supertypes: Vec<TypeDescriptor>,
}

impl TypeDeclaration {
    /// 创建无类型参数、无父类型的声明
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parameters: Vec::new(),
            supertypes: Vec::new(),
        }
    }

    /// 设置类型参数
    pub fn with_parameters<I, S>(mut self, parameters: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.parameters = parameters.into_iter().map(Into::into).collect();
        self
    }

    /// 添加直接父类型，可引用本声明的类型参数
    pub fn extends(mut self, supertype: TypeDescriptor) -> Self {
        self.supertypes.push(supertype);
        self
    }
}

/// 类型层次结构
#[derive(Debug, Clone, Default)]
pub struct TypeHierarchy {
    declarations: HashMap<String, TypeDeclaration>,
}

impl TypeHierarchy {
    /// 创建空的类型层次结构
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记类型声明，同名声明被覆盖
    pub fn declare(&mut self, declaration: TypeDeclaration) {
        self.declarations
            .insert(declaration.name.clone(), declaration);
    }

    /// 链式登记类型声明
    pub fn with(mut self, declaration: TypeDeclaration) -> Self {
        self.declare(declaration);
        self
    }

    /// 查找类型声明
    pub fn declaration(&self, name: &str) -> Option<&TypeDeclaration> {
        self.declarations.get(name)
    }

    pub fn len(&self) -> usize {
        self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }

    /// 直接父类型，参数化类型会替换其类型变量；原始类型的父类型同样被擦除
    pub fn direct_supertypes(&self, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        match ty {
            TypeDescriptor::Class(name) => self
                .declarations
                .get(name)
                .map(|declaration| {
                    if declaration.parameters.is_empty() {
                        declaration.supertypes.clone()
                    } else {
                        declaration
                            .supertypes
                            .iter()
                            .map(TypeDescriptor::raw_type)
                            .collect()
                    }
                })
                .unwrap_or_default(),
            TypeDescriptor::Parameterized { raw, arguments } => self
                .declarations
                .get(raw)
                .map(|declaration| {
                    let bindings: HashMap<String, TypeDescriptor> = declaration
                        .parameters
                        .iter()
                        .cloned()
                        .zip(arguments.iter().cloned())
                        .collect();
                    declaration
                        .supertypes
                        .iter()
                        .map(|supertype| supertype.substitute(&bindings))
                        .collect()
                })
                .unwrap_or_default(),
            TypeDescriptor::Variable { .. } | TypeDescriptor::Wildcard { .. } => {
                ty.upper_bounds()
            }
            TypeDescriptor::Array(_) => Vec::new(),
        }
    }

    /// 类型闭包：类型自身、所有传递父类型以及 `Object`，按广度优先顺序去重
    pub fn closure(&self, ty: &TypeDescriptor) -> Vec<TypeDescriptor> {
        let mut seen = HashSet::new();
        let mut ordered = Vec::new();
        let mut queue = VecDeque::from([ty.clone()]);

        while let Some(current) = queue.pop_front() {
            if !seen.insert(current.clone()) {
                continue;
            }
            queue.extend(self.direct_supertypes(&current));
            ordered.push(current);
        }

        let object = TypeDescriptor::object();
        if !seen.contains(&object) {
            ordered.push(object);
        }
        ordered
    }

    /// `from` 类型的值能否用在期望 `to` 类型的位置
    pub fn is_assignable(&self, from: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        if to.is_object() || from == to {
            return true;
        }

        match to {
            TypeDescriptor::Wildcard { upper, lower } => {
                return upper.iter().all(|bound| self.is_assignable(from, bound))
                    && lower.iter().all(|bound| self.is_assignable(bound, from));
            }
            TypeDescriptor::Variable { bounds, .. } => {
                return bounds.iter().all(|bound| self.is_assignable(from, bound));
            }
            _ => {}
        }

        match from {
            TypeDescriptor::Variable { .. } | TypeDescriptor::Wildcard { .. } => from
                .upper_bounds()
                .iter()
                .any(|bound| self.is_assignable(bound, to)),
            TypeDescriptor::Array(component) => match to {
                TypeDescriptor::Array(target) => self.is_assignable(component, target),
                _ => false,
            },
            _ => self
                .closure(from)
                .iter()
                .any(|candidate| self.matches_target(candidate, to)),
        }
    }

    fn matches_target(&self, candidate: &TypeDescriptor, to: &TypeDescriptor) -> bool {
        match (candidate, to) {
            (_, TypeDescriptor::Class(name)) => candidate.raw_name() == Some(name.as_str()),
            (TypeDescriptor::Class(name), TypeDescriptor::Parameterized { raw, .. }) => {
                name == raw
            }
            (
                TypeDescriptor::Parameterized {
                    raw: candidate_raw,
                    arguments: candidate_arguments,
                },
                TypeDescriptor::Parameterized { raw, arguments },
            ) => {
                candidate_raw == raw
                    && candidate_arguments.len() == arguments.len()
                    && candidate_arguments
                        .iter()
                        .zip(arguments)
                        .all(|(argument, target)| {
                            argument == target
                                || (target.is_wildcard() && self.is_assignable(argument, target))
                        })
            }
            _ => false,
        }
    }
}
