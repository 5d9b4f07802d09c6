//! 限定符与绑定
//!
//! 限定符、拦截器绑定都以 "类型标签 + 有序成员表" 的结构化值表示。
//! 比较时通过 [`BindingRules`] 查询哪些成员是非绑定成员，非绑定成员不参与匹配。

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;

/// 内置限定符 `Default`
pub const DEFAULT_QUALIFIER: &str = "Default";
/// 内置限定符 `Any`
pub const ANY_QUALIFIER: &str = "Any";
/// 内置限定符 `Named`
pub const NAMED_QUALIFIER: &str = "Named";
/// 单值成员的惯用名称
pub const VALUE_MEMBER: &str = "value";

/// 限定符成员值
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MemberValue {
    Bool(bool),
    Int(i64),
    Str(String),
    /// 类型引用，保存类型名称
    Class(String),
    /// 枚举常量
    Enum(String),
    Array(Vec<MemberValue>),
}

impl From<bool> for MemberValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for MemberValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<i32> for MemberValue {
    fn from(value: i32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<&str> for MemberValue {
    fn from(value: &str) -> Self {
        Self::Str(value.to_string())
    }
}

impl From<String> for MemberValue {
    fn from(value: String) -> Self {
        Self::Str(value)
    }
}

impl fmt::Display for MemberValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Str(value) => write!(f, "\"{value}\""),
            Self::Class(name) => write!(f, "{name}.class"),
            Self::Enum(name) => f.write_str(name),
            Self::Array(values) => {
                f.write_str("{")?;
                for (index, value) in values.iter().enumerate() {
                    if index > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{value}")?;
                }
                f.write_str("}")
            }
        }
    }
}

/// 限定符（同样用于拦截器绑定）
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Qualifier {
    kind: String,
    members: BTreeMap<String, MemberValue>,
}

impl Qualifier {
    /// 创建不带成员的限定符
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            members: BTreeMap::new(),
        }
    }

    /// 设置成员值
    pub fn with_member(mut self, name: impl Into<String>, value: impl Into<MemberValue>) -> Self {
        self.members.insert(name.into(), value.into());
        self
    }

    /// `@Default`
    pub fn default_qualifier() -> Self {
        Self::new(DEFAULT_QUALIFIER)
    }

    /// `@Any`
    pub fn any() -> Self {
        Self::new(ANY_QUALIFIER)
    }

    /// `@Named(value)`
    pub fn named(name: impl Into<String>) -> Self {
        Self::new(NAMED_QUALIFIER).with_member(VALUE_MEMBER, MemberValue::Str(name.into()))
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn members(&self) -> &BTreeMap<String, MemberValue> {
        &self.members
    }

    pub fn member(&self, name: &str) -> Option<&MemberValue> {
        self.members.get(name)
    }

    pub fn is_default(&self) -> bool {
        self.kind == DEFAULT_QUALIFIER
    }

    pub fn is_any(&self) -> bool {
        self.kind == ANY_QUALIFIER
    }

    pub fn is_named(&self) -> bool {
        self.kind == NAMED_QUALIFIER
    }

    /// `@Named` 的名称值
    pub fn name_value(&self) -> Option<&str> {
        match self.member(VALUE_MEMBER) {
            Some(MemberValue::Str(name)) if self.is_named() => Some(name),
            _ => None,
        }
    }
}

impl fmt::Display for Qualifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.kind)?;
        if self.members.is_empty() {
            return Ok(());
        }
        f.write_str("(")?;
        for (index, (name, value)) in self.members.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{name}={value}")?;
        }
        f.write_str(")")
    }
}

/// 以逗号拼接限定符，用于日志和错误信息
pub fn display_qualifiers<'a>(qualifiers: impl IntoIterator<Item = &'a Qualifier>) -> String {
    qualifiers
        .into_iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// 限定符匹配规则：记录每种限定符的非绑定成员
#[derive(Debug, Clone, Default)]
pub struct BindingRules {
    non_binding: HashMap<String, HashSet<String>>,
}

impl BindingRules {
    /// 创建空规则，所有成员都参与匹配
    pub fn new() -> Self {
        Self::default()
    }

    /// 链式声明非绑定成员
    pub fn with_non_binding(mut self, kind: impl Into<String>, member: impl Into<String>) -> Self {
        self.add_non_binding(kind, member);
        self
    }

    /// 声明非绑定成员
    pub fn add_non_binding(&mut self, kind: impl Into<String>, member: impl Into<String>) {
        self.non_binding
            .entry(kind.into())
            .or_default()
            .insert(member.into());
    }

    /// 合并另一组规则
    pub fn merge(&mut self, other: &BindingRules) {
        for (kind, members) in &other.non_binding {
            self.non_binding
                .entry(kind.clone())
                .or_default()
                .extend(members.iter().cloned());
        }
    }

    pub fn is_non_binding(&self, kind: &str, member: &str) -> bool {
        self.non_binding
            .get(kind)
            .is_some_and(|members| members.contains(member))
    }

    /// 两个限定符是否匹配：类型相同且所有绑定成员的值相等
    pub fn matches(&self, required: &Qualifier, candidate: &Qualifier) -> bool {
        if required.kind != candidate.kind {
            return false;
        }
        required
            .members
            .keys()
            .chain(candidate.members.keys())
            .filter(|member| !self.is_non_binding(&required.kind, member))
            .all(|member| required.members.get(member) == candidate.members.get(member))
    }

    /// 候选集合中是否存在与 `required` 匹配的限定符
    pub fn contains<'a>(
        &self,
        candidates: impl IntoIterator<Item = &'a Qualifier>,
        required: &Qualifier,
    ) -> bool {
        candidates
            .into_iter()
            .any(|candidate| self.matches(required, candidate))
    }

    /// `required` 中每个限定符都能在 `candidates` 中找到匹配
    pub fn contains_all<'a, 'b>(
        &self,
        candidates: impl IntoIterator<Item = &'a Qualifier> + Clone,
        required: impl IntoIterator<Item = &'b Qualifier>,
    ) -> bool {
        required
            .into_iter()
            .all(|qualifier| self.contains(candidates.clone(), qualifier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// 测试非绑定成员不参与匹配
    #[test]
    fn test_non_binding_members_ignored() {
        let rules = BindingRules::new().with_non_binding("Logged", "comment");
        let required = Qualifier::new("Logged")
            .with_member("level", "info")
            .with_member("comment", "a");
        let candidate = Qualifier::new("Logged")
            .with_member("level", "info")
            .with_member("comment", "b");
        let other_level = Qualifier::new("Logged").with_member("level", "debug");

        assert!(rules.matches(&required, &candidate));
        assert!(!rules.matches(&required, &other_level));
        assert!(!BindingRules::new().matches(&required, &candidate));
    }

    /// 测试超集匹配
    #[test]
    fn test_contains_all() {
        let rules = BindingRules::new();
        let candidates = [Qualifier::any(), Qualifier::named("primary")];

        assert!(rules.contains_all(candidates.iter(), [Qualifier::named("primary")].iter()));
        assert!(!rules.contains_all(
            candidates.iter(),
            [Qualifier::default_qualifier()].iter()
        ));
        assert!(rules.contains_all(candidates.iter(), std::iter::empty::<&Qualifier>()));
    }

    /// 测试显示格式
    #[test]
    fn test_display() {
        assert_eq!(Qualifier::named("a").to_string(), "@Named(value=\"a\")");
        assert_eq!(Qualifier::any().to_string(), "@Any");
        assert_eq!(Qualifier::named("x").name_value(), Some("x"));
    }
}
