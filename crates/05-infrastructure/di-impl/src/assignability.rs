//! 类型可赋值规则
//!
//! 组件解析与观察者匹配使用不同的规则：组件解析比较注入点类型与组件的
//! 类型闭包，观察者匹配比较观察类型与事件类型闭包。

use infrastructure_common::{TypeDescriptor, TypeHierarchy};

fn is_actual(ty: &TypeDescriptor) -> bool {
    matches!(
        ty,
        TypeDescriptor::Class(_) | TypeDescriptor::Parameterized { .. } | TypeDescriptor::Array(_)
    )
}

fn is_object_or_unbounded(ty: &TypeDescriptor) -> bool {
    ty.is_object() || ty.is_unbounded_variable()
}

/// `bounds` 中的每个界都能由 `stricter` 中的某个界赋值
fn bounds_match(
    hierarchy: &TypeHierarchy,
    bounds: &[TypeDescriptor],
    stricter: &[TypeDescriptor],
) -> bool {
    bounds.iter().all(|bound| {
        stricter
            .iter()
            .any(|candidate| hierarchy.is_assignable(candidate, bound))
    })
}

/// 通配符下界约束：通配符没有下界，或下界可以赋值给参数的每个界
fn lower_bounds_match(
    hierarchy: &TypeHierarchy,
    parameter_bounds: &[TypeDescriptor],
    wildcard: &TypeDescriptor,
) -> bool {
    let lower = wildcard.lower_bounds();
    lower.is_empty() || bounds_match(hierarchy, parameter_bounds, lower)
}

/// 组件类型可赋值规则
#[derive(Debug, Clone, Copy)]
pub struct BeanTypeRules<'a> {
    hierarchy: &'a TypeHierarchy,
}

impl<'a> BeanTypeRules<'a> {
    pub fn new(hierarchy: &'a TypeHierarchy) -> Self {
        Self { hierarchy }
    }

    /// 注入点类型是否与组件类型闭包中的任一类型匹配
    pub fn matches_any(&self, required: &TypeDescriptor, bean_types: &[TypeDescriptor]) -> bool {
        bean_types.iter().any(|bean_type| self.matches(required, bean_type))
    }

    /// 注入点类型是否与单个组件类型匹配
    pub fn matches(&self, required: &TypeDescriptor, bean_type: &TypeDescriptor) -> bool {
        match (required, bean_type) {
            (TypeDescriptor::Class(required), TypeDescriptor::Class(bean)) => required == bean,
            (TypeDescriptor::Array(required), TypeDescriptor::Array(bean)) => {
                self.matches(required, bean)
            }
            (TypeDescriptor::Class(required), TypeDescriptor::Parameterized { raw, arguments }) => {
                required == raw && arguments.iter().all(is_object_or_unbounded)
            }
            (TypeDescriptor::Parameterized { raw, arguments }, TypeDescriptor::Class(bean)) => {
                raw == bean && arguments.iter().all(is_object_or_unbounded)
            }
            (
                TypeDescriptor::Parameterized {
                    raw: required_raw,
                    arguments: required_arguments,
                },
                TypeDescriptor::Parameterized {
                    raw: bean_raw,
                    arguments: bean_arguments,
                },
            ) => {
                required_raw == bean_raw
                    && required_arguments.len() == bean_arguments.len()
                    && required_arguments
                        .iter()
                        .zip(bean_arguments)
                        .all(|(required, bean)| self.parameters_match(required, bean))
            }
            _ => false,
        }
    }

    fn parameters_match(&self, required: &TypeDescriptor, bean: &TypeDescriptor) -> bool {
        let hierarchy = self.hierarchy;
        if is_actual(required) && is_actual(bean) {
            return self.matches(required, bean);
        }
        if required.is_wildcard() && is_actual(bean) {
            return bounds_match(hierarchy, &required.upper_bounds(), std::slice::from_ref(bean))
                && lower_bounds_match(hierarchy, std::slice::from_ref(bean), required);
        }
        if required.is_wildcard() && bean.is_variable() {
            let required_upper = required.upper_bounds();
            let bean_upper = bean.upper_bounds();
            return (bounds_match(hierarchy, &bean_upper, &required_upper)
                || bounds_match(hierarchy, &required_upper, &bean_upper))
                && lower_bounds_match(hierarchy, &bean_upper, required);
        }
        if is_actual(required) && bean.is_variable() {
            return bounds_match(hierarchy, &bean.upper_bounds(), std::slice::from_ref(required));
        }
        if required.is_variable() && bean.is_variable() {
            return bounds_match(hierarchy, &bean.upper_bounds(), &required.upper_bounds());
        }
        false
    }
}

/// 事件类型可赋值规则
#[derive(Debug, Clone, Copy)]
pub struct EventTypeRules<'a> {
    hierarchy: &'a TypeHierarchy,
}

impl<'a> EventTypeRules<'a> {
    pub fn new(hierarchy: &'a TypeHierarchy) -> Self {
        Self { hierarchy }
    }

    /// 观察类型是否与事件类型闭包中的任一类型匹配
    pub fn matches(&self, observed: &TypeDescriptor, event_type: &TypeDescriptor) -> bool {
        if let TypeDescriptor::Variable { .. } = observed {
            return self.variable_matches(observed, event_type);
        }
        self.hierarchy
            .closure(event_type)
            .iter()
            .any(|candidate| self.matches_no_closure(observed, candidate))
    }

    fn variable_matches(&self, observed: &TypeDescriptor, event_type: &TypeDescriptor) -> bool {
        observed
            .upper_bounds()
            .iter()
            .all(|bound| self.hierarchy.is_assignable(event_type, bound))
    }

    fn matches_no_closure(&self, observed: &TypeDescriptor, event_type: &TypeDescriptor) -> bool {
        match (observed, event_type) {
            (TypeDescriptor::Class(observed), _) => event_type.raw_name() == Some(observed.as_str()),
            (TypeDescriptor::Array(observed), TypeDescriptor::Array(event)) => {
                self.matches_no_closure(observed, event)
            }
            (TypeDescriptor::Parameterized { raw, arguments }, TypeDescriptor::Class(event)) => {
                raw == event && arguments.iter().all(is_object_or_unbounded)
            }
            (
                TypeDescriptor::Parameterized {
                    raw: observed_raw,
                    arguments: observed_arguments,
                },
                TypeDescriptor::Parameterized {
                    raw: event_raw,
                    arguments: event_arguments,
                },
            ) => {
                observed_raw == event_raw
                    && observed_arguments.len() == event_arguments.len()
                    && observed_arguments
                        .iter()
                        .zip(event_arguments)
                        .all(|(observed, event)| self.parameters_match(observed, event))
            }
            (TypeDescriptor::Variable { .. }, _) => self.variable_matches(observed, event_type),
            _ => false,
        }
    }

    fn parameters_match(&self, observed: &TypeDescriptor, event: &TypeDescriptor) -> bool {
        match observed {
            TypeDescriptor::Wildcard { .. } => {
                observed
                    .upper_bounds()
                    .iter()
                    .all(|bound| self.hierarchy.is_assignable(event, bound))
                    && observed
                        .lower_bounds()
                        .iter()
                        .all(|bound| self.hierarchy.is_assignable(bound, event))
            }
            TypeDescriptor::Variable { .. } => self.variable_matches(observed, event),
            _ => is_actual(event) && self.matches_no_closure(observed, event),
        }
    }
}
