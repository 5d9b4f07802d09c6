//! 容器内置组件
//!
//! 事件发布者、动态查找与当前注入点由容器提供，作为依赖作用域组件注入。

use crate::container::{upgrade, ContainerInner};
use crate::handle::InstanceHandle;
use crate::resolver::{Resolvable, EVENT_TYPE, INJECTION_POINT_TYPE, INSTANCE_TYPE};
use di_abstractions::{
    downcast_instance, event, instance, ComponentFactory, CreationContext, CreationalContext,
    EventMetadata, Instance,
};
use infrastructure_common::{
    normalize_qualifiers, ComponentDefinition, ContainerError, ContainerResult, InjectionPoint,
    Qualifier, TypeDescriptor,
};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::{Arc, Weak};

/// 注入点声明类型的第一个类型参数，缺省为 `Object`
fn first_argument(injection_point: Option<&InjectionPoint>) -> TypeDescriptor {
    injection_point
        .and_then(|ip| ip.required_type.arguments().first().cloned())
        .unwrap_or_else(TypeDescriptor::object)
}

fn declared_qualifiers(injection_point: Option<&InjectionPoint>) -> BTreeSet<Qualifier> {
    injection_point
        .map(|ip| ip.qualifiers.clone())
        .unwrap_or_default()
}

/// 内置组件定义与工厂
pub(crate) fn built_in_components(
    container: &Weak<ContainerInner>,
) -> Vec<(ComponentDefinition, Arc<dyn ComponentFactory>)> {
    let built_in = |name: &str| {
        ComponentDefinition::new(format!("builtin:{name}"), TypeDescriptor::class(name))
            .with_qualifier(Qualifier::any())
    };
    vec![
        (
            built_in(EVENT_TYPE),
            Arc::new(EventFactory {
                container: container.clone(),
            }) as Arc<dyn ComponentFactory>,
        ),
        (
            built_in(INSTANCE_TYPE),
            Arc::new(InstanceFactory {
                container: container.clone(),
            }),
        ),
        (built_in(INJECTION_POINT_TYPE), Arc::new(InjectionPointFactory)),
    ]
}

struct EventFactory {
    container: Weak<ContainerInner>,
}

impl ComponentFactory for EventFactory {
    fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance> {
        let injection_point = context.injection_point();
        Ok(instance(EventPublisher {
            container: self.container.clone(),
            event_type: first_argument(injection_point),
            qualifiers: declared_qualifiers(injection_point),
            injection_point: injection_point.cloned(),
        }))
    }
}

struct InstanceFactory {
    container: Weak<ContainerInner>,
}

impl ComponentFactory for InstanceFactory {
    fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance> {
        let injection_point = context.injection_point();
        Ok(instance(InstanceProvider {
            container: self.container.clone(),
            required_type: first_argument(injection_point),
            qualifiers: declared_qualifiers(injection_point),
            creational: Arc::clone(context.creational()),
        }))
    }
}

/// 当前注入点：被注入组件自身的注入位置
struct InjectionPointFactory;

impl ComponentFactory for InjectionPointFactory {
    fn create(&self, context: &CreationContext<'_>) -> ContainerResult<Instance> {
        context
            .creational()
            .parent()
            .and_then(|parent| parent.injection_point().cloned())
            .map(instance)
            .ok_or_else(|| ContainerError::invalid_argument("当前组件不是通过注入点创建的"))
    }
}

/// 事件发布者
pub struct EventPublisher {
    container: Weak<ContainerInner>,
    event_type: TypeDescriptor,
    qualifiers: BTreeSet<Qualifier>,
    injection_point: Option<InjectionPoint>,
}

impl EventPublisher {
    pub fn event_type(&self) -> &TypeDescriptor {
        &self.event_type
    }

    pub fn qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.qualifiers
    }

    fn metadata(&self) -> EventMetadata {
        let mut qualifiers = self.qualifiers.clone();
        normalize_qualifiers(&mut qualifiers);
        let metadata = EventMetadata::new(self.event_type.clone(), qualifiers);
        match &self.injection_point {
            Some(injection_point) => metadata.with_injection_point(injection_point.clone()),
            None => metadata,
        }
    }

    /// 同步发布事件
    pub fn fire<T: Any + Send + Sync>(&self, payload: T) -> ContainerResult<()> {
        let container = upgrade(&self.container)?;
        container.events().fire_event(&event(payload), &self.metadata())
    }

    /// 异步发布事件
    pub fn fire_async<T: Any + Send + Sync>(
        &self,
        payload: T,
    ) -> impl Future<Output = ContainerResult<()>> + Send + 'static {
        let delivery = upgrade(&self.container)
            .map(|container| container.events().fire_async_event(event(payload), self.metadata()));
        async move { delivery?.await }
    }

    /// 以子类型和附加限定符派生新的发布者
    pub fn select(
        &self,
        subtype: Option<TypeDescriptor>,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<Self> {
        let event_type = match subtype {
            Some(subtype) => {
                let container = upgrade(&self.container)?;
                let hierarchy = container.resolver().registry().hierarchy();
                if !hierarchy.is_assignable(&subtype, &self.event_type) {
                    return Err(ContainerError::invalid_argument(format!(
                        "{} 不是事件类型 {} 的子类型",
                        subtype, self.event_type
                    )));
                }
                subtype
            }
            None => self.event_type.clone(),
        };
        let mut selected = self.qualifiers.clone();
        selected.extend(qualifiers);
        Ok(Self {
            container: self.container.clone(),
            event_type,
            qualifiers: selected,
            injection_point: self.injection_point.clone(),
        })
    }
}

impl fmt::Debug for EventPublisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventPublisher")
            .field("event_type", &self.event_type)
            .field("qualifiers", &self.qualifiers)
            .finish()
    }
}

/// 动态查找
///
/// 通过查找得到的依赖作用域实例随查找对象的创建上下文一起销毁。
pub struct InstanceProvider {
    container: Weak<ContainerInner>,
    required_type: TypeDescriptor,
    qualifiers: BTreeSet<Qualifier>,
    creational: Arc<CreationalContext>,
}

impl InstanceProvider {
    pub fn required_type(&self) -> &TypeDescriptor {
        &self.required_type
    }

    fn resolvable(&self) -> Resolvable {
        Resolvable::new(self.required_type.clone(), self.qualifiers.iter().cloned())
    }

    fn count(&self) -> ContainerResult<usize> {
        let container = upgrade(&self.container)?;
        Ok(container.resolver().resolve(&self.resolvable()).len())
    }

    /// 获取唯一匹配的实例；普通作用域组件直接取当前上下文中的实例
    pub fn get(&self) -> ContainerResult<Instance> {
        let container = upgrade(&self.container)?;
        let injection_point =
            InjectionPoint::new(self.required_type.clone(), self.qualifiers.iter().cloned());
        container.resolve_dependency(injection_point, &self.creational, false)
    }

    /// 获取并转型实例
    pub fn get_as<T: Any + Send + Sync>(&self) -> ContainerResult<Arc<T>> {
        let label = self.required_type.to_string();
        downcast_instance(self.get()?, &label)
    }

    /// 所有匹配组件的实例句柄，由调用方负责销毁
    pub fn handles(&self) -> ContainerResult<Vec<Arc<InstanceHandle>>> {
        let container = upgrade(&self.container)?;
        let resolved = container.resolver().resolve(&self.resolvable());
        resolved
            .iter()
            .map(|component| container.instance_handle(Arc::clone(component), None, None))
            .collect()
    }

    pub fn is_resolvable(&self) -> ContainerResult<bool> {
        Ok(self.count()? == 1)
    }

    pub fn is_ambiguous(&self) -> ContainerResult<bool> {
        Ok(self.count()? > 1)
    }

    pub fn is_unsatisfied(&self) -> ContainerResult<bool> {
        Ok(self.count()? == 0)
    }

    /// 以子类型和附加限定符派生新的查找对象
    pub fn select(
        &self,
        subtype: Option<TypeDescriptor>,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> Self {
        let mut selected = self.qualifiers.clone();
        selected.extend(qualifiers);
        Self {
            container: self.container.clone(),
            required_type: subtype.unwrap_or_else(|| self.required_type.clone()),
            qualifiers: selected,
            creational: Arc::clone(&self.creational),
        }
    }
}

impl fmt::Debug for InstanceProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InstanceProvider")
            .field("required_type", &self.required_type)
            .field("qualifiers", &self.qualifiers)
            .field("dependents", &self.creational.dependent_count())
            .finish()
    }
}
