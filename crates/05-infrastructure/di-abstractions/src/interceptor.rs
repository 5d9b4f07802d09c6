//! 拦截器抽象
//!
//! 拦截器链是 (拦截器定义, 拦截器实例, 回调索引) 的有序列表。
//! [`InvocationContext::proceed`] 调用链中的下一个元素，链尾调用目标方法。

use crate::factory::Instance;
use crate::registry::InjectableComponent;
use infrastructure_common::{
    unwrap_invocation_target, ComponentDefinition, ComponentKind, ContainerError,
    ContainerResult, InterceptionKind, InterceptorMetadata, MethodDescriptor, Qualifier,
};
use std::any::Any;
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

/// 方法参数与返回值
pub type Value = Box<dyn Any + Send>;

/// 把值包装为 [`Value`]
pub fn value<T: Any + Send>(value: T) -> Value {
    Box::new(value)
}

/// 上下文数据中保留的只读键：当前拦截器绑定集合
pub const INTERCEPTOR_BINDINGS: &str = "arc.interceptor-bindings";

/// 目标方法
pub type TargetMethod<'a> =
    dyn for<'b> Fn(&mut InvocationContext<'b>) -> ContainerResult<Value> + 'a;

/// 拦截器回调
pub trait InterceptorCallback: Send + Sync {
    /// 执行拦截逻辑，通常需要调用 `context.proceed()` 继续调用链
    fn intercept(
        &self,
        interceptor: &Instance,
        context: &mut InvocationContext<'_>,
    ) -> ContainerResult<Value>;
}

impl<F> InterceptorCallback for F
where
    F: Fn(&Instance, &mut InvocationContext<'_>) -> ContainerResult<Value> + Send + Sync,
{
    fn intercept(
        &self,
        interceptor: &Instance,
        context: &mut InvocationContext<'_>,
    ) -> ContainerResult<Value> {
        self(interceptor, context)
    }
}

/// 拦截器定义
pub struct InterceptorDefinition {
    component: Arc<InjectableComponent>,
    metadata: InterceptorMetadata,
    callbacks: Vec<(InterceptionKind, Arc<dyn InterceptorCallback>)>,
}

impl InterceptorDefinition {
    /// 创建拦截器定义，组件种类被设置为拦截器
    pub fn new(
        definition: ComponentDefinition,
        factory: Arc<dyn crate::factory::ComponentFactory>,
        metadata: InterceptorMetadata,
    ) -> Self {
        let definition = definition
            .with_kind(ComponentKind::Interceptor)
            .normalized();
        Self {
            component: Arc::new(InjectableComponent::new(definition, factory)),
            metadata,
            callbacks: Vec::new(),
        }
    }

    /// 添加某种拦截类型的回调
    pub fn with_callback<F>(mut self, kind: InterceptionKind, callback: F) -> Self
    where
        F: Fn(&Instance, &mut InvocationContext<'_>) -> ContainerResult<Value>
            + Send
            + Sync
            + 'static,
    {
        let callback: Arc<dyn InterceptorCallback> = Arc::new(callback);
        self.callbacks.push((kind, callback));
        self
    }

    pub fn identifier(&self) -> &str {
        &self.metadata.identifier
    }

    pub fn bindings(&self) -> &BTreeSet<Qualifier> {
        &self.metadata.bindings
    }

    pub fn priority(&self) -> i32 {
        self.metadata.priority
    }

    pub fn metadata(&self) -> &InterceptorMetadata {
        &self.metadata
    }

    /// 拦截器自身的组件
    pub fn component(&self) -> &Arc<InjectableComponent> {
        &self.component
    }

    /// 是否拦截指定类型
    pub fn intercepts(&self, kind: InterceptionKind) -> bool {
        self.callback_index(kind).is_some()
    }

    /// 指定拦截类型的回调索引
    pub fn callback_index(&self, kind: InterceptionKind) -> Option<usize> {
        self.callbacks
            .iter()
            .position(|(callback_kind, _)| *callback_kind == kind)
    }

    /// 按索引获取回调
    pub fn callback(&self, index: usize) -> Option<&Arc<dyn InterceptorCallback>> {
        self.callbacks.get(index).map(|(_, callback)| callback)
    }
}

impl fmt::Debug for InterceptorDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorDefinition")
            .field("identifier", &self.metadata.identifier)
            .field("priority", &self.metadata.priority)
            .field("bindings", &self.metadata.bindings)
            .field(
                "kinds",
                &self.callbacks.iter().map(|(kind, _)| *kind).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// 拦截器调用链中的一个元素
#[derive(Clone)]
pub struct InterceptorInvocation {
    interceptor: Arc<InterceptorDefinition>,
    instance: Instance,
    callback_index: usize,
}

impl InterceptorInvocation {
    /// 为指定拦截类型创建链元素
    pub fn new(
        interceptor: Arc<InterceptorDefinition>,
        instance: Instance,
        kind: InterceptionKind,
    ) -> ContainerResult<Self> {
        let callback_index = interceptor.callback_index(kind).ok_or_else(|| {
            ContainerError::invalid_argument(format!(
                "拦截器 {} 不支持拦截类型 {}",
                interceptor.identifier(),
                kind
            ))
        })?;
        Ok(Self {
            interceptor,
            instance,
            callback_index,
        })
    }

    pub fn interceptor(&self) -> &Arc<InterceptorDefinition> {
        &self.interceptor
    }

    pub fn instance(&self) -> &Instance {
        &self.instance
    }

    pub fn callback_index(&self) -> usize {
        self.callback_index
    }

    /// 调用拦截器回调
    pub fn invoke(&self, context: &mut InvocationContext<'_>) -> ContainerResult<Value> {
        match self.interceptor.callback(self.callback_index) {
            Some(callback) => callback.intercept(&self.instance, context),
            None => Err(ContainerError::invalid_argument(format!(
                "拦截器 {} 的回调索引无效: {}",
                self.interceptor.identifier(),
                self.callback_index
            ))),
        }
    }
}

impl fmt::Debug for InterceptorInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorInvocation")
            .field("interceptor", &self.interceptor.identifier())
            .field("callback_index", &self.callback_index)
            .finish()
    }
}

/// 整条调用链共享的上下文数据
pub struct ContextData {
    bindings: BTreeSet<Qualifier>,
    entries: HashMap<String, Value>,
}

impl ContextData {
    /// 创建上下文数据，保留键固定指向拦截器绑定集合
    pub fn new(bindings: BTreeSet<Qualifier>) -> Self {
        Self {
            bindings,
            entries: HashMap::new(),
        }
    }

    /// 当前拦截器绑定集合
    pub fn interceptor_bindings(&self) -> &BTreeSet<Qualifier> {
        &self.bindings
    }

    /// 读取数据；保留键返回 `BTreeSet<Qualifier>`
    pub fn get(&self, key: &str) -> Option<&(dyn Any + Send)> {
        if key == INTERCEPTOR_BINDINGS {
            let bindings: &(dyn Any + Send) = &self.bindings;
            return Some(bindings);
        }
        self.entries.get(key).map(|value| &**value)
    }

    /// 读取并转型
    pub fn get_as<T: Any>(&self, key: &str) -> Option<&T> {
        self.get(key).and_then(|value| value.downcast_ref::<T>())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        key == INTERCEPTOR_BINDINGS || self.entries.contains_key(key)
    }

    /// 写入数据，保留键不可写
    pub fn insert(&mut self, key: impl Into<String>, value: Value) -> ContainerResult<Option<Value>> {
        let key = key.into();
        if key == INTERCEPTOR_BINDINGS {
            return Err(ContainerError::ReservedContextDataKey { key });
        }
        Ok(self.entries.insert(key, value))
    }

    /// 移除数据，保留键不可移除
    pub fn remove(&mut self, key: &str) -> ContainerResult<Option<Value>> {
        if key == INTERCEPTOR_BINDINGS {
            return Err(ContainerError::ReservedContextDataKey {
                key: key.to_string(),
            });
        }
        Ok(self.entries.remove(key))
    }

    /// 所有键，包含保留键
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        std::iter::once(INTERCEPTOR_BINDINGS).chain(self.entries.keys().map(String::as_str))
    }
}

/// 一次调用的拦截上下文
pub struct InvocationContext<'a> {
    kind: InterceptionKind,
    target: Option<Instance>,
    method: Option<&'a MethodDescriptor>,
    parameters: Vec<Value>,
    data: ContextData,
    chain: &'a [InterceptorInvocation],
    position: usize,
    target_method: &'a TargetMethod<'a>,
}

impl<'a> InvocationContext<'a> {
    /// 创建拦截上下文
    pub fn new(
        kind: InterceptionKind,
        chain: &'a [InterceptorInvocation],
        bindings: BTreeSet<Qualifier>,
        target_method: &'a TargetMethod<'a>,
    ) -> Self {
        Self {
            kind,
            target: None,
            method: None,
            parameters: Vec::new(),
            data: ContextData::new(bindings),
            chain,
            position: 0,
            target_method,
        }
    }

    /// 设置目标实例
    pub fn with_target(mut self, target: Instance) -> Self {
        self.target = Some(target);
        self
    }

    /// 设置被拦截方法
    pub fn with_method(mut self, method: &'a MethodDescriptor) -> Self {
        self.method = Some(method);
        self
    }

    /// 设置调用参数
    pub fn with_parameters(mut self, parameters: Vec<Value>) -> Self {
        self.parameters = parameters;
        self
    }

    pub fn kind(&self) -> InterceptionKind {
        self.kind
    }

    /// 目标实例；`AroundConstruct` 在目标方法执行前为空
    pub fn target(&self) -> Option<&Instance> {
        self.target.as_ref()
    }

    /// 设置目标实例，供构造拦截的目标方法使用
    pub fn set_target(&mut self, target: Instance) {
        self.target = Some(target);
    }

    /// 被拦截方法，生命周期回调没有方法
    pub fn method(&self) -> Option<&'a MethodDescriptor> {
        self.method
    }

    pub fn parameters(&self) -> &[Value] {
        &self.parameters
    }

    /// 读取并转型单个参数
    pub fn parameter<T: Any>(&self, index: usize) -> Option<&T> {
        self.parameters
            .get(index)
            .and_then(|value| value.downcast_ref::<T>())
    }

    /// 替换全部参数，数量必须与方法声明一致
    pub fn set_parameters(&mut self, parameters: Vec<Value>) -> ContainerResult<()> {
        let expected = self
            .method
            .map_or(self.parameters.len(), |method| method.parameter_types.len());
        if parameters.len() != expected {
            return Err(ContainerError::invalid_argument(format!(
                "参数数量不匹配: 期望 {}, 实际 {}",
                expected,
                parameters.len()
            )));
        }
        self.parameters = parameters;
        Ok(())
    }

    /// 替换单个参数
    pub fn set_parameter(&mut self, index: usize, value: Value) -> ContainerResult<()> {
        match self.parameters.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(ContainerError::invalid_argument(format!(
                "参数索引越界: {index}"
            ))),
        }
    }

    pub fn context_data(&self) -> &ContextData {
        &self.data
    }

    pub fn context_data_mut(&mut self) -> &mut ContextData {
        &mut self.data
    }

    pub fn interceptor_bindings(&self) -> &BTreeSet<Qualifier> {
        self.data.interceptor_bindings()
    }

    /// 继续调用链：调用下一个拦截器，链尾调用目标方法。可以多次调用。
    ///
    /// 拦截器与目标方法返回的包装错误都会展开为最内层的原因。
    pub fn proceed(&mut self) -> ContainerResult<Value> {
        let chain = self.chain;
        let result = if let Some(invocation) = chain.get(self.position) {
            self.position += 1;
            let result = invocation.invoke(self);
            self.position -= 1;
            result
        } else {
            let target_method = self.target_method;
            target_method(self)
        };
        result.map_err(|e| match e {
            ContainerError::Invocation { source } => ContainerError::Invocation {
                source: unwrap_invocation_target(source),
            },
            other => other,
        })
    }
}
