//! 拦截器调用链
//!
//! 链由拦截器绑定是有效绑定子集的拦截器组成，按优先级升序排列。
//! 有效绑定包含通过元绑定传递引入的绑定。链在 (拦截类型, 有效绑定) 上缓存。

use crate::cache::ComputingCache;
use crate::handle::{FactoryDestroyer, InstanceHandle};
use crate::resolver::Resolver;
use di_abstractions::{
    value, CreationContext, CreationalContext, DependencyLookup, Instance, InterceptorDefinition,
    InterceptorInvocation, InvocationContext, TargetMethod, Value,
};
use infrastructure_common::{
    display_qualifiers, ContainerError, ContainerResult, InterceptionKind, MethodDescriptor,
    Qualifier,
};
use std::collections::{BTreeSet, VecDeque};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace};

type ChainKey = (InterceptionKind, BTreeSet<Qualifier>);

/// 拦截器链执行器
pub struct InterceptionExecutor {
    resolver: Arc<Resolver>,
    chains: ComputingCache<ChainKey, Arc<Vec<Arc<InterceptorDefinition>>>>,
}

impl InterceptionExecutor {
    pub fn new(resolver: Arc<Resolver>) -> Self {
        Self {
            resolver,
            chains: ComputingCache::new(),
        }
    }

    /// 展开元绑定，得到有效绑定集合
    pub fn effective_bindings(&self, bindings: &BTreeSet<Qualifier>) -> BTreeSet<Qualifier> {
        let transitive = self.resolver.registry().transitive_bindings();
        let mut effective = bindings.clone();
        let mut pending: VecDeque<Qualifier> = bindings.iter().cloned().collect();
        while let Some(binding) = pending.pop_front() {
            if let Some(implied) = transitive.get(binding.kind()) {
                for qualifier in implied {
                    if effective.insert(qualifier.clone()) {
                        pending.push_back(qualifier.clone());
                    }
                }
            }
        }
        effective
    }

    /// 拦截器定义列表，按优先级升序
    pub fn interceptors(
        &self,
        kind: InterceptionKind,
        bindings: &BTreeSet<Qualifier>,
    ) -> Arc<Vec<Arc<InterceptorDefinition>>> {
        let key = (kind, self.effective_bindings(bindings));
        self.chains.get_or_compute(&key, |(kind, effective)| {
            let interceptors = self.resolver.resolve_interceptors(*kind, effective);
            debug!(
                "构建拦截器链: {}, 绑定: [{}], 拦截器数: {}",
                kind,
                display_qualifiers(effective),
                interceptors.len()
            );
            Arc::new(interceptors)
        })
    }

    /// 构建调用链；拦截器实例作为依赖实例记录到 `parent`
    pub fn build_chain(
        &self,
        kind: InterceptionKind,
        bindings: &BTreeSet<Qualifier>,
        parent: &Arc<CreationalContext>,
        lookup: &dyn DependencyLookup,
    ) -> ContainerResult<InterceptorChain> {
        let interceptors = self.interceptors(kind, bindings);
        let mut invocations = Vec::with_capacity(interceptors.len());
        for interceptor in interceptors.iter() {
            let instance = create_interceptor(interceptor, parent, lookup)?;
            invocations.push(InterceptorInvocation::new(
                Arc::clone(interceptor),
                instance,
                kind,
            )?);
        }
        Ok(InterceptorChain {
            kind,
            bindings: bindings.clone(),
            invocations,
            creational: Arc::clone(parent),
        })
    }

    /// 清空链缓存
    pub fn clear(&self) {
        self.chains.clear();
    }
}

impl fmt::Debug for InterceptionExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptionExecutor")
            .field("cached_chains", &self.chains.len())
            .finish()
    }
}

fn create_interceptor(
    interceptor: &Arc<InterceptorDefinition>,
    parent: &Arc<CreationalContext>,
    lookup: &dyn DependencyLookup,
) -> ContainerResult<Instance> {
    let component = interceptor.component();
    let creational = parent.child(component.identifier());
    let instance = component.create(&CreationContext::new(&creational, lookup))?;
    trace!("创建拦截器实例: {}", component.identifier());
    parent.add_dependent_instance(Arc::new(InstanceHandle::new(
        Arc::clone(&instance),
        Arc::clone(component),
        creational,
        Arc::new(FactoryDestroyer),
    )));
    Ok(instance)
}

/// 已实例化的拦截器链
pub struct InterceptorChain {
    kind: InterceptionKind,
    bindings: BTreeSet<Qualifier>,
    invocations: Vec<InterceptorInvocation>,
    creational: Arc<CreationalContext>,
}

impl InterceptorChain {
    pub fn kind(&self) -> InterceptionKind {
        self.kind
    }

    /// 方法声明的拦截器绑定
    pub fn bindings(&self) -> &BTreeSet<Qualifier> {
        &self.bindings
    }

    pub fn invocations(&self) -> &[InterceptorInvocation] {
        &self.invocations
    }

    /// 链中拦截器的标识，按执行顺序
    pub fn interceptor_ids(&self) -> Vec<&str> {
        self.invocations
            .iter()
            .map(|invocation| invocation.interceptor().identifier())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }

    pub fn creational(&self) -> &Arc<CreationalContext> {
        &self.creational
    }

    /// 执行业务方法调用链
    pub fn invoke<F>(
        &self,
        target: Option<Instance>,
        method: Option<&MethodDescriptor>,
        parameters: Vec<Value>,
        target_method: F,
    ) -> ContainerResult<Value>
    where
        F: for<'b> Fn(&mut InvocationContext<'b>) -> ContainerResult<Value>,
    {
        let target_method: &TargetMethod<'_> = &target_method;
        let mut context = InvocationContext::new(
            self.kind,
            &self.invocations,
            self.bindings.clone(),
            target_method,
        )
        .with_parameters(parameters);
        if let Some(target) = target {
            context = context.with_target(target);
        }
        if let Some(method) = method {
            context = context.with_method(method);
        }
        context.proceed()
    }

    /// 执行构造拦截链，返回目标构造产生的实例
    pub fn construct(
        &self,
        create: &dyn Fn() -> ContainerResult<Instance>,
    ) -> ContainerResult<Instance> {
        let target_method = |context: &mut InvocationContext<'_>| -> ContainerResult<Value> {
            let instance = create()?;
            context.set_target(instance);
            Ok(value(()))
        };
        let target_method: &TargetMethod<'_> = &target_method;
        let mut context = InvocationContext::new(
            self.kind,
            &self.invocations,
            self.bindings.clone(),
            target_method,
        );
        context.proceed()?;
        context.target().cloned().ok_or_else(|| {
            ContainerError::invalid_argument("构造拦截链没有调用目标构造".to_string())
        })
    }

    /// 执行生命周期回调链（构造完成、销毁前）
    pub fn invoke_lifecycle(&self, target: &Instance) -> ContainerResult<()> {
        if self.invocations.is_empty() {
            return Ok(());
        }
        let target_method =
            |_: &mut InvocationContext<'_>| -> ContainerResult<Value> { Ok(value(())) };
        self.invoke(Some(Arc::clone(target)), None, Vec::new(), target_method)
            .map(|_| ())
    }

    /// 释放拦截器实例
    pub fn release(&self) {
        self.creational.release();
    }
}

impl fmt::Debug for InterceptorChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InterceptorChain")
            .field("kind", &self.kind)
            .field("bindings", &display_qualifiers(&self.bindings))
            .field("interceptors", &self.interceptor_ids())
            .finish()
    }
}
