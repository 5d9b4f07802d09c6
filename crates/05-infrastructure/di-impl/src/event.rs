//! 事件通知
//!
//! 同步事件按优先级升序通知同步观察者，第一个失败立即中止并返回；
//! 异步事件在 tokio 阻塞线程上串行通知异步观察者，收集全部失败后一起返回。
//!
//! 事务阶段观察者在有活动事务时注册为事务完成回调延迟通知；
//! 没有事务钩子或没有活动事务时按 [`TransactionFallback`] 处理，并输出警告。

use crate::cache::ComputingCache;
use crate::context::{ManagedContextImpl, RequestActivation, CONTEXT_LIFECYCLE_EVENT_TYPE};
use crate::resolver::Resolver;
use di_abstractions::{
    event, AsyncObserverExceptionHandler, ContextLifecycleEvent, ContextLifecycleListener, Event,
    EventContext, EventMetadata, LoggingAsyncObserverExceptionHandler, ObserverMethod,
    Synchronization, TransactionHook, TransactionStatus,
};
use infrastructure_common::{
    display_qualifiers, normalize_qualifiers, ContainerConfig, ContainerError, ContainerResult,
    Qualifier, TransactionFallback, TransactionPhase, TypeDescriptor,
};
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::runtime::Handle;
use tracing::{debug, error, trace, warn};

type NotifierKey = (TypeDescriptor, BTreeSet<Qualifier>);

/// 构建事件元数据，限定符总是包含 `@Any`
pub fn event_metadata(
    event_type: TypeDescriptor,
    qualifiers: impl IntoIterator<Item = Qualifier>,
) -> EventMetadata {
    let mut qualifiers: BTreeSet<Qualifier> = qualifiers.into_iter().collect();
    normalize_qualifiers(&mut qualifiers);
    EventMetadata::new(event_type, qualifiers)
}

/// 上下文生命周期事件的元数据
pub fn lifecycle_metadata(lifecycle: &ContextLifecycleEvent) -> EventMetadata {
    let mut qualifiers = BTreeSet::from([lifecycle.kind.qualifier(&lifecycle.scope)]);
    normalize_qualifiers(&mut qualifiers);
    EventMetadata::new(
        TypeDescriptor::class(CONTEXT_LIFECYCLE_EVENT_TYPE),
        qualifiers,
    )
}

/// 一个 (事件类型, 限定符) 的观察者集合
struct Notifier {
    sync_observers: Vec<Arc<ObserverMethod>>,
    async_observers: Vec<Arc<ObserverMethod>>,
    has_transactional: bool,
    lifecycle: bool,
}

impl Notifier {
    fn new(event_type: &TypeDescriptor, observers: Vec<Arc<ObserverMethod>>) -> Self {
        let (async_observers, sync_observers): (Vec<_>, Vec<_>) =
            observers.into_iter().partition(|observer| observer.is_async());
        let has_transactional = sync_observers
            .iter()
            .any(|observer| observer.transaction_phase().is_transactional());
        Self {
            sync_observers,
            async_observers,
            has_transactional,
            lifecycle: event_type.raw_name() == Some(CONTEXT_LIFECYCLE_EVENT_TYPE),
        }
    }
}

/// 事件通知器
pub struct EventNotifier {
    resolver: Arc<Resolver>,
    request: Arc<ManagedContextImpl>,
    transaction_hook: Option<Arc<dyn TransactionHook>>,
    exception_handler: Arc<dyn AsyncObserverExceptionHandler>,
    strict_compatibility: bool,
    transaction_fallback: TransactionFallback,
    runtime: Option<Handle>,
    notifiers: ComputingCache<NotifierKey, Arc<Notifier>>,
}

impl EventNotifier {
    pub fn new(resolver: Arc<Resolver>, request: Arc<ManagedContextImpl>) -> Self {
        let config = ContainerConfig::default();
        Self {
            resolver,
            request,
            transaction_hook: None,
            exception_handler: Arc::new(LoggingAsyncObserverExceptionHandler),
            strict_compatibility: config.strict_compatibility,
            transaction_fallback: config.transaction_fallback,
            runtime: None,
            notifiers: ComputingCache::new(),
        }
    }

    /// 应用容器配置中的事件相关设置
    pub fn with_config(mut self, config: &ContainerConfig) -> Self {
        self.strict_compatibility = config.strict_compatibility;
        self.transaction_fallback = config.transaction_fallback;
        self
    }

    pub fn with_transaction_hook(mut self, hook: Option<Arc<dyn TransactionHook>>) -> Self {
        self.transaction_hook = hook;
        self
    }

    pub fn with_exception_handler(mut self, handler: Arc<dyn AsyncObserverExceptionHandler>) -> Self {
        self.exception_handler = handler;
        self
    }

    /// 异步通知使用的运行时，未设置时使用当前运行时
    pub fn with_runtime(mut self, runtime: Option<Handle>) -> Self {
        self.runtime = runtime;
        self
    }

    fn notifier(&self, metadata: &EventMetadata) -> Arc<Notifier> {
        let key = (metadata.event_type.clone(), metadata.qualifiers.clone());
        self.notifiers.get_or_compute(&key, |(event_type, qualifiers)| {
            let observers = self.resolver.resolve_observers(event_type, qualifiers);
            Arc::new(Notifier::new(event_type, observers))
        })
    }

    fn check_event_type(metadata: &EventMetadata) -> ContainerResult<()> {
        if metadata.event_type.contains_type_variable() {
            return Err(ContainerError::invalid_argument(format!(
                "事件类型包含未解析的类型变量: {}",
                metadata.event_type
            )));
        }
        Ok(())
    }

    fn activation(&self, lifecycle: bool) -> ContainerResult<RequestActivation> {
        if self.strict_compatibility || lifecycle {
            Ok(RequestActivation::noop(Arc::clone(&self.request)))
        } else {
            RequestActivation::activate_if_inactive(Arc::clone(&self.request))
        }
    }

    /// 同步触发事件
    pub fn fire(
        &self,
        payload: &Event,
        event_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> ContainerResult<()> {
        self.fire_event(payload, &event_metadata(event_type, qualifiers))
    }

    /// 以完整元数据同步触发事件
    pub fn fire_event(&self, payload: &Event, metadata: &EventMetadata) -> ContainerResult<()> {
        Self::check_event_type(metadata)?;
        let notifier = self.notifier(metadata);
        if notifier.sync_observers.is_empty() {
            trace!("事件没有同步观察者: {}", metadata.event_type);
            return Ok(());
        }

        let _activation = self.activation(notifier.lifecycle)?;
        let context = EventContext::new(payload, metadata);
        if !notifier.has_transactional {
            return notify_inline(&notifier.sync_observers, &context, |_| true);
        }
        self.notify_transactional(&notifier, payload, metadata, &context)
    }

    fn notify_transactional(
        &self,
        notifier: &Notifier,
        payload: &Event,
        metadata: &EventMetadata,
        context: &EventContext<'_>,
    ) -> ContainerResult<()> {
        let deferred: Vec<Arc<ObserverMethod>> = notifier
            .sync_observers
            .iter()
            .filter(|observer| observer.transaction_phase().is_transactional())
            .cloned()
            .collect();

        match &self.transaction_hook {
            Some(hook) if hook.is_active() => {
                let synchronization = Arc::new(DeferredNotifications {
                    observers: deferred,
                    payload: Arc::clone(payload),
                    metadata: metadata.clone(),
                    request: Arc::clone(&self.request),
                    activate: !notifier.lifecycle,
                });
                match hook.register_synchronization(synchronization) {
                    Ok(()) => {
                        debug!("事务观察者已延迟到事务完成: {}", metadata.event_type);
                        notify_inline(&notifier.sync_observers, context, |observer| {
                            !observer.transaction_phase().is_transactional()
                        })
                    }
                    Err(e) => {
                        warn!(
                            "注册事务完成回调失败, 事务观察者将立即通知(成功阶段观察者除外): {}, 原因: {}",
                            metadata.event_type, e
                        );
                        notify_inline(&notifier.sync_observers, context, |observer| {
                            observer.transaction_phase() != TransactionPhase::AfterSuccess
                        })
                    }
                }
            }
            _ => {
                let names = observer_names(&deferred);
                match self.transaction_fallback {
                    TransactionFallback::NotifyImmediately => {
                        warn!("没有活动事务, 事务观察者将立即通知: {}", names);
                        notify_inline(&notifier.sync_observers, context, |_| true)
                    }
                    TransactionFallback::Skip => {
                        warn!("没有活动事务, 跳过事务观察者: {}", names);
                        notify_inline(&notifier.sync_observers, context, |observer| {
                            !observer.transaction_phase().is_transactional()
                        })
                    }
                }
            }
        }
    }

    /// 异步触发事件
    pub fn fire_async(
        &self,
        payload: Event,
        event_type: TypeDescriptor,
        qualifiers: impl IntoIterator<Item = Qualifier>,
    ) -> impl Future<Output = ContainerResult<()>> + Send + 'static {
        self.fire_async_event(payload, event_metadata(event_type, qualifiers))
    }

    /// 以完整元数据异步触发事件
    ///
    /// 观察者立即在运行时的阻塞线程上开始执行，返回的 future 在全部观察者执行完后完成。
    pub fn fire_async_event(
        &self,
        payload: Event,
        metadata: EventMetadata,
    ) -> impl Future<Output = ContainerResult<()>> + Send + 'static {
        let spawned = self.spawn_async(payload, metadata);
        async move {
            match spawned? {
                Some(task) => task.await.map_err(ContainerError::invocation)?,
                None => Ok(()),
            }
        }
    }

    fn spawn_async(
        &self,
        payload: Event,
        metadata: EventMetadata,
    ) -> ContainerResult<Option<tokio::task::JoinHandle<ContainerResult<()>>>> {
        Self::check_event_type(&metadata)?;
        let notifier = self.notifier(&metadata);
        if notifier.async_observers.is_empty() {
            trace!("事件没有异步观察者: {}", metadata.event_type);
            return Ok(None);
        }
        let runtime = match &self.runtime {
            Some(handle) => handle.clone(),
            None => Handle::try_current().map_err(ContainerError::invocation)?,
        };
        let delivery = AsyncDelivery {
            observers: notifier.async_observers.clone(),
            payload,
            metadata,
            request: Arc::clone(&self.request),
            activate: !self.strict_compatibility && !notifier.lifecycle,
            handler: Arc::clone(&self.exception_handler),
        };
        Ok(Some(runtime.spawn_blocking(move || delivery.run())))
    }

    /// 清空通知器缓存
    pub fn clear(&self) {
        self.notifiers.clear();
    }
}

impl ContextLifecycleListener for EventNotifier {
    fn on_lifecycle_event(&self, lifecycle: &ContextLifecycleEvent) -> ContainerResult<()> {
        let metadata = lifecycle_metadata(lifecycle);
        self.fire_event(&event(lifecycle.clone()), &metadata)
    }
}

impl fmt::Debug for EventNotifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventNotifier")
            .field("strict_compatibility", &self.strict_compatibility)
            .field("transaction_fallback", &self.transaction_fallback)
            .field("transaction_hook", &self.transaction_hook.is_some())
            .field("cached_notifiers", &self.notifiers.len())
            .finish()
    }
}

fn observer_names(observers: &[Arc<ObserverMethod>]) -> String {
    observers
        .iter()
        .map(|observer| observer.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// 按顺序通知满足条件的观察者，第一个失败立即返回
fn notify_inline(
    observers: &[Arc<ObserverMethod>],
    context: &EventContext<'_>,
    include: impl Fn(&ObserverMethod) -> bool,
) -> ContainerResult<()> {
    for observer in observers.iter().filter(|observer| include(observer)) {
        trace!("通知观察者: {}", observer);
        observer.notify(context).map_err(ContainerError::invocation)?;
    }
    Ok(())
}

/// 在阻塞线程上执行的异步通知
struct AsyncDelivery {
    observers: Vec<Arc<ObserverMethod>>,
    payload: Event,
    metadata: EventMetadata,
    request: Arc<ManagedContextImpl>,
    activate: bool,
    handler: Arc<dyn AsyncObserverExceptionHandler>,
}

impl AsyncDelivery {
    fn run(self) -> ContainerResult<()> {
        let _activation = if self.activate {
            RequestActivation::activate_if_inactive(Arc::clone(&self.request))?
        } else {
            RequestActivation::noop(Arc::clone(&self.request))
        };
        let context = EventContext::new(&self.payload, &self.metadata);
        let mut failures = Vec::new();
        for observer in &self.observers {
            if let Err(failure) = observer.notify(&context) {
                if let Err(e) = self.handler.handle(&failure, observer, &context) {
                    warn!("异步观察者异常处理器执行失败: {}, 原因: {}", observer, e);
                }
                failures.push(failure);
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            debug!(
                "异步事件 {} [{}] 有 {} 个观察者失败",
                self.metadata.event_type,
                display_qualifiers(&self.metadata.qualifiers),
                failures.len()
            );
            Err(ContainerError::ObserverFailures { failures })
        }
    }
}

/// 注册到事务的延迟通知
struct DeferredNotifications {
    observers: Vec<Arc<ObserverMethod>>,
    payload: Event,
    metadata: EventMetadata,
    request: Arc<ManagedContextImpl>,
    activate: bool,
}

impl DeferredNotifications {
    fn notify(&self, include: impl Fn(TransactionPhase) -> bool) {
        let selected: Vec<&Arc<ObserverMethod>> = self
            .observers
            .iter()
            .filter(|observer| include(observer.transaction_phase()))
            .collect();
        if selected.is_empty() {
            return;
        }
        let activation = if self.activate {
            RequestActivation::activate_if_inactive(Arc::clone(&self.request))
        } else {
            Ok(RequestActivation::noop(Arc::clone(&self.request)))
        };
        let _activation = match activation {
            Ok(activation) => activation,
            Err(e) => {
                error!("延迟事务通知无法激活请求上下文: {}, 原因: {}", self.metadata.event_type, e);
                return;
            }
        };
        let context = EventContext::new(&self.payload, &self.metadata);
        for observer in selected {
            if let Err(e) = observer.notify(&context) {
                error!("事务观察者通知失败: {}, 原因: {}", observer, e);
            }
        }
    }
}

impl Synchronization for DeferredNotifications {
    fn before_completion(&self) {
        self.notify(|phase| phase == TransactionPhase::BeforeCompletion);
    }

    fn after_completion(&self, status: TransactionStatus) {
        self.notify(|phase| match phase {
            TransactionPhase::AfterCompletion => true,
            TransactionPhase::AfterSuccess => status.is_committed(),
            TransactionPhase::AfterFailure => !status.is_committed(),
            TransactionPhase::InProgress | TransactionPhase::BeforeCompletion => false,
        });
    }
}
