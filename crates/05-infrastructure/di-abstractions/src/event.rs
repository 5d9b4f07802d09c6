//! 事件与观察者抽象
//!
//! 观察者方法由注册表持有；事务钩子与异步异常处理器由宿主提供。

use infrastructure_common::{
    BoxError, InjectionPoint, ObserverMetadata, Qualifier, TransactionPhase, TypeDescriptor,
};
use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::error;

/// 事件负载
pub type Event = Arc<dyn Any + Send + Sync>;

/// 把值包装为事件负载
pub fn event<T: Any + Send + Sync>(payload: T) -> Event {
    Arc::new(payload)
}

/// 事件元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventMetadata {
    /// 事件的运行时类型
    pub event_type: TypeDescriptor,
    /// 事件限定符，总是包含 `@Any`
    pub qualifiers: BTreeSet<Qualifier>,
    /// 事件发布者的注入点
    pub injection_point: Option<InjectionPoint>,
}

impl EventMetadata {
    pub fn new(event_type: TypeDescriptor, qualifiers: BTreeSet<Qualifier>) -> Self {
        Self {
            event_type,
            qualifiers,
            injection_point: None,
        }
    }

    /// 设置注入点
    pub fn with_injection_point(mut self, injection_point: InjectionPoint) -> Self {
        self.injection_point = Some(injection_point);
        self
    }
}

/// 传给观察者的事件上下文
#[derive(Clone, Copy)]
pub struct EventContext<'a> {
    payload: &'a Event,
    metadata: &'a EventMetadata,
}

impl<'a> EventContext<'a> {
    pub fn new(payload: &'a Event, metadata: &'a EventMetadata) -> Self {
        Self { payload, metadata }
    }

    /// 以具体类型读取事件负载
    pub fn event<T: Any>(&self) -> Option<&'a T> {
        let payload: &'a (dyn Any + Send + Sync) = &**self.payload;
        payload.downcast_ref::<T>()
    }

    pub fn payload(&self) -> &'a Event {
        self.payload
    }

    pub fn metadata(&self) -> &'a EventMetadata {
        self.metadata
    }
}

impl fmt::Debug for EventContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventContext")
            .field("metadata", self.metadata)
            .finish()
    }
}

/// 观察者回调
pub trait ObserverCallback: Send + Sync {
    fn notify(&self, context: &EventContext<'_>) -> Result<(), BoxError>;
}

impl<F> ObserverCallback for F
where
    F: Fn(&EventContext<'_>) -> Result<(), BoxError> + Send + Sync,
{
    fn notify(&self, context: &EventContext<'_>) -> Result<(), BoxError> {
        self(context)
    }
}

/// 观察者方法
#[derive(Clone)]
pub struct ObserverMethod {
    metadata: ObserverMetadata,
    callback: Arc<dyn ObserverCallback>,
}

impl ObserverMethod {
    /// 以闭包创建观察者方法
    pub fn new<F>(metadata: ObserverMetadata, callback: F) -> Self
    where
        F: Fn(&EventContext<'_>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        let callback: Arc<dyn ObserverCallback> = Arc::new(callback);
        Self::from_callback(metadata, callback)
    }

    pub fn from_callback(metadata: ObserverMetadata, callback: Arc<dyn ObserverCallback>) -> Self {
        Self { metadata, callback }
    }

    pub fn metadata(&self) -> &ObserverMetadata {
        &self.metadata
    }

    pub fn observed_type(&self) -> &TypeDescriptor {
        &self.metadata.observed_type
    }

    pub fn observed_qualifiers(&self) -> &BTreeSet<Qualifier> {
        &self.metadata.observed_qualifiers
    }

    pub fn declaring_component(&self) -> &str {
        &self.metadata.declaring_component
    }

    pub fn priority(&self) -> i32 {
        self.metadata.priority
    }

    pub fn is_async(&self) -> bool {
        self.metadata.is_async
    }

    pub fn transaction_phase(&self) -> TransactionPhase {
        self.metadata.transaction_phase
    }

    /// 调用观察者
    pub fn notify(&self, context: &EventContext<'_>) -> Result<(), BoxError> {
        self.callback.notify(context)
    }
}

impl fmt::Debug for ObserverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverMethod")
            .field("metadata", &self.metadata)
            .finish()
    }
}

impl fmt::Display for ObserverMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}#observe({})",
            self.metadata.declaring_component, self.metadata.observed_type
        )
    }
}

/// 事务完成状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    Committed,
    RolledBack,
    Unknown,
}

impl TransactionStatus {
    pub fn is_committed(self) -> bool {
        self == Self::Committed
    }
}

/// 事务完成回调
pub trait Synchronization: Send + Sync {
    /// 提交前调用
    fn before_completion(&self);

    /// 完成后调用
    fn after_completion(&self, status: TransactionStatus);
}

/// 事务钩子：报告当前工作单元是否处于活动事务中并注册完成回调
pub trait TransactionHook: Send + Sync {
    fn is_active(&self) -> bool;

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<(), BoxError>;
}

/// 异步观察者异常处理器
pub trait AsyncObserverExceptionHandler: Send + Sync {
    /// 处理单个异步观察者的失败；处理器自身失败会被记录并忽略
    fn handle(
        &self,
        failure: &BoxError,
        observer: &ObserverMethod,
        context: &EventContext<'_>,
    ) -> Result<(), BoxError>;
}

/// 默认异常处理器：记录错误日志
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAsyncObserverExceptionHandler;

impl AsyncObserverExceptionHandler for LoggingAsyncObserverExceptionHandler {
    fn handle(
        &self,
        failure: &BoxError,
        observer: &ObserverMethod,
        context: &EventContext<'_>,
    ) -> Result<(), BoxError> {
        error!(
            "异步观察者通知失败: {}, 事件类型: {}, 原因: {}",
            observer,
            context.metadata().event_type,
            failure
        );
        Ok(())
    }
}
