//! 依赖注入运行时集中集成测试
//!
//! 通过 [`DiContainer`] 端到端验证解析、作用域、拦截器链与事件通知。

use di_abstractions::{
    event, factory_fn, instance, value, AsyncObserverExceptionHandler, ComponentRegistry,
    Components, ContextState, EventContext, Instance, InterceptorDefinition, InvocationContext,
    LambdaFactory, ManagedContext, ObserverMethod, Synchronization, TransactionHook,
    TransactionStatus, Value,
};
use di_impl::{ComputingCache, DiContainer, SharedContext};
use infrastructure_common::{
    BoxError, ComponentDefinition, ContainerError, ContainerResult, InterceptionKind,
    InterceptorMetadata, LifecycleError, MethodDescriptor, ObserverMetadata, Qualifier, ScopeKind,
    TransactionPhase, TypeDescriptor,
};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::time::Duration;

fn class(name: &str) -> TypeDescriptor {
    TypeDescriptor::class(name)
}

fn container(components: Components) -> DiContainer {
    let registry = ComponentRegistry::build([components]).unwrap();
    let container = DiContainer::builder(registry).build();
    container.init().unwrap();
    container
}

fn payment(identifier: &str) -> ComponentDefinition {
    ComponentDefinition::new(identifier, class(identifier)).with_type(class("Payment"))
}

fn named_factory(name: &'static str) -> Arc<dyn di_abstractions::ComponentFactory> {
    factory_fn(move |_| Ok(instance(name.to_string())))
}

/// 测试歧义消解：先移除默认组件，再保留带优先级的组件，最后取最高优先级
#[test]
fn test_literal_tie_break() {
    let container = container(
        Components::new()
            .with_component(payment("legacy").as_default(), named_factory("legacy"))
            .with_component(payment("cash"), named_factory("cash"))
            .with_component(payment("card").with_priority(10), named_factory("card"))
            .with_component(payment("wallet").with_priority(20), named_factory("wallet")),
    );

    let selected = container.get::<String>(class("Payment"), []).unwrap();
    assert_eq!(selected.as_str(), "wallet");

    // 解析集合保留全部候选
    assert_eq!(container.resolve(class("Payment"), []).unwrap().len(), 4);
}

/// 测试只有默认组件时无法消解
#[test]
fn test_defaults_only_remain_ambiguous() {
    let container = container(
        Components::new()
            .with_component(payment("first").as_default(), named_factory("first"))
            .with_component(payment("second").as_default(), named_factory("second")),
    );

    match container.get::<String>(class("Payment"), []) {
        Err(ContainerError::AmbiguousResolution { candidates, .. }) => {
            assert_eq!(candidates.len(), 2);
        }
        other => panic!("期望歧义错误, 实际: {:?}", other.map(|s| s.to_string())),
    }
}

/// 测试并发首次访问：缓存与应用作用域都只计算一次
#[test]
fn test_concurrent_first_access_computes_once() {
    const THREADS: usize = 8;

    let cache: ComputingCache<String, Arc<String>> = ComputingCache::new();
    let computations = AtomicUsize::new(0);
    let barrier = Barrier::new(THREADS);
    let values: Vec<Arc<String>> = std::thread::scope(|scope| {
        let workers: Vec<_> = (0..THREADS)
            .map(|_| {
                scope.spawn(|| {
                    barrier.wait();
                    cache.get_or_compute(&"key".to_string(), |key| {
                        computations.fetch_add(1, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        Arc::new(key.to_uppercase())
                    })
                })
            })
            .collect();
        workers.into_iter().map(|worker| worker.join().unwrap()).collect()
    });
    assert_eq!(computations.load(Ordering::SeqCst), 1);
    assert!(values.iter().all(|v| Arc::ptr_eq(v, &values[0])));

    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let container = container(Components::new().with_component(
        ComponentDefinition::new("registry", class("Registry")).with_scope(ScopeKind::Application),
        factory_fn(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            std::thread::sleep(Duration::from_millis(20));
            Ok(instance(Mutex::new(Vec::<u32>::new())))
        }),
    ));
    let barrier = Barrier::new(THREADS);
    std::thread::scope(|scope| {
        for id in 0..THREADS {
            let container = container.clone();
            let barrier = &barrier;
            scope.spawn(move || {
                barrier.wait();
                let registry = container
                    .get::<Mutex<Vec<u32>>>(class("Registry"), [])
                    .unwrap();
                registry.lock().push(id as u32);
            });
        }
    });
    assert_eq!(created.load(Ordering::SeqCst), 1);
    let registry = container.get::<Mutex<Vec<u32>>>(class("Registry"), []).unwrap();
    assert_eq!(registry.lock().len(), THREADS);
}

/// 测试重复销毁只执行一次销毁逻辑
#[test]
fn test_double_destroy() {
    let destroyed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&destroyed);
    let container = container(Components::new().with_component(
        ComponentDefinition::new("session", class("Session")),
        LambdaFactory::new(|_| Ok(instance(42u32)))
            .on_destroy(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .shared(),
    ));

    let handle = container.instance(class("Session"), []).unwrap();
    assert_eq!(*handle.get::<u32>().unwrap(), 42);
    handle.destroy().unwrap();
    handle.destroy().unwrap();

    assert_eq!(destroyed.load(Ordering::SeqCst), 1);
    assert!(matches!(
        handle.instance(),
        Err(ContainerError::InstanceDestroyed { .. })
    ));
}

/// 测试依赖作用域实例随所属的应用作用域实例在关闭时销毁
#[test]
fn test_dependent_released_with_owner() {
    let destroyed = Arc::new(Mutex::new(Vec::new()));
    let log = Arc::clone(&destroyed);
    let container = container(
        Components::new()
            .with_component(
                ComponentDefinition::new("connection", class("Connection")),
                LambdaFactory::new(|_| Ok(instance("conn".to_string())))
                    .on_destroy(move |_| {
                        log.lock().push("connection");
                        Ok(())
                    })
                    .shared(),
            )
            .with_component(
                ComponentDefinition::new("repository", class("Repository"))
                    .with_scope(ScopeKind::Application),
                factory_fn(|ctx| {
                    let connection = ctx.inject::<String>(class("Connection"), [])?;
                    Ok(instance(format!("repository({connection})")))
                }),
            ),
    );

    let repository = container.get::<String>(class("Repository"), []).unwrap();
    assert_eq!(repository.as_str(), "repository(conn)");
    assert!(destroyed.lock().is_empty());

    container.shutdown();
    assert_eq!(destroyed.lock().as_slice(), ["connection"]);
}

fn recording_interceptor(
    identifier: &'static str,
    priority: i32,
    bindings: &[&str],
    log: &Arc<Mutex<Vec<String>>>,
) -> InterceptorDefinition {
    let metadata = bindings.iter().fold(
        InterceptorMetadata::new(identifier, priority),
        |metadata, binding| metadata.with_binding(Qualifier::new(*binding)),
    );
    let log = Arc::clone(log);
    InterceptorDefinition::new(
        ComponentDefinition::new(identifier, class(identifier)),
        factory_fn(|_| Ok(instance(()))),
        metadata,
    )
    .with_callback(
        InterceptionKind::AroundInvoke,
        move |_: &Instance, context: &mut InvocationContext<'_>| {
            log.lock().push(format!("{identifier}:before"));
            let result = context.proceed();
            log.lock().push(format!("{identifier}:after"));
            result
        },
    )
}

fn bindings(kinds: &[&str]) -> BTreeSet<Qualifier> {
    kinds.iter().map(|kind| Qualifier::new(*kind)).collect()
}

/// 测试拦截器按优先级升序执行，且只选择绑定为请求绑定子集的拦截器
#[test]
fn test_interceptor_order_and_binding_subset() -> ContainerResult<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let container = container(
        Components::new()
            .with_interceptor(recording_interceptor("tx", 100, &["Transactional"], &log))
            .with_interceptor(recording_interceptor("secure", 50, &["Logged", "Secured"], &log))
            .with_interceptor(recording_interceptor("logging", 10, &["Logged"], &log)),
    );

    let logged_only = container.build_chain(InterceptionKind::AroundInvoke, &bindings(&["Logged"]))?;
    assert_eq!(logged_only.interceptor_ids(), vec!["logging"]);

    let all = container.build_chain(
        InterceptionKind::AroundInvoke,
        &bindings(&["Logged", "Secured", "Transactional"]),
    )?;
    assert_eq!(all.interceptor_ids(), vec!["logging", "secure", "tx"]);

    let target_log = Arc::clone(&log);
    let method = MethodDescriptor::new(class("Account"), "withdraw");
    let result = container.invoke(
        &all,
        instance(()),
        &method,
        vec![value(5u32)],
        move |context: &mut InvocationContext<'_>| -> ContainerResult<Value> {
            target_log.lock().push("target".to_string());
            let amount = context.parameter::<u32>(0).copied().unwrap_or_default();
            Ok(value(amount * 2))
        },
    )?;
    assert_eq!(*result.downcast::<u32>().unwrap(), 10);
    assert_eq!(
        log.lock().as_slice(),
        [
            "logging:before",
            "secure:before",
            "tx:before",
            "target",
            "tx:after",
            "secure:after",
            "logging:after",
        ]
    );

    let none = container.build_chain(InterceptionKind::AroundInvoke, &bindings(&["Cached"]))?;
    assert!(none.is_empty());
    Ok(())
}

/// 测试相同优先级的拦截器与观察者保持注册顺序
#[test]
fn test_equal_priority_keeps_registration_order() -> ContainerResult<()> {
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer = |identifier: &'static str, priority: i32| {
        let log = Arc::clone(&log);
        ObserverMethod::new(
            ObserverMetadata::new(identifier, class("Ping")).with_priority(priority),
            move |_: &EventContext<'_>| -> Result<(), BoxError> {
                log.lock().push(identifier.to_string());
                Ok(())
            },
        )
    };
    let container = container(
        Components::new()
            .with_interceptor(recording_interceptor("zeta", 10, &["Logged"], &log))
            .with_interceptor(recording_interceptor("early", 1, &["Logged"], &log))
            .with_interceptor(recording_interceptor("alpha", 10, &["Logged"], &log))
            .with_observer(observer("second", 5))
            .with_observer(observer("first", 5))
            .with_observer(observer("earliest", 1))
            .with_observer(observer("third", 5)),
    );

    let chain = container.build_chain(InterceptionKind::AroundInvoke, &bindings(&["Logged"]))?;
    assert_eq!(chain.interceptor_ids(), vec!["early", "zeta", "alpha"]);

    container.fire(&event(()), class("Ping"), [])?;
    assert_eq!(
        log.lock().as_slice(),
        ["earliest", "second", "first", "third"]
    );
    Ok(())
}

/// 测试获取与销毁同一请求状态并发：获取要么在失效前完成，要么失败
#[test]
fn test_get_racing_state_destruction() {
    const READERS: usize = 4;

    let created = Arc::new(AtomicUsize::new(0));
    let destroyed = Arc::new(AtomicUsize::new(0));
    let create_counter = Arc::clone(&created);
    let destroy_counter = Arc::clone(&destroyed);
    let container = container(Components::new().with_component(
        ComponentDefinition::new("cart", class("Cart")).with_scope(ScopeKind::Request),
        LambdaFactory::new(move |_| {
            create_counter.fetch_add(1, Ordering::SeqCst);
            Ok(instance(7u32))
        })
        .on_destroy(move |_| {
            destroy_counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
        .shared(),
    ));
    let request = container.request_context();
    let state = request.activate(None).unwrap();
    request.deactivate();

    let barrier = Barrier::new(READERS + 1);
    std::thread::scope(|scope| {
        for _ in 0..READERS {
            scope.spawn(|| {
                request.activate(Some(Arc::clone(&state))).unwrap();
                barrier.wait();
                loop {
                    match container.get::<u32>(class("Cart"), []) {
                        Ok(cart) => {
                            assert_eq!(*cart, 7);
                            std::thread::yield_now();
                        }
                        Err(ContainerError::ContextNotActive { .. })
                        | Err(ContainerError::InstanceDestroyed { .. }) => break,
                        Err(other) => panic!("意外的错误: {other}"),
                    }
                }
                // 失效之后的获取全部失败
                assert!(matches!(
                    container.get::<u32>(class("Cart"), []),
                    Err(ContainerError::ContextNotActive { .. })
                ));
                request.deactivate();
            });
        }
        scope.spawn(|| {
            barrier.wait();
            std::thread::sleep(Duration::from_millis(2));
            request.destroy_state(&state).unwrap();
        });
    });

    assert!(!state.is_valid());
    assert!(created.load(Ordering::SeqCst) <= 1);
    assert_eq!(
        destroyed.load(Ordering::SeqCst),
        created.load(Ordering::SeqCst)
    );
    assert!(request.activate(Some(state)).is_err());
}

#[derive(Default)]
struct CountingHandler {
    handled: AtomicUsize,
}

impl AsyncObserverExceptionHandler for CountingHandler {
    fn handle(
        &self,
        _failure: &BoxError,
        _observer: &ObserverMethod,
        _context: &EventContext<'_>,
    ) -> Result<(), BoxError> {
        self.handled.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// 测试异步事件：一个观察者失败不影响其他观察者，失败被汇总返回
#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_async_observer_failure_is_collected() {
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let components = Components::new()
        .with_observer(ObserverMethod::new(
            ObserverMetadata::new("broken", class("Shipment"))
                .asynchronous()
                .with_priority(1),
            |_: &EventContext<'_>| -> Result<(), BoxError> { Err("仓库不可用".into()) },
        ))
        .with_observer(ObserverMethod::new(
            ObserverMetadata::new("tracker", class("Shipment"))
                .asynchronous()
                .with_priority(2),
            move |ctx: &EventContext<'_>| -> Result<(), BoxError> {
                if ctx.event::<u32>() == Some(&7) {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Ok(())
            },
        ));
    let handler = Arc::new(CountingHandler::default());
    let registry = ComponentRegistry::build([components]).unwrap();
    let container = DiContainer::builder(registry)
        .with_exception_handler(Arc::clone(&handler) as Arc<dyn AsyncObserverExceptionHandler>)
        .build();
    container.init().unwrap();

    let result = container.fire_async(event(7u32), class("Shipment"), []).await;
    match result {
        Err(ContainerError::ObserverFailures { failures }) => {
            assert_eq!(failures.len(), 1);
            assert_eq!(failures[0].to_string(), "仓库不可用");
        }
        other => panic!("期望观察者失败汇总, 实际: {:?}", other),
    }
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
    assert_eq!(handler.handled.load(Ordering::SeqCst), 1);

    // 同步触发不通知异步观察者
    container.fire(&event(7u32), class("Shipment"), []).unwrap();
    assert_eq!(delivered.load(Ordering::SeqCst), 1);
}

#[derive(Default)]
struct TestTransaction {
    active: Mutex<bool>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
}

impl TestTransaction {
    fn complete(&self, status: TransactionStatus) {
        let synchronizations = std::mem::take(&mut *self.synchronizations.lock());
        for synchronization in &synchronizations {
            synchronization.before_completion();
        }
        *self.active.lock() = false;
        for synchronization in &synchronizations {
            synchronization.after_completion(status);
        }
    }
}

impl TransactionHook for TestTransaction {
    fn is_active(&self) -> bool {
        *self.active.lock()
    }

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<(), BoxError> {
        self.synchronizations.lock().push(synchronization);
        Ok(())
    }
}

/// 测试事务观察者按提交或回滚结果通知
#[test]
fn test_transactional_observers_follow_outcome() {
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer = |identifier: &'static str, phase: TransactionPhase| {
        let log = Arc::clone(&log);
        ObserverMethod::new(
            ObserverMetadata::new(identifier, class("Payment")).with_transaction_phase(phase),
            move |_: &EventContext<'_>| -> Result<(), BoxError> {
                log.lock().push(identifier);
                Ok(())
            },
        )
    };
    let components = Components::new()
        .with_observer(observer("audit", TransactionPhase::InProgress))
        .with_observer(observer("receipt", TransactionPhase::AfterSuccess))
        .with_observer(observer("refund", TransactionPhase::AfterFailure));
    let transaction = Arc::new(TestTransaction::default());
    let registry = ComponentRegistry::build([components]).unwrap();
    let container = DiContainer::builder(registry)
        .with_transaction_hook(Arc::clone(&transaction) as Arc<dyn TransactionHook>)
        .build();
    container.init().unwrap();

    *transaction.active.lock() = true;
    container.fire(&event(1u32), class("Payment"), []).unwrap();
    assert_eq!(log.lock().as_slice(), ["audit"]);
    transaction.complete(TransactionStatus::Committed);
    assert_eq!(log.lock().as_slice(), ["audit", "receipt"]);

    log.lock().clear();
    *transaction.active.lock() = true;
    container.fire(&event(2u32), class("Payment"), []).unwrap();
    transaction.complete(TransactionStatus::RolledBack);
    assert_eq!(log.lock().as_slice(), ["audit", "refund"]);
}

/// 测试自定义作用域上下文，以及为内置作用域注册上下文被拒绝
#[test]
fn test_custom_contexts() {
    let tenant = ScopeKind::Custom("TenantScoped".to_string());
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let container = container(
        Components::new()
            .with_context(Arc::new(SharedContext::new(tenant.clone())))
            .with_component(
                ComponentDefinition::new("tenant-settings", class("TenantSettings"))
                    .with_scope(tenant.clone()),
                factory_fn(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok(instance("acme".to_string()))
                }),
            ),
    );
    let first = container.get::<String>(class("TenantSettings"), []).unwrap();
    let second = container.get::<String>(class("TenantSettings"), []).unwrap();
    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    assert_eq!(container.contexts(&tenant).len(), 1);

    let result = ComponentRegistry::build([Components::new()
        .with_context(Arc::new(SharedContext::new(ScopeKind::Request)))]);
    assert!(matches!(
        result,
        Err(ContainerError::Lifecycle {
            source: LifecycleError::BuiltInScope { .. }
        })
    ));
}
