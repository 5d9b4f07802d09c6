//! # 示例应用程序
//!
//! 演示容器的主要能力：作用域、依赖注入、装饰器、拦截器、同步/异步/事务观察者。

use anyhow::Context;
use clap::Parser;
use di_abstractions::{
    factory_fn, instance, value, Components, DecoratorDefinition, EventContext, Instance,
    InterceptorDefinition, InvocationContext, ManagedContext, ObserverMethod, Synchronization,
    TransactionHook, TransactionStatus,
};
use di_impl::{EventPublisher, EVENT_TYPE};
use infrastructure_common::{
    BoxError, ComponentDefinition, ContainerError, DecoratorMetadata, InterceptionKind,
    InterceptorMetadata, MethodDescriptor, ObserverMetadata, Qualifier, ScopeKind,
    TransactionPhase, TypeDescriptor,
};
use infrastructure_composition::{ContainerBootstrapper, FnComponentsProvider, LoggingConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 命令行参数
#[derive(Parser, Debug)]
#[command(name = "example-app")]
#[command(about = "依赖注入容器示例应用")]
struct Args {
    /// 配置文件路径
    #[arg(short, long)]
    config: Option<String>,

    /// 日志过滤表达式
    #[arg(long, default_value = "info")]
    log_level: String,

    /// 下单数量
    #[arg(long, default_value_t = 2)]
    orders: u32,

    /// 事务结果：提交或回滚
    #[arg(long)]
    rollback: bool,
}

#[derive(Debug, Clone)]
struct OrderPlaced {
    id: u32,
    total: u64,
}

/// 库存，应用作用域
#[derive(Default)]
struct Inventory {
    reserved: Mutex<HashMap<u32, u64>>,
}

/// 购物车，请求作用域
#[derive(Default)]
struct Cart {
    items: Mutex<Vec<(String, u64)>>,
}

trait PriceCalculator: Send + Sync {
    fn total(&self, items: &[(String, u64)]) -> u64;
}

struct SimpleCalculator;

impl PriceCalculator for SimpleCalculator {
    fn total(&self, items: &[(String, u64)]) -> u64 {
        items.iter().map(|(_, price)| price).sum()
    }
}

/// 满额折扣装饰器
struct DiscountCalculator {
    delegate: Arc<Box<dyn PriceCalculator>>,
}

impl PriceCalculator for DiscountCalculator {
    fn total(&self, items: &[(String, u64)]) -> u64 {
        let total = self.delegate.total(items);
        if total >= 100 {
            total - total / 10
        } else {
            total
        }
    }
}

/// 内存事务：提交时依次调用已登记的同步回调
#[derive(Default)]
struct UnitOfWork {
    active: Mutex<bool>,
    synchronizations: Mutex<Vec<Arc<dyn Synchronization>>>,
}

impl UnitOfWork {
    fn begin(&self) {
        *self.active.lock() = true;
    }

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

impl TransactionHook for UnitOfWork {
    fn is_active(&self) -> bool {
        *self.active.lock()
    }

    fn register_synchronization(&self, synchronization: Arc<dyn Synchronization>) -> Result<(), BoxError> {
        self.synchronizations.lock().push(synchronization);
        Ok(())
    }
}

fn class(name: &str) -> TypeDescriptor {
    TypeDescriptor::class(name)
}

fn calculator_instance(calculator: impl PriceCalculator + 'static) -> Instance {
    let boxed: Box<dyn PriceCalculator> = Box::new(calculator);
    instance(boxed)
}

/// 示例应用的组件
fn shop_components() -> Components {
    Components::new()
        .with_component(
            ComponentDefinition::new("inventory", class("Inventory")).with_scope(ScopeKind::Application),
            factory_fn(|_| Ok(instance(Inventory::default()))),
        )
        .with_component(
            ComponentDefinition::new("cart", class("Cart")).with_scope(ScopeKind::Request),
            factory_fn(|_| Ok(instance(Cart::default()))),
        )
        .with_component(
            ComponentDefinition::new("calculator", class("SimpleCalculator"))
                .with_type(class("PriceCalculator")),
            factory_fn(|_| Ok(calculator_instance(SimpleCalculator))),
        )
        .with_decorator(DecoratorDefinition::new(
            ComponentDefinition::new("discount", class("DiscountCalculator")),
            factory_fn(|ctx| {
                let delegate = ctx
                    .decorator_delegate()
                    .and_then(|delegate| delegate.downcast::<Box<dyn PriceCalculator>>().ok())
                    .ok_or_else(|| ContainerError::invalid_argument("折扣装饰器缺少委托"))?;
                Ok(calculator_instance(DiscountCalculator { delegate }))
            }),
            DecoratorMetadata::new("discount", class("PriceCalculator"), 10),
        ))
        .with_interceptor(
            InterceptorDefinition::new(
                ComponentDefinition::new("audit", class("AuditInterceptor")),
                factory_fn(|_| Ok(instance(()))),
                InterceptorMetadata::new("audit", 100).with_binding(Qualifier::new("Audited")),
            )
            .with_callback(
                InterceptionKind::AroundInvoke,
                |_: &Instance, context: &mut InvocationContext<'_>| {
                    let method = context.method().map(|m| m.name.clone()).unwrap_or_default();
                    info!("审计: 调用 {}", method);
                    let result = context.proceed();
                    info!("审计: {} 完成, 成功: {}", method, result.is_ok());
                    result
                },
            ),
        )
        .with_observer(ObserverMethod::new(
            ObserverMetadata::new("mailer", class("OrderPlaced")),
            |ctx: &EventContext<'_>| -> Result<(), BoxError> {
                if let Some(order) = ctx.event::<OrderPlaced>() {
                    info!("发送订单确认邮件: 订单 {}, 金额 {}", order.id, order.total);
                }
                Ok(())
            },
        ))
        .with_observer(ObserverMethod::new(
            ObserverMetadata::new("ledger", class("OrderPlaced"))
                .with_transaction_phase(TransactionPhase::AfterSuccess),
            |ctx: &EventContext<'_>| -> Result<(), BoxError> {
                if let Some(order) = ctx.event::<OrderPlaced>() {
                    info!("事务提交后记账: 订单 {}", order.id);
                }
                Ok(())
            },
        ))
        .with_observer(ObserverMethod::new(
            ObserverMetadata::new("analytics", class("OrderPlaced")).asynchronous(),
            |ctx: &EventContext<'_>| -> Result<(), BoxError> {
                if let Some(order) = ctx.event::<OrderPlaced>() {
                    info!("异步统计订单: {}", order.id);
                }
                Ok(())
            },
        ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let unit_of_work = Arc::new(UnitOfWork::default());
    let mut bootstrapper = ContainerBootstrapper::new()
        .with_name("example-app")
        .with_logging(LoggingConfig::default().with_filter(args.log_level.clone()))
        .add_provider(FnComponentsProvider::new("shop", shop_components))
        .with_transaction_hook(Arc::clone(&unit_of_work) as Arc<dyn TransactionHook>)
        .with_runtime(tokio::runtime::Handle::current());
    if let Some(config) = &args.config {
        bootstrapper = bootstrapper.with_config_file(config);
    }
    let runtime = bootstrapper.bootstrap().context("容器启动失败")?;
    let container = runtime.container().clone();
    info!("容器已启动, 组件数: {}", runtime.metrics().registered_components_count);

    let publisher_type = TypeDescriptor::parameterized(EVENT_TYPE, [class("OrderPlaced")]);
    let cart = container.client_proxy::<Cart>(class("Cart"), [])?;
    let inventory = container.get::<Inventory>(class("Inventory"), [])?;
    let calculator = container.get::<Box<dyn PriceCalculator>>(class("PriceCalculator"), [])?;
    let publisher = container
        .get::<EventPublisher>(publisher_type, [])
        .context("获取订单事件发布者失败")?;
    let audit = container.build_chain(
        InterceptionKind::AroundInvoke,
        &[Qualifier::new("Audited")].into_iter().collect(),
    )?;
    let place_order = MethodDescriptor::new(class("OrderService"), "place_order");

    for id in 1..=args.orders {
        let request = container.request_context();
        request.activate(None).context("激活请求上下文失败")?;

        cart.with(|cart| {
            let mut items = cart.items.lock();
            items.push(("book".to_string(), 45 * u64::from(id)));
            items.push(("pen".to_string(), 15));
        })?;

        let total = container.invoke(
            &audit,
            instance(()),
            &place_order,
            Vec::new(),
            |_: &mut InvocationContext<'_>| -> Result<di_abstractions::Value, ContainerError> {
                let items = cart.with(|cart| cart.items.lock().clone())?;
                Ok(value(calculator.total(&items)))
            },
        )?;
        let total = total.downcast::<u64>().map(|total| *total).unwrap_or_default();
        inventory.reserved.lock().insert(id, total);

        unit_of_work.begin();
        let order = OrderPlaced { id, total };
        publisher.fire(order.clone())?;
        if args.rollback {
            warn!("回滚订单事务: {}", id);
            unit_of_work.complete(TransactionStatus::RolledBack);
        } else {
            unit_of_work.complete(TransactionStatus::Committed);
        }
        publisher.fire_async(order).await?;

        request.terminate();
    }

    audit.release();
    info!("已预留订单数: {}", inventory.reserved.lock().len());
    runtime.shutdown();
    info!("应用已关闭");
    Ok(())
}
