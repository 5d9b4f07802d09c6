//! 注册表内容提供者

use di_abstractions::Components;

/// 注册表内容提供者
///
/// 每个提供者贡献一组组件、拦截器、装饰器、观察者与上下文，
/// 启动器在构建注册表时合并所有提供者的贡献。
pub trait ComponentsProvider: Send + Sync {
    /// 提供者名称，用于日志
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// 提供注册表内容
    fn components(&self) -> Components;
}

/// 以闭包实现的提供者
pub struct FnComponentsProvider<F> {
    name: String,
    provide: F,
}

impl<F> FnComponentsProvider<F>
where
    F: Fn() -> Components + Send + Sync,
{
    pub fn new(name: impl Into<String>, provide: F) -> Self {
        Self {
            name: name.into(),
            provide,
        }
    }
}

impl<F> ComponentsProvider for FnComponentsProvider<F>
where
    F: Fn() -> Components + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> Components {
        (self.provide)()
    }
}
