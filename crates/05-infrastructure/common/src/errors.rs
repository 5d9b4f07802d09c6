//! 错误类型定义

use crate::lifecycle::ScopeKind;
use thiserror::Error;

/// 托管代码（工厂、拦截器、观察者、目标方法）抛出的错误
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 配置错误类型
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("配置文件不存在: {path}")]
    FileNotFound { path: String },

    #[error("配置加载失败: {source}")]
    LoadFailed {
        #[from]
        source: config::ConfigError,
    },

    #[error("配置验证失败: {message}")]
    ValidationError { message: String },
}

/// 上下文生命周期错误类型
#[derive(Error, Debug)]
pub enum LifecycleError {
    #[error("上下文状态已失效, 无法激活: {scope}")]
    InvalidState { scope: ScopeKind },

    #[error("内置作用域不允许注册自定义上下文: {scope}")]
    BuiltInScope { scope: ScopeKind },

    #[error("上下文状态类型不匹配: {scope}")]
    ForeignState { scope: ScopeKind },
}

/// 容器错误类型
#[derive(Error, Debug)]
pub enum ContainerError {
    #[error("依赖解析存在歧义: {required_type} [{qualifiers}], 候选组件: {candidates:?}")]
    AmbiguousResolution {
        required_type: String,
        qualifiers: String,
        candidates: Vec<String>,
    },

    #[error("未找到满足条件的组件: {required_type} [{qualifiers}]")]
    UnsatisfiedResolution {
        required_type: String,
        qualifiers: String,
    },

    #[error("上下文未激活: {scope}")]
    ContextNotActive { scope: ScopeKind },

    #[error("组件实例已销毁: {component}")]
    InstanceDestroyed { component: String },

    #[error("调用失败: {source}")]
    Invocation {
        #[source]
        source: BoxError,
    },

    #[error("{} 个观察者通知失败", .failures.len())]
    ObserverFailures { failures: Vec<BoxError> },

    #[error("容器未运行: {container}")]
    ContainerNotRunning { container: String },

    #[error("作用域存在多个激活的上下文: {scope}, 数量: {count}")]
    MultipleActiveContexts { scope: ScopeKind, count: usize },

    #[error("参数无效: {message}")]
    InvalidArgument { message: String },

    #[error("上下文数据键为保留键, 不可修改: {key}")]
    ReservedContextDataKey { key: String },

    #[error("组件实例类型不匹配: {component}, 期望 {expected}")]
    TypeMismatch { component: String, expected: String },

    #[error("生命周期错误: {source}")]
    Lifecycle {
        #[from]
        source: LifecycleError,
    },
}

impl ContainerError {
    /// 包装托管代码抛出的错误，反射式包装错误会被展开为原因
    pub fn invocation(error: impl Into<BoxError>) -> Self {
        Self::Invocation {
            source: unwrap_invocation_target(error.into()),
        }
    }

    /// 创建参数无效错误
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument {
            message: message.into(),
        }
    }

    /// 取出托管代码抛出的原始错误，其他容器错误原样装箱
    pub fn into_cause(self) -> BoxError {
        match self {
            Self::Invocation { source } => source,
            other => Box::new(other),
        }
    }
}

/// 反射式调用的包装错误，离开拦截器链前会被展开为原因
#[derive(Error, Debug)]
#[error("目标方法调用异常: {source}")]
pub struct InvocationTargetError {
    #[source]
    pub source: BoxError,
}

impl InvocationTargetError {
    /// 包装错误
    pub fn new(source: impl Into<BoxError>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// 逐层展开 [`InvocationTargetError`]，返回最内层的原因
pub fn unwrap_invocation_target(mut error: BoxError) -> BoxError {
    loop {
        match error.downcast::<InvocationTargetError>() {
            Ok(wrapper) => error = wrapper.source,
            Err(cause) => return cause,
        }
    }
}

/// 基础设施错误类型
#[derive(Error, Debug)]
pub enum InfrastructureError {
    #[error("配置错误: {source}")]
    ConfigError {
        #[from]
        source: ConfigError,
    },

    #[error("容器错误: {source}")]
    ContainerError {
        #[from]
        source: ContainerError,
    },

    #[error("基础设施启动失败: {message}")]
    BootstrapFailed { message: String },

    #[error("基础设施关闭失败: {message}")]
    ShutdownFailed { message: String },
}

/// 结果类型别名
pub type ConfigResult<T> = Result<T, ConfigError>;
pub type LifecycleResult<T> = Result<T, LifecycleError>;
pub type ContainerResult<T> = Result<T, ContainerError>;
pub type InfrastructureResult<T> = Result<T, InfrastructureError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Error, Debug)]
    #[error("业务失败")]
    struct BusinessError;

    /// 测试嵌套包装错误被展开为原因
    #[test]
    fn test_unwrap_nested_invocation_target() {
        let wrapped = InvocationTargetError::new(InvocationTargetError::new(BusinessError));
        let error = ContainerError::invocation(wrapped);

        let cause = error.into_cause();
        assert!(cause.downcast_ref::<BusinessError>().is_some());
    }

    /// 测试错误信息
    #[test]
    fn test_error_messages() {
        let error = ContainerError::ContextNotActive {
            scope: ScopeKind::Request,
        };
        assert_eq!(error.to_string(), "上下文未激活: RequestScoped");

        let failures = ContainerError::ObserverFailures {
            failures: vec![Box::new(BusinessError) as BoxError, Box::new(BusinessError)],
        };
        assert_eq!(failures.to_string(), "2 个观察者通知失败");
    }
}
