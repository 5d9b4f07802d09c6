//! 已启动的容器运行时

use di_impl::{global, DiContainer};
use infrastructure_common::ContainerConfig;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

/// 运行状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RuntimeStatus {
    /// 运行中
    Running,
    /// 已停止
    Stopped,
}

/// 运行时统计信息
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeMetrics {
    /// 启动时间
    pub start_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 停止时间
    pub stop_time: Option<chrono::DateTime<chrono::Utc>>,
    /// 注册表中的组件数量（含内置组件）
    pub registered_components_count: usize,
    /// 注册表内容提供者数量
    pub providers_count: usize,
}

impl Default for RuntimeMetrics {
    fn default() -> Self {
        Self {
            start_time: None,
            stop_time: None,
            registered_components_count: 0,
            providers_count: 0,
        }
    }
}

impl RuntimeMetrics {
    /// 计算运行时间
    pub fn uptime(&self) -> Option<chrono::Duration> {
        match (self.start_time, self.stop_time) {
            (Some(start), Some(stop)) => Some(stop - start),
            (Some(start), None) => Some(chrono::Utc::now() - start),
            _ => None,
        }
    }
}

/// 容器运行时
///
/// 由 [`ContainerBootstrapper`](crate::ContainerBootstrapper) 创建，持有已初始化的容器。
pub struct Runtime {
    container: DiContainer,
    config: ContainerConfig,
    global: bool,
    status: RwLock<RuntimeStatus>,
    metrics: RwLock<RuntimeMetrics>,
}

impl Runtime {
    pub(crate) fn new(
        container: DiContainer,
        config: ContainerConfig,
        global: bool,
        providers_count: usize,
    ) -> Self {
        let metrics = RuntimeMetrics {
            start_time: Some(chrono::Utc::now()),
            registered_components_count: container.registry().components().len(),
            providers_count,
            ..RuntimeMetrics::default()
        };
        Self {
            container,
            config,
            global,
            status: RwLock::new(RuntimeStatus::Running),
            metrics: RwLock::new(metrics),
        }
    }

    pub fn container(&self) -> &DiContainer {
        &self.container
    }

    pub fn config(&self) -> &ContainerConfig {
        &self.config
    }

    /// 是否安装为进程级容器
    pub fn is_global(&self) -> bool {
        self.global
    }

    pub fn status(&self) -> RuntimeStatus {
        *self.status.read()
    }

    pub fn metrics(&self) -> RuntimeMetrics {
        self.metrics.read().clone()
    }

    /// 关闭容器；安装为进程级容器时一并移除
    pub fn shutdown(&self) {
        let mut status = self.status.write();
        if *status == RuntimeStatus::Stopped {
            return;
        }
        info!("停止容器运行时: {}", self.container.name());

        if self.global {
            global::shutdown();
        }
        self.container.shutdown();

        *status = RuntimeStatus::Stopped;
        self.metrics.write().stop_time = Some(chrono::Utc::now());
        info!("容器运行时已停止");
    }
}

impl std::fmt::Debug for Runtime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Runtime")
            .field("container", &self.container)
            .field("global", &self.global)
            .field("status", &self.status())
            .finish()
    }
}
