//! 进程级容器访问
//!
//! 只有显式 [`init`] 之后才能通过 [`container`] 取得容器，[`shutdown`] 关闭并移除它。

use crate::container::DiContainer;
use infrastructure_common::{ContainerError, ContainerResult};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use tracing::{info, warn};

const GLOBAL_CONTAINER: &str = "global";

static CONTAINER: Lazy<RwLock<Option<DiContainer>>> = Lazy::new(|| RwLock::new(None));

/// 安装进程级容器，返回被替换的旧容器
pub fn init(container: DiContainer) -> Option<DiContainer> {
    info!("安装全局容器: {}", container.name());
    let previous = CONTAINER.write().replace(container);
    if let Some(previous) = &previous {
        warn!("全局容器被替换: {}", previous.name());
    }
    previous
}

/// 当前进程级容器
pub fn container() -> ContainerResult<DiContainer> {
    CONTAINER
        .read()
        .clone()
        .ok_or_else(|| ContainerError::ContainerNotRunning {
            container: GLOBAL_CONTAINER.to_string(),
        })
}

pub fn is_initialized() -> bool {
    CONTAINER.read().is_some()
}

/// 关闭并移除进程级容器
pub fn shutdown() {
    let container = CONTAINER.write().take();
    if let Some(container) = container {
        container.shutdown();
    }
}
