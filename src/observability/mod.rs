//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，可用 RUST_LOG 覆盖（如 `RUST_LOG=conduit=debug`）。

use tracing_subscriber::{filter::Directive, fmt, prelude::*, util::TryInitError, EnvFilter};

fn filter() -> EnvFilter {
    let default: Directive = tracing::Level::INFO.into();
    EnvFilter::builder()
        .with_default_directive(default)
        .from_env_lossy()
}

/// 安装全局订阅器；已安装时 panic，宿主进程启动时调用一次
pub fn init() {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .init();
}

/// 同 init，但已安装时返回错误（测试与嵌入式宿主可重复调用）
pub fn try_init() -> Result<(), TryInitError> {
    tracing_subscriber::registry()
        .with(filter())
        .with(fmt::layer())
        .try_init()
}
