//! 进程内共享状态：显式传入各组件的构造函数，而非模块级单例
//!
//! 同一进程可同时存在多个引擎实例，各自持有独立的 EngineContext。

use std::sync::Arc;

use crate::config::EngineConfig;
use crate::context::RecencyTracker;
use crate::core::{ErrorLog, PerformanceTracker};

/// 错误日志、性能追踪、文件访问时间（整个会话累积）
#[derive(Clone)]
pub struct EngineContext {
    pub error_log: Arc<ErrorLog>,
    pub perf: Arc<PerformanceTracker>,
    pub recency: Arc<RecencyTracker>,
}

impl EngineContext {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            error_log: Arc::new(ErrorLog::new(config.engine.error_log_capacity)),
            perf: Arc::new(PerformanceTracker::new(config.engine.metric_capacity)),
            recency: Arc::new(RecencyTracker::new()),
        }
    }
}

impl Default for EngineContext {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
