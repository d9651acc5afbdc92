//! 核心层：错误分类与错误日志、重试、性能追踪、token 估算、共享上下文

pub mod error;
pub mod error_log;
pub mod metrics;
pub mod retry;
pub mod shared;
pub mod tokens;

pub use error::{EngineError, Result, Severity};
pub use error_log::{ErrorContext, ErrorLog, ErrorLogEntry, ErrorStats};
pub use metrics::{MetricSummary, PerformanceMetric, PerformanceTracker, ScopedTimer, TimerId};
pub use retry::{retry_with_backoff, RetryPolicy};
pub use shared::EngineContext;
pub use tokens::{estimate_tokens, estimate_tokens_for_words, word_count};
