//! 通用重试：固定间隔或指数退避
//!
//! 取消不会被重试；退避等待期间同样响应取消令牌。只有最后一次失败会返回给调用方，
//! 中间失败仅以 debug 级别记录。

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::core::{EngineError, Result};

/// 重试策略：总尝试次数（含首次）、首次等待、退避倍数（1.0 即固定间隔）
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
    pub backoff: f64,
}

impl RetryPolicy {
    /// 固定间隔
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: 1.0,
        }
    }

    /// 指数退避（每次等待乘以 factor）
    pub fn exponential(max_attempts: u32, delay: Duration, factor: f64) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            delay,
            backoff: factor.max(1.0),
        }
    }

    /// 第 attempt 次失败之后的等待时长（attempt 从 1 开始）
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1) as i32;
        self.delay.mul_f64(self.backoff.powi(exp))
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fixed(2, Duration::from_millis(1000))
    }
}

/// 按策略重试 op；遇到取消或不可重试错误立即返回
pub async fn retry_with_backoff<T, F, Fut>(
    policy: RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt = 1;
    loop {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        match op(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if e.is_cancelled() => return Err(e),
            Err(e) if attempt >= policy.max_attempts || !e.is_retryable() => return Err(e),
            Err(e) => {
                let wait = policy.delay_after(attempt);
                tracing::debug!(
                    operation,
                    attempt,
                    max_attempts = policy.max_attempts,
                    wait_ms = wait.as_millis() as u64,
                    "Attempt failed, retrying: {}",
                    e
                );
                tokio::select! {
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = tokio::time::sleep(wait) => {}
                }
                attempt += 1;
            }
        }
    }
}
