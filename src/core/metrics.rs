//! 性能追踪：按名称启动 / 结束计时，产出耗时指标
//!
//! 只用于观测，不参与控制流；未匹配的 end 返回 None 而不是报错。

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{PoisonError, RwLock};
use std::time::{Duration, Instant};

use serde::Serialize;

pub const DEFAULT_METRIC_CAPACITY: usize = 1000;

/// 计时句柄：由 start 返回，交给 end 结束计时
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TimerId(String);

impl TimerId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// 一次完成的计时
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceMetric {
    pub name: String,
    pub duration_ms: f64,
    /// 结束时的毫秒时间戳
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<serde_json::Value>,
}

/// 按名称聚合的统计
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub name: String,
    pub count: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

struct ActiveTimer {
    name: String,
    started: Instant,
}

/// 性能追踪器（由 EngineContext 持有）
pub struct PerformanceTracker {
    active: RwLock<HashMap<TimerId, ActiveTimer>>,
    completed: RwLock<VecDeque<PerformanceMetric>>,
    capacity: usize,
    next_id: AtomicU64,
}

impl PerformanceTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            active: RwLock::new(HashMap::new()),
            completed: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
            next_id: AtomicU64::new(0),
        }
    }

    pub fn start(&self, name: impl Into<String>) -> TimerId {
        let name = name.into();
        let seq = self.next_id.fetch_add(1, Ordering::Relaxed);
        let id = TimerId(format!("{name}#{seq}"));
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                ActiveTimer {
                    name,
                    started: Instant::now(),
                },
            );
        id
    }

    /// 开始计时并返回守卫：调用 finish 记录指标；未 finish 就被丢弃（如任务被中止）时只移除计时，不记录
    pub fn scoped(&self, name: impl Into<String>) -> ScopedTimer<'_> {
        ScopedTimer {
            tracker: self,
            id: Some(self.start(name)),
        }
    }

    fn discard(&self, id: &TimerId) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id);
    }

    /// 结束计时并记录指标；id 未知（已结束或从未开始）时返回 None
    pub fn end(&self, id: &TimerId, metadata: Option<serde_json::Value>) -> Option<Duration> {
        let timer = self
            .active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)?;
        let elapsed = timer.started.elapsed();
        let metric = PerformanceMetric {
            name: timer.name,
            duration_ms: elapsed.as_secs_f64() * 1000.0,
            timestamp: chrono::Utc::now().timestamp_millis(),
            metadata,
        };
        tracing::debug!(name = %metric.name, duration_ms = metric.duration_ms, "timer");

        let mut completed = self
            .completed
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        completed.push_back(metric);
        while completed.len() > self.capacity {
            completed.pop_front();
        }
        Some(elapsed)
    }

    pub fn metrics(&self, name: &str) -> Vec<PerformanceMetric> {
        self.completed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|m| m.name == name)
            .cloned()
            .collect()
    }

    pub fn average_ms(&self, name: &str) -> Option<f64> {
        let metrics = self.metrics(name);
        if metrics.is_empty() {
            return None;
        }
        Some(metrics.iter().map(|m| m.duration_ms).sum::<f64>() / metrics.len() as f64)
    }

    /// 所有名称的统计，按名称排序
    pub fn summary(&self) -> Vec<MetricSummary> {
        let completed = self.completed.read().unwrap_or_else(PoisonError::into_inner);
        let mut grouped: HashMap<&str, Vec<f64>> = HashMap::new();
        for m in completed.iter() {
            grouped.entry(m.name.as_str()).or_default().push(m.duration_ms);
        }
        let mut out: Vec<MetricSummary> = grouped
            .into_iter()
            .map(|(name, durations)| MetricSummary {
                name: name.to_string(),
                count: durations.len(),
                average_ms: durations.iter().sum::<f64>() / durations.len() as f64,
                min_ms: durations.iter().copied().fold(f64::INFINITY, f64::min),
                max_ms: durations.iter().copied().fold(0.0, f64::max),
            })
            .collect();
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub fn active_timers(&self) -> usize {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn clear(&self) {
        self.active
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.completed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// 由 PerformanceTracker::scoped 返回的计时守卫
pub struct ScopedTimer<'a> {
    tracker: &'a PerformanceTracker,
    id: Option<TimerId>,
}

impl ScopedTimer<'_> {
    pub fn finish(mut self, metadata: Option<serde_json::Value>) -> Option<Duration> {
        let id = self.id.take()?;
        self.tracker.end(&id, metadata)
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            self.tracker.discard(&id);
        }
    }
}

impl Default for PerformanceTracker {
    fn default() -> Self {
        Self::new(DEFAULT_METRIC_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_end_records_metric() {
        let tracker = PerformanceTracker::default();
        let id = tracker.start("chat/request");
        assert_eq!(tracker.active_timers(), 1);
        let elapsed = tracker.end(&id, None);
        assert!(elapsed.is_some());
        assert_eq!(tracker.active_timers(), 0);
        assert_eq!(tracker.metrics("chat/request").len(), 1);
        assert!(tracker.average_ms("chat/request").is_some());
    }

    #[test]
    fn test_end_twice_returns_none() {
        let tracker = PerformanceTracker::default();
        let id = tracker.start("x");
        assert!(tracker.end(&id, None).is_some());
        assert!(tracker.end(&id, None).is_none());
        assert!(tracker.average_ms("missing").is_none());
    }

    #[test]
    fn test_summary_groups_by_name() {
        let tracker = PerformanceTracker::new(10);
        for name in ["b", "a", "a"] {
            let id = tracker.start(name);
            tracker.end(&id, Some(serde_json::json!({"ok": true})));
        }
        let summary = tracker.summary();
        assert_eq!(summary.len(), 2);
        assert_eq!(summary[0].name, "a");
        assert_eq!(summary[0].count, 2);
        assert!(summary[0].min_ms <= summary[0].max_ms);
    }

    #[test]
    fn test_scoped_timer_finish_and_drop() {
        let tracker = PerformanceTracker::default();
        let timer = tracker.scoped("finished");
        assert_eq!(tracker.active_timers(), 1);
        assert!(timer.finish(None).is_some());
        assert_eq!(tracker.metrics("finished").len(), 1);

        let timer = tracker.scoped("abandoned");
        assert_eq!(tracker.active_timers(), 1);
        drop(timer);
        assert_eq!(tracker.active_timers(), 0);
        assert!(tracker.metrics("abandoned").is_empty());
    }

    #[tokio::test]
    async fn test_aborted_task_releases_timer() {
        let tracker = std::sync::Arc::new(PerformanceTracker::default());
        let handle = tokio::spawn({
            let tracker = tracker.clone();
            async move {
                let _timer = tracker.scoped("dispatch");
                std::future::pending::<()>().await;
            }
        });
        while tracker.active_timers() == 0 {
            tokio::task::yield_now().await;
        }
        handle.abort();
        assert!(handle.await.unwrap_err().is_cancelled());
        assert_eq!(tracker.active_timers(), 0);
    }

    #[test]
    fn test_capacity_is_bounded() {
        let tracker = PerformanceTracker::new(2);
        for _ in 0..5 {
            let id = tracker.start("t");
            tracker.end(&id, None);
        }
        assert_eq!(tracker.metrics("t").len(), 2);
        tracker.clear();
        assert!(tracker.summary().is_empty());
    }
}
