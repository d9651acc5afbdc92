//! 错误日志：追加写入、容量受限的环形缓冲
//!
//! 所有组件把最终失败（重试耗尽后）记录到这里，同时按严重级别镜像到 tracing。
//! 日志只供事后检查，从不影响控制流。

use std::collections::{HashMap, VecDeque};
use std::sync::{PoisonError, RwLock};

use serde::Serialize;

use crate::core::Severity;

/// 默认最多保留的条目数，超出时淘汰最旧的
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 500;

/// 错误发生的位置：组件、操作与附加元数据
#[derive(Debug, Clone, Default, Serialize)]
pub struct ErrorContext {
    pub component: String,
    pub operation: String,
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

impl ErrorContext {
    pub fn new(component: impl Into<String>, operation: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            operation: operation.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// 单条错误记录；recovered 只能由 mark_recovered 显式置为 true
#[derive(Debug, Clone, Serialize)]
pub struct ErrorLogEntry {
    pub id: String,
    pub message: String,
    pub severity: Severity,
    /// 毫秒时间戳
    pub timestamp: i64,
    pub context: ErrorContext,
    pub recovered: bool,
}

/// 各严重级别计数
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ErrorStats {
    pub total: usize,
    pub info: usize,
    pub warning: usize,
    pub error: usize,
    pub critical: usize,
    pub recovered: usize,
}

/// 进程内错误日志（由 EngineContext 持有并注入各组件）
#[derive(Debug)]
pub struct ErrorLog {
    entries: RwLock<VecDeque<ErrorLogEntry>>,
    capacity: usize,
}

impl ErrorLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(VecDeque::new()),
            capacity: capacity.max(1),
        }
    }

    /// 追加一条记录并返回其 id；超出容量时淘汰最旧记录
    pub fn record(
        &self,
        message: impl Into<String>,
        severity: Severity,
        context: ErrorContext,
    ) -> String {
        let entry = ErrorLogEntry {
            id: format!("err_{}", uuid::Uuid::new_v4()),
            message: message.into(),
            severity,
            timestamp: chrono::Utc::now().timestamp_millis(),
            context,
            recovered: false,
        };

        let component = entry.context.component.as_str();
        let operation = entry.context.operation.as_str();
        match severity {
            Severity::Info => {
                tracing::info!(component, operation, "{}", entry.message)
            }
            Severity::Warning => {
                tracing::warn!(component, operation, "{}", entry.message)
            }
            Severity::Error | Severity::Critical => {
                tracing::error!(component, operation, severity = %severity, "{}", entry.message)
            }
        }

        let id = entry.id.clone();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.push_back(entry);
        while entries.len() > self.capacity {
            entries.pop_front();
        }
        id
    }

    pub fn info(&self, message: impl Into<String>, context: ErrorContext) -> String {
        self.record(message, Severity::Info, context)
    }

    pub fn warning(&self, message: impl Into<String>, context: ErrorContext) -> String {
        self.record(message, Severity::Warning, context)
    }

    pub fn error(&self, message: impl Into<String>, context: ErrorContext) -> String {
        self.record(message, Severity::Error, context)
    }

    /// 标记某条记录已恢复；记录已被淘汰或不存在时返回 false
    pub fn mark_recovered(&self, id: &str) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        match entries.iter_mut().find(|e| e.id == id) {
            Some(entry) => {
                entry.recovered = true;
                true
            }
            None => false,
        }
    }

    /// 最近 n 条（新的在后）
    pub fn recent(&self, n: usize) -> Vec<ErrorLogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let skip = entries.len().saturating_sub(n);
        entries.iter().skip(skip).cloned().collect()
    }

    pub fn by_severity(&self, severity: Severity) -> Vec<ErrorLogEntry> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    pub fn stats(&self) -> ErrorStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        let mut stats = ErrorStats {
            total: entries.len(),
            ..ErrorStats::default()
        };
        for e in entries.iter() {
            match e.severity {
                Severity::Info => stats.info += 1,
                Severity::Warning => stats.warning += 1,
                Severity::Error => stats.error += 1,
                Severity::Critical => stats.critical += 1,
            }
            if e.recovered {
                stats.recovered += 1;
            }
        }
        stats
    }

    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for ErrorLog {
    fn default() -> Self {
        Self::new(DEFAULT_ERROR_LOG_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> ErrorContext {
        ErrorContext::new("test", "op")
    }

    #[test]
    fn test_record_starts_unrecovered() {
        let log = ErrorLog::default();
        let id = log.error("boom", ctx());
        let entries = log.recent(10);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
        assert!(!entries[0].recovered);
        assert_eq!(entries[0].severity, Severity::Error);
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let log = ErrorLog::new(3);
        for i in 0..5 {
            log.info(format!("entry {i}"), ctx());
        }
        let entries = log.recent(10);
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0].message, "entry 2");
        assert_eq!(entries[2].message, "entry 4");
    }

    #[test]
    fn test_mark_recovered_is_explicit_and_sticky() {
        let log = ErrorLog::default();
        let id = log.warning("stop unknown", ctx());
        assert!(log.mark_recovered(&id));
        log.error("another", ctx());
        let recovered: Vec<_> = log.recent(10).into_iter().filter(|e| e.recovered).collect();
        assert_eq!(recovered.len(), 1);
        assert!(!log.mark_recovered("err_missing"));
    }

    #[test]
    fn test_stats_and_filter() {
        let log = ErrorLog::default();
        log.info("a", ctx());
        log.warning("b", ctx());
        log.warning("c", ctx().with("request_id", "r1"));
        log.error("d", ctx());
        let stats = log.stats();
        assert_eq!(stats.total, 4);
        assert_eq!(stats.warning, 2);
        assert_eq!(stats.critical, 0);
        assert_eq!(log.by_severity(Severity::Warning).len(), 2);
        log.clear();
        assert!(log.is_empty());
    }
}
