//! 文件访问记录：path -> 最近访问时间（毫秒）
//!
//! 整个会话累积，只影响之后的查询排序。

use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Debug, Default)]
pub struct RecencyTracker {
    accessed: RwLock<HashMap<String, i64>>,
}

impl RecencyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录当前时间为该文件的最近访问时间，返回记录的时间戳
    pub fn track(&self, path: impl Into<String>) -> i64 {
        let now = chrono::Utc::now().timestamp_millis();
        self.accessed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(path.into(), now);
        now
    }

    pub fn last_accessed(&self, path: &str) -> Option<i64> {
        self.accessed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(path)
            .copied()
    }

    pub fn len(&self) -> usize {
        self.accessed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.accessed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}
