//! 内存索引：文件列表由调用方直接给出，可注入前 N 次失败以测试重试

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{PoisonError, RwLock};

use async_trait::async_trait;

use crate::core::{EngineError, Result};
use crate::index::{IndexProvider, IndexedFile, ProjectIndex};

#[derive(Debug, Default)]
pub struct InMemoryIndex {
    files: RwLock<Vec<IndexedFile>>,
    failures_left: AtomicUsize,
    calls: AtomicUsize,
}

impl InMemoryIndex {
    pub fn new(files: Vec<IndexedFile>) -> Self {
        Self {
            files: RwLock::new(files),
            ..Self::default()
        }
    }

    /// 前 n 次 get_index 返回 Index 错误
    pub fn with_failures(self, n: usize) -> Self {
        self.failures_left.store(n, Ordering::SeqCst);
        self
    }

    pub fn upsert(&self, file: IndexedFile) {
        let mut files = self.files.write().unwrap_or_else(PoisonError::into_inner);
        match files.iter_mut().find(|f| f.path == file.path) {
            Some(existing) => *existing = file,
            None => files.push(file),
        }
    }

    pub fn remove(&self, path: &str) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|f| f.path != path);
    }

    pub fn clear(&self) {
        self.files
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl IndexProvider for InMemoryIndex {
    async fn get_index(&self, _project_id: &str) -> Result<ProjectIndex> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(EngineError::Index("index temporarily unavailable".to_string()));
        }
        let files = self
            .files
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        Ok(ProjectIndex { files })
    }
}
