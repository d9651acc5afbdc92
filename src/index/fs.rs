//! 文件系统索引：遍历项目根目录，按 glob 过滤文件名，读取文本内容
//!
//! 跳过隐藏目录、target、node_modules；超出大小上限或非 UTF-8 的文件直接忽略。

use std::path::{Path, PathBuf};

use async_trait::async_trait;

use crate::core::{EngineError, Result};
use crate::index::{IndexProvider, IndexedFile, ProjectIndex};

const DEFAULT_MAX_FILE_BYTES: u64 = 256 * 1024;
const DEFAULT_MAX_DEPTH: usize = 12;

#[derive(Debug, Clone)]
pub struct FsIndexProvider {
    root: PathBuf,
    include: Vec<glob::Pattern>,
    max_file_bytes: u64,
    max_depth: usize,
}

impl FsIndexProvider {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            include: Vec::new(),
            max_file_bytes: DEFAULT_MAX_FILE_BYTES,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    /// 只收录文件名匹配任一模式的文件（如 "*.rs"、"*.tsx"）；未设置时收录全部
    pub fn with_include(mut self, patterns: &[&str]) -> Result<Self> {
        for p in patterns {
            let pattern = glob::Pattern::new(p)
                .map_err(|e| EngineError::Config(format!("invalid include pattern {p:?}: {e}")))?;
            self.include.push(pattern);
        }
        Ok(self)
    }

    pub fn with_max_file_bytes(mut self, bytes: u64) -> Self {
        self.max_file_bytes = bytes;
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn scan(&self) -> Result<Vec<IndexedFile>> {
        if !self.root.is_dir() {
            return Err(EngineError::Index(format!(
                "project root is not a directory: {}",
                self.root.display()
            )));
        }

        let mut files = Vec::new();
        for entry in walkdir::WalkDir::new(&self.root)
            .max_depth(self.max_depth)
            .into_iter()
            .filter_entry(|e| {
                // 根目录本身可能是隐藏目录（如临时目录），只过滤子项
                if e.depth() == 0 {
                    return true;
                }
                let name = e.file_name().to_string_lossy();
                !name.starts_with('.') && name != "target" && name != "node_modules"
            })
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }

            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(_) => continue,
            };
            if metadata.len() > self.max_file_bytes {
                continue;
            }

            let path = entry.path();
            if !self.include.is_empty() {
                let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or("");
                if !self.include.iter().any(|p| p.matches(file_name)) {
                    continue;
                }
            }

            let content = match std::fs::read_to_string(path) {
                Ok(c) => c,
                Err(e) => {
                    tracing::debug!(path = %path.display(), "Skipping unreadable file: {}", e);
                    continue;
                }
            };

            let last_modified = metadata
                .modified()
                .ok()
                .and_then(|t| t.duration_since(std::time::UNIX_EPOCH).ok())
                .map(|d| d.as_millis() as i64)
                .unwrap_or(0);

            let relative = path.strip_prefix(&self.root).unwrap_or(path);
            files.push(IndexedFile {
                path: relative.to_string_lossy().replace('\\', "/"),
                content,
                last_modified,
            });
        }

        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }
}

#[async_trait]
impl IndexProvider for FsIndexProvider {
    async fn get_index(&self, project_id: &str) -> Result<ProjectIndex> {
        let scanner = self.clone();
        let files = tokio::task::spawn_blocking(move || scanner.scan())
            .await
            .map_err(|e| EngineError::Index(format!("index scan task failed: {e}")))??;
        tracing::debug!(project_id, files = files.len(), "Project indexed");
        Ok(ProjectIndex { files })
    }
}
