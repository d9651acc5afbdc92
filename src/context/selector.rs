//! 上下文选择器：按相关度排序项目文件，在文件数与 token 预算内贪心挑选
//!
//! 流程：
//! 1. 通过 IndexProvider 获取项目全部文件（指数退避重试）
//! 2. 对每个文件打分（见 scoring），访问过的文件排序时额外加成
//! 3. 稳定排序后贪心选取：达到 maxFiles 即停止；单个文件超出剩余预算则跳过，不截断
//!
//! 请求未带 maxFiles / maxTokens 时使用配置 [context] 段的默认值。
//!
//! 选中文件的内容按路径缓存，`ide/file-edit` 时失效。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ContextSection;
use crate::core::{
    estimate_tokens, retry_with_backoff, EngineContext, EngineError, ErrorContext, Result,
    RetryPolicy,
};
use crate::index::{IndexProvider, IndexedFile};
use crate::protocol::{ContextFile, ContextRequestData};

use super::scoring::{extract_keywords, relevance_score, RECENCY_BONUS};

/// 一组上下文文件的估算 token 总数
pub fn total_tokens(files: &[ContextFile]) -> usize {
    files.iter().map(|f| estimate_tokens(&f.content)).sum()
}

pub struct ContextSelector {
    index: Arc<dyn IndexProvider>,
    ctx: EngineContext,
    project_id: String,
    retry: RetryPolicy,
    default_max_files: usize,
    default_max_tokens: usize,
    /// path -> 最近一次被选中时的内容
    content_cache: RwLock<HashMap<String, String>>,
}

impl ContextSelector {
    pub fn new(
        index: Arc<dyn IndexProvider>,
        ctx: EngineContext,
        project_id: impl Into<String>,
        config: &ContextSection,
    ) -> Self {
        Self {
            index,
            ctx,
            project_id: project_id.into(),
            retry: config.index_retry_policy(),
            default_max_files: config.max_files,
            default_max_tokens: config.max_tokens,
            content_cache: RwLock::new(HashMap::new()),
        }
    }

    pub async fn select_relevant_files(
        &self,
        request: &ContextRequestData,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContextFile>> {
        let timer = self.ctx.perf.scoped("context.select");
        let result = self.select_inner(request, cancel).await;
        timer.finish(Some(serde_json::json!({
            "requestId": request.request_id,
            "selected": result.as_ref().map(|f| f.len()).unwrap_or(0),
        })));
        result
    }

    async fn select_inner(
        &self,
        request: &ContextRequestData,
        cancel: &CancellationToken,
    ) -> Result<Vec<ContextFile>> {
        let index = retry_with_backoff(self.retry, cancel, "context.get_index", |_| {
            self.index.get_index(&self.project_id)
        })
        .await
        .map_err(|e| {
            if !e.is_cancelled() {
                self.ctx.error_log.error(
                    format!("Failed to fetch project index: {e}"),
                    ErrorContext::new("ContextSelector", "select_relevant_files")
                        .with("requestId", request.request_id.clone())
                        .with("projectId", self.project_id.clone()),
                );
            }
            e
        })?;

        if index.files.is_empty() {
            tracing::debug!(request_id = %request.request_id, "Project index is empty");
            return Ok(Vec::new());
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let selected = self.rank_and_select(
            &request.query,
            index.files,
            request.max_files.unwrap_or(self.default_max_files),
            request.max_tokens.unwrap_or(self.default_max_tokens),
        );

        {
            let mut cache = self.content_cache.write().await;
            for file in &selected {
                cache.insert(file.path.clone(), file.content.clone());
            }
        }

        tracing::info!(
            request_id = %request.request_id,
            selected = selected.len(),
            total_tokens = total_tokens(&selected),
            "Context selected"
        );
        Ok(selected)
    }

    fn rank_and_select(
        &self,
        query: &str,
        files: Vec<IndexedFile>,
        max_files: usize,
        max_tokens: usize,
    ) -> Vec<ContextFile> {
        let keywords = extract_keywords(query);

        let mut ranked: Vec<(ContextFile, f64)> = files
            .into_iter()
            .map(|file| {
                let score = relevance_score(query, &keywords, &file.path, &file.content);
                let last_accessed = self.ctx.recency.last_accessed(&file.path);
                let sort_key = score + if last_accessed.is_some() { RECENCY_BONUS } else { 0.0 };
                (
                    ContextFile {
                        path: file.path,
                        content: file.content,
                        relevance_score: score,
                        last_accessed_timestamp: last_accessed,
                    },
                    sort_key,
                )
            })
            .collect();

        // sort_by 是稳定排序：同分文件保持索引顺序
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut selected = Vec::new();
        let mut used = 0usize;
        for (file, _) in ranked {
            if selected.len() >= max_files {
                break;
            }
            let cost = estimate_tokens(&file.content);
            if used + cost > max_tokens {
                continue;
            }
            used += cost;
            selected.push(file);
        }
        selected
    }

    /// 记录一次文件访问（ide/file-open、ide/file-edit）
    pub fn track_file_access(&self, path: &str) -> i64 {
        self.ctx.recency.track(path)
    }

    /// 丢弃某个文件的缓存内容，返回是否存在
    pub async fn invalidate(&self, path: &str) -> bool {
        self.content_cache.write().await.remove(path).is_some()
    }

    pub async fn cached_content(&self, path: &str) -> Option<String> {
        self.content_cache.read().await.get(path).cloned()
    }

    /// 清空访问记录与内容缓存
    pub async fn clear_cache(&self) {
        self.ctx.recency.clear();
        self.content_cache.write().await.clear();
    }
}
