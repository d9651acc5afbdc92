//! 项目索引抽象：提供某个项目下全部已索引文件的原始内容

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::Result;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexedFile {
    pub path: String,
    pub content: String,
    /// 毫秒时间戳
    pub last_modified: i64,
}

impl IndexedFile {
    pub fn new(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content: content.into(),
            last_modified: 0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProjectIndex {
    pub files: Vec<IndexedFile>,
}

#[async_trait]
pub trait IndexProvider: Send + Sync {
    async fn get_index(&self, project_id: &str) -> Result<ProjectIndex>;
}
