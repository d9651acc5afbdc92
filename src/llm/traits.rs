//! 补全后端抽象
//!
//! 本地或远程模型服务都只通过 CompletionProvider 接入引擎；取消时必须返回 EngineError::Cancelled，
//! 以便与普通失败区分。

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::core::Result;
use crate::protocol::ChatMessage;

/// 一次补全请求
#[derive(Debug, Clone, PartialEq)]
pub struct CompletionRequest {
    pub prompt: String,
    pub model: String,
    /// 先于 prompt 的对话（可含 system 指令）
    pub history: Vec<ChatMessage>,
    pub temperature: Option<f32>,
}

impl CompletionRequest {
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            history: Vec::new(),
            temperature: None,
        }
    }

    pub fn with_history(mut self, history: Vec<ChatMessage>) -> Self {
        self.history = history;
        self
    }

    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }
}

/// 补全后端 trait：返回完整文本，支持协作式取消
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    /// 后端名称（日志用）
    fn name(&self) -> &str {
        "provider"
    }

    async fn complete(
        &self,
        request: &CompletionRequest,
        cancel: &CancellationToken,
    ) -> Result<String>;
}
