//! 流式管线：调用补全后端，再把结果逐词推送为 streaming/token
//!
//! 每个挂起点（后端调用、词间停顿）以及每次发送前都检查取消令牌；
//! 取消后不再发送任何事件，返回 EngineError::Cancelled。

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures_util::StreamExt;
use tokio_util::sync::CancellationToken;

use crate::core::{estimate_tokens_for_words, EngineError, Result};
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::protocol::{
    ChatMessage, EventSink, OutboundPayload, StreamingCompleteData, StreamingTokenData,
};

use super::simulate::simulated_token_stream;

/// 单次流式生成的输入
#[derive(Debug, Clone)]
pub struct StreamRequest {
    pub request_id: String,
    pub message: String,
    /// 作为 system 指令放在 history 之前
    pub context: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub history: Vec<ChatMessage>,
    pub cancel: CancellationToken,
}

impl StreamRequest {
    fn to_completion(&self) -> CompletionRequest {
        let mut history = Vec::with_capacity(self.history.len() + 1);
        if let Some(context) = self.context.as_deref().filter(|c| !c.trim().is_empty()) {
            history.push(ChatMessage::system(format!(
                "Use the following context to answer:\n\n{context}"
            )));
        }
        history.extend(self.history.iter().cloned());
        CompletionRequest::new(self.message.clone(), self.model.clone())
            .with_history(history)
            .with_temperature(self.temperature)
    }
}

pub struct StreamingPipeline {
    provider: Arc<dyn CompletionProvider>,
    sink: EventSink,
    word_delay: Duration,
}

impl StreamingPipeline {
    pub fn new(provider: Arc<dyn CompletionProvider>, sink: EventSink, word_delay: Duration) -> Self {
        Self {
            provider,
            sink,
            word_delay,
        }
    }

    /// 生成并推送一次回复；成功时返回已发送的 streaming/complete 数据
    pub async fn stream_response(&self, request: &StreamRequest) -> Result<StreamingCompleteData> {
        let cancel = &request.cancel;
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let started = Instant::now();
        let full_text = self
            .provider
            .complete(&request.to_completion(), cancel)
            .await?;

        let mut tokens = simulated_token_stream(&full_text, self.word_delay);
        let mut accumulated = String::with_capacity(full_text.len());
        let mut words = 0usize;

        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                item = tokens.next() => item,
            };
            let Some(token) = next else { break };
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }

            if !accumulated.is_empty() {
                accumulated.push(' ');
            }
            accumulated.push_str(&token);
            words += 1;

            self.sink
                .emit(OutboundPayload::StreamingToken(StreamingTokenData {
                    request_id: request.request_id.clone(),
                    token,
                    accumulated: accumulated.clone(),
                }));
        }

        let complete = StreamingCompleteData {
            request_id: request.request_id.clone(),
            full_text,
            token_count: estimate_tokens_for_words(words),
            duration_ms: started.elapsed().as_millis() as u64,
        };
        self.sink
            .emit(OutboundPayload::StreamingComplete(complete.clone()));
        tracing::debug!(
            request_id = %request.request_id,
            provider = self.provider.name(),
            words,
            duration_ms = complete.duration_ms,
            "Stream complete"
        );
        Ok(complete)
    }
}
