//! 对话请求管理：每个 requestId 一个取消令牌
//!
//! 令牌只由 stop_generation / cleanup 取消，管线在每个挂起点读取它。
//! 无论成功、取消还是失败，请求结束时令牌都会从表中移除。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::ChatSection;
use crate::core::{retry_with_backoff, EngineContext, ErrorContext, RetryPolicy};
use crate::protocol::{
    new_id, ChatRegenerateData, ChatRequestData, EventSink, OutboundPayload,
    StreamingCompleteData, StreamingErrorData, StreamingStartData,
};
use crate::streaming::{StreamRequest, StreamingPipeline};

/// 一次对话请求的结局
#[derive(Debug, Clone, PartialEq)]
pub enum ChatOutcome {
    Completed(StreamingCompleteData),
    /// 被 stop / cleanup 取消，未发送 streaming/error
    Cancelled,
    /// 已发送 streaming/error
    Failed(String),
}

struct ActiveRequest {
    generation: u64,
    token: CancellationToken,
}

pub struct RequestManager {
    pipeline: StreamingPipeline,
    ctx: EngineContext,
    sink: EventSink,
    retry: RetryPolicy,
    default_model: String,
    default_temperature: Option<f32>,
    active: RwLock<HashMap<String, ActiveRequest>>,
    generation: AtomicU64,
}

impl RequestManager {
    pub fn new(
        pipeline: StreamingPipeline,
        ctx: EngineContext,
        sink: EventSink,
        config: &ChatSection,
    ) -> Self {
        Self {
            pipeline,
            ctx,
            sink,
            retry: config.retry_policy(),
            default_model: config.default_model.clone(),
            default_temperature: config.temperature,
            active: RwLock::new(HashMap::new()),
            generation: AtomicU64::new(0),
        }
    }

    /// 注册令牌；同一 requestId 仍在进行时，旧请求被取消并替换
    async fn register(&self, request_id: &str) -> (u64, CancellationToken) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed);
        let token = CancellationToken::new();
        let previous = self.active.write().await.insert(
            request_id.to_string(),
            ActiveRequest {
                generation,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            tracing::warn!(request_id, "Duplicate requestId, cancelling previous request");
            previous.token.cancel();
        }
        (generation, token)
    }

    /// 只移除自己注册的那一项（可能已被同名新请求替换）
    async fn unregister(&self, request_id: &str, generation: u64) {
        let mut active = self.active.write().await;
        if active
            .get(request_id)
            .is_some_and(|a| a.generation == generation)
        {
            active.remove(request_id);
        }
    }

    pub async fn handle_chat_request(&self, data: ChatRequestData) -> ChatOutcome {
        let request_id = data.request_id.clone();
        let (generation, token) = self.register(&request_id).await;

        self.sink
            .emit(OutboundPayload::StreamingStart(StreamingStartData {
                request_id: request_id.clone(),
            }));

        let request = StreamRequest {
            request_id: request_id.clone(),
            message: data.message,
            context: data.context,
            model: data.model.unwrap_or_else(|| self.default_model.clone()),
            temperature: data.temperature.or(self.default_temperature),
            history: data.history,
            cancel: token.clone(),
        };

        let result = retry_with_backoff(self.retry, &token, "chat.stream_response", |attempt| {
            if attempt > 1 {
                tracing::info!(request_id = %request.request_id, attempt, "Retrying chat request");
            }
            self.pipeline.stream_response(&request)
        })
        .await;

        self.unregister(&request_id, generation).await;

        match result {
            Ok(complete) => ChatOutcome::Completed(complete),
            Err(e) if e.is_cancelled() => {
                tracing::info!(request_id = %request_id, "Chat request cancelled");
                ChatOutcome::Cancelled
            }
            Err(e) => {
                let message = e.to_string();
                self.ctx.error_log.error(
                    message.clone(),
                    ErrorContext::new("RequestManager", "handle_chat_request")
                        .with("requestId", request_id.clone())
                        .with("model", request.model.clone()),
                );
                self.sink
                    .emit(OutboundPayload::StreamingError(StreamingErrorData {
                        request_id,
                        error: message.clone(),
                        stack: e.stack(),
                    }));
                ChatOutcome::Failed(message)
            }
        }
    }

    /// 取消并移除；未知或已结束的 requestId 只记录 warning，返回 false
    pub async fn stop_generation(&self, request_id: &str) -> bool {
        let removed = self.active.write().await.remove(request_id);
        match removed {
            Some(active) => {
                active.token.cancel();
                tracing::info!(request_id, "Generation stopped");
                true
            }
            None => {
                self.ctx.error_log.warning(
                    format!("No active request to stop: {request_id}"),
                    ErrorContext::new("RequestManager", "stop_generation")
                        .with("requestId", request_id.to_string()),
                );
                false
            }
        }
    }

    /// 重新生成：引擎不保存历史，必须由调用方提供 prompt
    pub async fn regenerate_response(&self, data: ChatRegenerateData) -> ChatOutcome {
        let prompt = match data.prompt.filter(|p| !p.trim().is_empty()) {
            Some(prompt) => prompt,
            None => {
                let message =
                    "Regeneration requires the original prompt; resend it with chat/regenerate"
                        .to_string();
                self.ctx.error_log.warning(
                    message.clone(),
                    ErrorContext::new("RequestManager", "regenerate_response")
                        .with("messageId", data.message_id.clone()),
                );
                self.sink
                    .emit(OutboundPayload::StreamingError(StreamingErrorData {
                        request_id: data.message_id,
                        error: message.clone(),
                        stack: None,
                    }));
                return ChatOutcome::Failed(message);
            }
        };

        let mut request = ChatRequestData::new(new_id("regen"), prompt);
        request.model = data.model;
        tracing::debug!(
            message_id = %data.message_id,
            request_id = %request.request_id,
            "Regenerating response"
        );
        self.handle_chat_request(request).await
    }

    /// 取消所有进行中的请求并清空；可重复调用
    pub async fn cleanup(&self) {
        let drained: Vec<(String, ActiveRequest)> = self.active.write().await.drain().collect();
        for (request_id, active) in &drained {
            active.token.cancel();
            tracing::debug!(request_id = %request_id, "Cancelled during cleanup");
        }
        if !drained.is_empty() {
            tracing::info!(cancelled = drained.len(), "Chat requests cleaned up");
        }
    }

    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    pub async fn is_active(&self, request_id: &str) -> bool {
        self.active.read().await.contains_key(request_id)
    }
}
