//! 引擎入口：初始化 / 分发 / 关闭
//!
//! dispatch 对入站消息做穷尽匹配，调用对应组件并等待其完成。组件内部自行处理失败；
//! 仍然冒出来的错误在这里转换为恰好一条 `error` 消息，不会再向调用方抛出。
//! 长时间运行的对话与计划应通过 `spawn_dispatch` 并发执行，以便 chat/stop 能及时到达。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::chat::RequestManager;
use crate::config::EngineConfig;
use crate::context::{total_tokens, ContextSelector};
use crate::core::{EngineContext, EngineError, ErrorContext, Result, Severity};
use crate::index::IndexProvider;
use crate::llm::CompletionProvider;
use crate::planning::PlanExecutor;
use crate::protocol::{
    ContextUpdateData, ErrorData, EventSink, InboundMessage, InboundPayload, OutboundPayload,
};
use crate::streaming::StreamingPipeline;

/// 引擎运行状态快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineStatus {
    pub initialized: bool,
    pub active_requests: usize,
    pub active_plans: usize,
    pub error_count: usize,
}

pub struct Engine {
    ctx: EngineContext,
    sink: EventSink,
    chat: RequestManager,
    context: ContextSelector,
    planner: PlanExecutor,
    initialized: AtomicBool,
    /// 上下文查询的取消令牌，shutdown 时取消，下次 initialize 时换新
    lifecycle: RwLock<CancellationToken>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        provider: Arc<dyn CompletionProvider>,
        index: Arc<dyn IndexProvider>,
        sink: EventSink,
    ) -> Self {
        let ctx = EngineContext::new(&config);
        let pipeline = StreamingPipeline::new(provider.clone(), sink.clone(), config.chat.word_delay());
        Self {
            chat: RequestManager::new(pipeline, ctx.clone(), sink.clone(), &config.chat),
            context: ContextSelector::new(
                index,
                ctx.clone(),
                config.engine.project_id.clone(),
                &config.context,
            ),
            planner: PlanExecutor::new(provider, ctx.clone(), sink.clone(), &config),
            ctx,
            sink,
            initialized: AtomicBool::new(false),
            lifecycle: RwLock::new(CancellationToken::new()),
        }
    }

    /// 标记为就绪；重复调用无副作用
    pub async fn initialize(&self) {
        let mut lifecycle = self.lifecycle.write().await;
        if lifecycle.is_cancelled() {
            *lifecycle = CancellationToken::new();
        }
        if !self.initialized.swap(true, Ordering::SeqCst) {
            tracing::info!("Engine initialized");
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn context(&self) -> &EngineContext {
        &self.ctx
    }

    pub fn chat(&self) -> &RequestManager {
        &self.chat
    }

    pub fn planner(&self) -> &PlanExecutor {
        &self.planner
    }

    pub fn context_selector(&self) -> &ContextSelector {
        &self.context
    }

    fn emit_error(&self, message: String, original_message_id: Option<String>, severity: Severity) {
        self.sink.emit(OutboundPayload::Error(ErrorData {
            message,
            original_message_id,
            severity,
        }));
    }

    /// 处理一条入站消息；任何失败都以一条 `error` 消息告知调用方
    pub async fn dispatch(&self, message: InboundMessage) {
        let message_type = message.message_type();
        let timer = self.ctx.perf.scoped(message_type);

        let outcome = if self.is_initialized() {
            self.route(message.payload).await
        } else {
            Err(EngineError::NotInitialized)
        };

        let success = match outcome {
            Ok(()) => true,
            Err(e) if e.is_cancelled() => {
                tracing::debug!(message_id = %message.id, message_type, "Dispatch cancelled");
                true
            }
            Err(e) => {
                tracing::warn!(message_id = %message.id, message_type, "Dispatch failed: {}", e);
                if matches!(e, EngineError::NotInitialized) {
                    self.ctx.error_log.warning(
                        e.to_string(),
                        ErrorContext::new("Engine", "dispatch")
                            .with("messageId", message.id.clone())
                            .with("type", message_type),
                    );
                }
                self.emit_error(e.to_string(), Some(message.id.clone()), Severity::Error);
                false
            }
        };

        timer.finish(Some(
            serde_json::json!({ "messageId": message.id, "success": success }),
        ));
    }

    /// 解析原始 JSON 后分发；未知 type 记录 warning 并回复一条 `error` 消息
    ///
    /// 无法解析的消息同样计时，键为原始 type 字符串（缺失时为 "unknown"）。
    pub async fn dispatch_json(&self, raw: &str) {
        match InboundMessage::from_json(raw) {
            Ok(message) => self.dispatch(message).await,
            Err(e) => {
                let value = serde_json::from_str::<serde_json::Value>(raw).ok();
                let field = |name: &str| {
                    value
                        .as_ref()
                        .and_then(|v| v.get(name))
                        .and_then(|f| f.as_str())
                        .map(str::to_string)
                };
                let original_id = field("id");
                let timer = self
                    .ctx
                    .perf
                    .scoped(field("type").unwrap_or_else(|| "unknown".to_string()));

                let severity = match e {
                    EngineError::UnknownMessageType(_) => Severity::Warning,
                    _ => Severity::Error,
                };
                let mut context = ErrorContext::new("Engine", "dispatch_json");
                if let Some(id) = &original_id {
                    context = context.with("messageId", id.clone());
                }
                self.ctx.error_log.record(e.to_string(), severity, context);
                self.emit_error(e.to_string(), original_id.clone(), severity);
                timer.finish(Some(
                    serde_json::json!({ "messageId": original_id, "success": false }),
                ));
            }
        }
    }

    /// 在后台任务中分发，返回其句柄
    pub fn spawn_dispatch(self: &Arc<Self>, message: InboundMessage) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        tokio::spawn(async move { engine.dispatch(message).await })
    }

    async fn route(&self, payload: InboundPayload) -> Result<()> {
        match payload {
            InboundPayload::ChatRequest(data) => {
                self.chat.handle_chat_request(data).await;
            }
            InboundPayload::ChatStop(data) => {
                self.chat.stop_generation(&data.request_id).await;
            }
            InboundPayload::ChatRegenerate(data) => {
                self.chat.regenerate_response(data).await;
            }
            InboundPayload::ContextRequest(data) => {
                let cancel = self.lifecycle.read().await.child_token();
                let files = self.context.select_relevant_files(&data, &cancel).await?;
                self.sink.emit(OutboundPayload::ContextUpdate(ContextUpdateData {
                    request_id: data.request_id,
                    total_tokens: total_tokens(&files),
                    files,
                }));
            }
            InboundPayload::PlanningRequest(data) => {
                self.planner.handle_plan_request(data).await?;
            }
            InboundPayload::FileOpen(data) => {
                self.context.track_file_access(&data.path);
            }
            InboundPayload::FileEdit(data) => {
                self.context.track_file_access(&data.path);
                self.context.invalidate(&data.path).await;
            }
        }
        Ok(())
    }

    /// 取消所有对话、计划与上下文查询，清空状态并回到未初始化；第二次调用无操作
    pub async fn shutdown(&self) {
        if !self.initialized.swap(false, Ordering::SeqCst) {
            return;
        }
        self.lifecycle.read().await.cancel();
        self.chat.cleanup().await;
        self.planner.clear().await;
        self.context.clear_cache().await;
        tracing::info!("Engine shut down");
    }

    pub async fn status(&self) -> EngineStatus {
        EngineStatus {
            initialized: self.is_initialized(),
            active_requests: self.chat.active_count().await,
            active_plans: self.planner.active_plans().await,
            error_count: self.ctx.error_log.len(),
        }
    }
}
