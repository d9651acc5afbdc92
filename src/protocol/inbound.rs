//! 入站消息（调用方 -> 引擎）
//!
//! 线上格式：`{"id", "type", "timestamp", "data"}`，type 为 `chat/request` 等字符串。
//! InboundPayload 是封闭的枚举，Router 对它做穷尽匹配。

use serde::{Deserialize, Serialize};

use super::ids::{new_message_id, now_millis};
use super::model::ChatMessage;
use crate::core::EngineError;

/// 上下文查询的默认文件数上限（config 中 [context] max_files 的默认值）
pub const DEFAULT_MAX_FILES: usize = 5;
/// 上下文查询的默认 token 预算（config 中 [context] max_tokens 的默认值）
pub const DEFAULT_MAX_TOKENS: usize = 4000;

/// 所有入站 type 字符串
pub const INBOUND_TYPES: [&str; 7] = [
    "chat/request",
    "chat/stop",
    "chat/regenerate",
    "context/request",
    "planning/request",
    "ide/file-open",
    "ide/file-edit",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: InboundPayload,
}

impl InboundMessage {
    pub fn new(payload: InboundPayload) -> Self {
        Self {
            id: new_message_id(),
            timestamp: now_millis(),
            payload,
        }
    }

    pub fn message_type(&self) -> &'static str {
        self.payload.message_type()
    }

    /// 解析原始 JSON；未知 type 返回 UnknownMessageType，已知 type 但 data 不合法返回 InvalidMessage
    pub fn from_json(raw: &str) -> Result<Self, EngineError> {
        let value: serde_json::Value = serde_json::from_str(raw)
            .map_err(|e| EngineError::InvalidMessage(e.to_string()))?;
        let ty = value
            .get("type")
            .and_then(|t| t.as_str())
            .map(str::to_string)
            .ok_or_else(|| EngineError::InvalidMessage("missing \"type\" field".to_string()))?;
        if !INBOUND_TYPES.contains(&ty.as_str()) {
            return Err(EngineError::UnknownMessageType(ty));
        }
        serde_json::from_value(value)
            .map_err(|e| EngineError::InvalidMessage(format!("{ty}: {e}")))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum InboundPayload {
    #[serde(rename = "chat/request")]
    ChatRequest(ChatRequestData),
    #[serde(rename = "chat/stop")]
    ChatStop(ChatStopData),
    #[serde(rename = "chat/regenerate")]
    ChatRegenerate(ChatRegenerateData),
    #[serde(rename = "context/request")]
    ContextRequest(ContextRequestData),
    #[serde(rename = "planning/request")]
    PlanningRequest(PlanningRequestData),
    #[serde(rename = "ide/file-open")]
    FileOpen(FileEventData),
    #[serde(rename = "ide/file-edit")]
    FileEdit(FileEventData),
}

impl InboundPayload {
    pub fn message_type(&self) -> &'static str {
        match self {
            InboundPayload::ChatRequest(_) => "chat/request",
            InboundPayload::ChatStop(_) => "chat/stop",
            InboundPayload::ChatRegenerate(_) => "chat/regenerate",
            InboundPayload::ContextRequest(_) => "context/request",
            InboundPayload::PlanningRequest(_) => "planning/request",
            InboundPayload::FileOpen(_) => "ide/file-open",
            InboundPayload::FileEdit(_) => "ide/file-edit",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRequestData {
    pub request_id: String,
    pub message: String,
    /// 作为 system 指令拼在最前面的上下文块
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub history: Vec<ChatMessage>,
}

impl ChatRequestData {
    pub fn new(request_id: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            message: message.into(),
            context: None,
            model: None,
            temperature: None,
            history: Vec::new(),
        }
    }

    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatStopData {
    pub request_id: String,
}

/// 重新生成：prompt 由调用方提供，引擎不保存历史
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatRegenerateData {
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextRequestData {
    pub request_id: String,
    pub query: String,
    /// 未给出时由 ContextSelector 取配置中的默认值
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_files: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<usize>,
}

impl ContextRequestData {
    pub fn new(request_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            request_id: request_id.into(),
            query: query.into(),
            max_files: None,
            max_tokens: None,
        }
    }

    pub fn with_limits(mut self, max_files: usize, max_tokens: usize) -> Self {
        self.max_files = Some(max_files);
        self.max_tokens = Some(max_tokens);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningRequestData {
    pub request_id: String,
    pub task: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEventData {
    pub path: String,
}
