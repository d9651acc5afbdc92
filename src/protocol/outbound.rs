//! 出站消息（引擎 -> 调用方）
//!
//! 同一请求的事件按产生顺序发出；不同请求的事件可能交错，调用方按 requestId 分流。

use serde::{Deserialize, Serialize};

use super::ids::{new_message_id, now_millis};
use super::model::{ContextFile, Plan};
use crate::core::Severity;

/// 所有出站 type 字符串
pub const OUTBOUND_TYPES: [&str; 8] = [
    "streaming/start",
    "streaming/token",
    "streaming/complete",
    "streaming/error",
    "context/update",
    "planning/progress",
    "planning/complete",
    "error",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub timestamp: i64,
    #[serde(flatten)]
    pub payload: OutboundPayload,
}

impl OutboundMessage {
    pub fn new(payload: OutboundPayload) -> Self {
        Self {
            id: new_message_id(),
            timestamp: now_millis(),
            payload,
        }
    }

    pub fn message_type(&self) -> &'static str {
        self.payload.message_type()
    }

    pub fn request_id(&self) -> Option<&str> {
        self.payload.request_id()
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum OutboundPayload {
    #[serde(rename = "streaming/start")]
    StreamingStart(StreamingStartData),
    #[serde(rename = "streaming/token")]
    StreamingToken(StreamingTokenData),
    #[serde(rename = "streaming/complete")]
    StreamingComplete(StreamingCompleteData),
    #[serde(rename = "streaming/error")]
    StreamingError(StreamingErrorData),
    #[serde(rename = "context/update")]
    ContextUpdate(ContextUpdateData),
    #[serde(rename = "planning/progress")]
    PlanningProgress(PlanningProgressData),
    #[serde(rename = "planning/complete")]
    PlanningComplete(PlanningCompleteData),
    #[serde(rename = "error")]
    Error(ErrorData),
}

impl OutboundPayload {
    pub fn message_type(&self) -> &'static str {
        match self {
            OutboundPayload::StreamingStart(_) => "streaming/start",
            OutboundPayload::StreamingToken(_) => "streaming/token",
            OutboundPayload::StreamingComplete(_) => "streaming/complete",
            OutboundPayload::StreamingError(_) => "streaming/error",
            OutboundPayload::ContextUpdate(_) => "context/update",
            OutboundPayload::PlanningProgress(_) => "planning/progress",
            OutboundPayload::PlanningComplete(_) => "planning/complete",
            OutboundPayload::Error(_) => "error",
        }
    }

    /// 事件所属的请求；`error` 消息不属于任何请求
    pub fn request_id(&self) -> Option<&str> {
        match self {
            OutboundPayload::StreamingStart(d) => Some(&d.request_id),
            OutboundPayload::StreamingToken(d) => Some(&d.request_id),
            OutboundPayload::StreamingComplete(d) => Some(&d.request_id),
            OutboundPayload::StreamingError(d) => Some(&d.request_id),
            OutboundPayload::ContextUpdate(d) => Some(&d.request_id),
            OutboundPayload::PlanningProgress(d) => Some(&d.request_id),
            OutboundPayload::PlanningComplete(d) => Some(&d.request_id),
            OutboundPayload::Error(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingStartData {
    pub request_id: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingTokenData {
    pub request_id: String,
    pub token: String,
    /// 截至本 token 的累计文本
    pub accumulated: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingCompleteData {
    pub request_id: String,
    pub full_text: String,
    pub token_count: usize,
    pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamingErrorData {
    pub request_id: String,
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextUpdateData {
    pub request_id: String,
    pub files: Vec<ContextFile>,
    pub total_tokens: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningProgressData {
    pub request_id: String,
    pub plan: Plan,
    pub current_step: usize,
    pub total_steps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanningCompleteData {
    pub request_id: String,
    pub plan: Plan,
    pub success: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorData {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_message_id: Option<String>,
    pub severity: Severity,
}
