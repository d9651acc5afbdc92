//! 协议层：入站 / 出站消息、数据模型、消息 ID 与出站通道

pub mod ids;
pub mod inbound;
pub mod model;
pub mod outbound;
pub mod sink;

pub use ids::{new_id, new_message_id, now_millis};
pub use inbound::{
    ChatRegenerateData, ChatRequestData, ChatStopData, ContextRequestData, FileEventData,
    InboundMessage, InboundPayload, PlanningRequestData, DEFAULT_MAX_FILES, DEFAULT_MAX_TOKENS,
    INBOUND_TYPES,
};
pub use model::{ChatMessage, ContextFile, Plan, PlanStatus, PlanStep, Role, StepStatus};
pub use outbound::{
    ContextUpdateData, ErrorData, OutboundMessage, OutboundPayload, PlanningCompleteData,
    PlanningProgressData, StreamingCompleteData, StreamingErrorData, StreamingStartData,
    StreamingTokenData, OUTBOUND_TYPES,
};
pub use sink::EventSink;
