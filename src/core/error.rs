//! 引擎错误类型与严重级别
//!
//! 与 ErrorLog 配合：组件把失败归类为 EngineError，Router 再把它转换为 `error` / `streaming/error` 消息。

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// 引擎运行过程中可能出现的错误（取消、后端失败、解析失败、未初始化等）
#[derive(Error, Debug)]
pub enum EngineError {
    /// 协作式取消：不是错误，组件遇到后直接短路，不上报失败消息
    #[error("Operation cancelled")]
    Cancelled,

    #[error("Engine not initialized")]
    NotInitialized,

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Index error: {0}")]
    Index(String),

    #[error("Invalid message: {0}")]
    InvalidMessage(String),

    #[error("Unknown message type: {0}")]
    UnknownMessageType(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl EngineError {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// 是否值得重试：取消、配置与协议错误重试无意义
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Provider(_) | Self::Index(_) | Self::Io(_)
        )
    }

    /// 供 `streaming/error` 使用的附加信息（错误链），无来源时为 None
    pub fn stack(&self) -> Option<String> {
        let mut chain = Vec::new();
        let mut source = std::error::Error::source(self);
        while let Some(err) = source {
            chain.push(err.to_string());
            source = err.source();
        }
        if chain.is_empty() {
            None
        } else {
            Some(chain.join("\n  caused by: "))
        }
    }
}

/// 错误严重级别（Critical 保留给需要停机的情况，当前组件未使用）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// 可追踪、无需处理
    Info,
    /// 意外但已在本地处理（停止未知请求、未知消息类型）
    Warning,
    /// 操作失败，已以结构化消息上报调用方
    Error,
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}
