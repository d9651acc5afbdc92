//! Conduit - 请求编排引擎
//!
//! 位于用户界面外壳与补全 / 项目索引后端之间：接收类型化的入站消息（对话、上下文查询、多步计划），
//! 跟踪每个请求，流式推送部分结果，支持协作式取消，重试瞬时失败，并把失败转换为结构化的错误消息。
//!
//! 模块划分：
//! - **config**: 引擎配置加载（TOML + 环境变量）
//! - **core**: 错误类型、错误日志、重试、性能追踪、token 估算、共享上下文
//! - **protocol**: 入站 / 出站消息、数据模型、事件出口
//! - **llm**: 补全后端抽象与测试实现
//! - **index**: 项目索引抽象（内存 / 文件系统）
//! - **context**: 相关文件打分与预算内选择
//! - **streaming**: 模拟逐词流式与生成管线
//! - **chat**: 对话请求生命周期与取消
//! - **planning**: 计划分解与顺序执行
//! - **engine**: 消息路由与生命周期
//! - **observability**: tracing 初始化

pub mod chat;
pub mod config;
pub mod context;
pub mod core;
pub mod engine;
pub mod index;
pub mod llm;
pub mod observability;
pub mod planning;
pub mod protocol;
pub mod streaming;

pub use crate::config::{load_config, EngineConfig};
pub use crate::core::{EngineError, Result, Severity};
pub use crate::engine::{Engine, EngineStatus};
pub use crate::protocol::{EventSink, InboundMessage, InboundPayload, OutboundMessage, OutboundPayload};
