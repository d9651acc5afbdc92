//! LLM 层：补全后端抽象与测试实现（Echo / Scripted）

pub mod mock;
pub mod traits;

pub use mock::{EchoProvider, ScriptedProvider};
pub use traits::{CompletionProvider, CompletionRequest};
