//! 对话：请求生命周期与取消

pub mod manager;

pub use manager::{ChatOutcome, RequestManager};
