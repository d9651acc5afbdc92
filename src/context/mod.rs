//! 上下文选择：相关度打分、访问记录、预算内挑选

pub mod recency;
pub mod scoring;
pub mod selector;

pub use recency::RecencyTracker;
pub use selector::{total_tokens, ContextSelector};
