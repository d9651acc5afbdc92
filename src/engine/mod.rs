//! 引擎：消息路由与生命周期

pub mod router;

pub use router::{Engine, EngineStatus};
