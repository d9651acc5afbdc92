//! 多步计划：分解结果解析与顺序执行

pub mod executor;
pub mod parser;

pub use executor::PlanExecutor;
pub use parser::{parse_plan_steps, ParsedSteps};
