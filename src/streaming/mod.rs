//! 流式输出：模拟逐词推送与生成管线

pub mod pipeline;
pub mod simulate;

pub use pipeline::{StreamRequest, StreamingPipeline};
pub use simulate::{simulated_token_stream, TokenStream};
