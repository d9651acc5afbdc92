//! 模拟流式：把完整文本按空白切词，逐词吐出，词间停顿
//!
//! 真正支持 token 流的后端接入时，只需提供另一个 TokenStream，RequestManager 无需改动。

use std::pin::Pin;
use std::time::Duration;

use futures_util::{stream, Stream};

/// 逐个产出文本片段的流
pub type TokenStream = Pin<Box<dyn Stream<Item = String> + Send>>;

/// 第一个词立即产出，之后每个词前等待 delay
pub fn simulated_token_stream(text: &str, delay: Duration) -> TokenStream {
    let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
    Box::pin(stream::unfold(
        (words.into_iter(), true),
        move |(mut words, first)| async move {
            let word = words.next()?;
            if !first && !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            Some((word, (words, false)))
        },
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;

    #[tokio::test]
    async fn test_splits_on_whitespace() {
        let words: Vec<String> =
            simulated_token_stream("hello   brave\nnew\tworld", Duration::ZERO)
                .collect()
                .await;
        assert_eq!(words, vec!["hello", "brave", "new", "world"]);
    }

    #[tokio::test]
    async fn test_empty_text_yields_nothing() {
        let words: Vec<String> = simulated_token_stream("  \n ", Duration::ZERO).collect().await;
        assert!(words.is_empty());
    }

    #[tokio::test]
    async fn test_delay_between_words() {
        let started = std::time::Instant::now();
        let words: Vec<String> = simulated_token_stream("a b c", Duration::from_millis(10))
            .collect()
            .await;
        assert_eq!(words.len(), 3);
        assert!(started.elapsed() >= Duration::from_millis(20));
    }
}
