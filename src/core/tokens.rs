//! Token 估算：按空白切词，词数 × 1.3 向上取整

/// 每个词约合的 token 数
pub const TOKENS_PER_WORD: f64 = 1.3;

pub fn word_count(text: &str) -> usize {
    text.split_whitespace().count()
}

/// 估算文本的 token 数（空文本为 0）
pub fn estimate_tokens(text: &str) -> usize {
    estimate_tokens_for_words(word_count(text))
}

pub fn estimate_tokens_for_words(words: usize) -> usize {
    (words as f64 * TOKENS_PER_WORD).ceil() as usize
}
