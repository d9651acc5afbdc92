//! 消息 ID 与时间戳
//!
//! ID = 毫秒时间戳 + 进程内单调序号 + 随机后缀，碰撞概率可忽略。

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(0);

pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// 生成全局唯一的消息 ID，例如 `msg_1730000000000_42_9f1c2ab4`
pub fn new_message_id() -> String {
    let seq = NEXT_SEQ.fetch_add(1, Ordering::Relaxed);
    let random = uuid::Uuid::new_v4().simple().to_string();
    format!("msg_{}_{}_{}", now_millis(), seq, &random[..8])
}

/// 带前缀的随机 ID（请求、计划、步骤）
pub fn new_id(prefix: &str) -> String {
    format!("{}_{}", prefix, uuid::Uuid::new_v4())
}
