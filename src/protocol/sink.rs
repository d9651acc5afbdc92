//! 出站事件通道：所有组件通过同一个 EventSink 发出消息，Router 原样转发给调用方

use tokio::sync::mpsc;

use super::outbound::{OutboundMessage, OutboundPayload};

/// 单一出口（对应外壳桥的 onMessage）；克隆后共享同一通道
#[derive(Clone, Debug)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<OutboundMessage>) -> Self {
        Self { tx }
    }

    /// 创建 sink 及其接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    /// 包装为完整消息并发送；接收端已关闭时丢弃
    pub fn emit(&self, payload: OutboundPayload) {
        let msg = OutboundMessage::new(payload);
        let ty = msg.message_type();
        if self.tx.send(msg).is_err() {
            tracing::debug!(message_type = ty, "Event receiver dropped, discarding event");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::outbound::StreamingStartData;

    #[tokio::test]
    async fn test_emit_preserves_order() {
        let (sink, mut rx) = EventSink::channel();
        for i in 0..3 {
            sink.emit(OutboundPayload::StreamingStart(StreamingStartData {
                request_id: format!("r{i}"),
            }));
        }
        for i in 0..3 {
            let msg = rx.recv().await.unwrap();
            assert_eq!(msg.request_id(), Some(format!("r{i}").as_str()));
        }
    }

    #[test]
    fn test_emit_after_receiver_dropped_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        assert!(sink.is_closed());
        sink.emit(OutboundPayload::StreamingStart(StreamingStartData {
            request_id: "r".to_string(),
        }));
    }
}
