//! 引擎集成测试：通过 dispatch 驱动全部组件

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use conduit::core::Severity;
    use conduit::index::{InMemoryIndex, IndexedFile};
    use conduit::llm::ScriptedProvider;
    use conduit::protocol::{
        ChatRequestData, ChatStopData, ContextRequestData, InboundMessage, InboundPayload,
        OutboundMessage, OutboundPayload, PlanningRequestData, StepStatus,
    };
    use conduit::{Engine, EngineConfig, EventSink};
    use tokio::sync::mpsc::UnboundedReceiver;

    struct Harness {
        engine: Arc<Engine>,
        rx: UnboundedReceiver<OutboundMessage>,
        provider: Arc<ScriptedProvider>,
        index: Arc<InMemoryIndex>,
    }

    async fn harness(provider: ScriptedProvider, files: Vec<IndexedFile>) -> Harness {
        let _ = conduit::observability::try_init();
        let (sink, rx) = EventSink::channel();
        let provider = Arc::new(provider);
        let index = Arc::new(InMemoryIndex::new(files));
        let engine = Arc::new(Engine::new(
            EngineConfig::default().without_delays(),
            provider.clone(),
            index.clone(),
            sink,
        ));
        engine.initialize().await;
        Harness {
            engine,
            rx,
            provider,
            index,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg);
        }
        out
    }

    fn chat(id: &str, message: &str) -> InboundMessage {
        InboundMessage::new(InboundPayload::ChatRequest(ChatRequestData::new(id, message)))
    }

    #[tokio::test]
    async fn test_chat_emits_start_tokens_and_one_terminal_event() {
        let mut h = harness(
            ScriptedProvider::new().with_reply("the quick brown fox"),
            vec![],
        )
        .await;
        h.engine.dispatch(chat("r1", "tell me")).await;

        let events = drain(&mut h.rx);
        assert!(events.iter().all(|e| e.request_id() == Some("r1")));
        let types: Vec<_> = events.iter().map(|e| e.message_type()).collect();
        assert_eq!(types.iter().filter(|t| **t == "streaming/start").count(), 1);
        assert_eq!(types[0], "streaming/start");
        assert_eq!(
            types
                .iter()
                .filter(|t| **t == "streaming/complete" || **t == "streaming/error")
                .count(),
            1
        );
        assert_eq!(*types.last().unwrap(), "streaming/complete");

        let lengths: Vec<usize> = events
            .iter()
            .filter_map(|e| match &e.payload {
                OutboundPayload::StreamingToken(t) => Some(t.accumulated.len()),
                _ => None,
            })
            .collect();
        assert_eq!(lengths.len(), 4);
        assert!(lengths.windows(2).all(|w| w[0] < w[1]));

        match &events.last().unwrap().payload {
            OutboundPayload::StreamingComplete(c) => {
                assert_eq!(c.full_text, "the quick brown fox");
                assert_eq!(c.token_count, 6);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.engine.status().await.active_requests, 0);
    }

    #[tokio::test]
    async fn test_stop_before_first_token_emits_nothing_further() {
        let mut h = harness(
            ScriptedProvider::new()
                .with_reply("too late")
                .with_latency(Duration::from_secs(5)),
            vec![],
        )
        .await;

        let handle = h.engine.spawn_dispatch(chat("r1", "slow one"));
        while !h.engine.chat().is_active("r1").await {
            tokio::task::yield_now().await;
        }
        h.engine
            .dispatch(InboundMessage::new(InboundPayload::ChatStop(ChatStopData {
                request_id: "r1".to_string(),
            })))
            .await;
        handle.await.unwrap();

        let types: Vec<_> = drain(&mut h.rx).iter().map(|e| e.message_type()).collect();
        assert_eq!(types, vec!["streaming/start"]);
        assert!(!h.engine.chat().is_active("r1").await);
    }

    #[tokio::test]
    async fn test_stop_unknown_request_is_silent() {
        let mut h = harness(ScriptedProvider::new(), vec![]).await;
        h.engine
            .dispatch(InboundMessage::new(InboundPayload::ChatStop(ChatStopData {
                request_id: "nobody".to_string(),
            })))
            .await;
        assert!(drain(&mut h.rx).is_empty());
        let warnings = h.engine.context().error_log.by_severity(Severity::Warning);
        assert_eq!(warnings.len(), 1);
    }

    #[tokio::test]
    async fn test_context_update_respects_budget_and_ranking() {
        let mut files = vec![
            IndexedFile::new("util.ts", ""),
            IndexedFile::new("a.tsx", "component with local state"),
        ];
        for i in 0..8 {
            files.push(IndexedFile::new(format!("doc{i}.md"), "update notes ".repeat(40)));
        }
        let mut h = harness(ScriptedProvider::new(), files).await;

        let request = ContextRequestData::new("c1", "update component state").with_limits(4, 300);
        h.engine
            .dispatch(InboundMessage::new(InboundPayload::ContextRequest(request)))
            .await;

        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            OutboundPayload::ContextUpdate(update) => {
                assert!(update.files.len() <= 4);
                assert!(update.total_tokens <= 300);
                let pos = |p: &str| update.files.iter().position(|f| f.path == p);
                if let (Some(a), Some(u)) = (pos("a.tsx"), pos("util.ts")) {
                    assert!(a < u);
                }
                assert!(pos("a.tsx").is_some());
                assert!(update
                    .files
                    .iter()
                    .all(|f| (0.0..=1.0).contains(&f.relevance_score)));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_empty_index_yields_empty_update() {
        let mut h = harness(ScriptedProvider::new(), vec![IndexedFile::new("a.rs", "x")]).await;
        h.index.clear();
        h.engine
            .dispatch(InboundMessage::new(InboundPayload::ContextRequest(
                ContextRequestData::new("c", "anything"),
            )))
            .await;
        match &drain(&mut h.rx)[0].payload {
            OutboundPayload::ContextUpdate(update) => {
                assert!(update.files.is_empty());
                assert_eq!(update.total_tokens, 0);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_plan_fails_fast_through_dispatch() {
        let mut h = harness(
            ScriptedProvider::new()
                .with_reply("```json\n{\"steps\": [\"one\", \"two\", \"three\"]}\n```")
                .with_reply("first done")
                .with_failure("step two broke")
                .with_failure("step two broke again")
                .with_reply("unreachable"),
            vec![],
        )
        .await;
        h.engine
            .dispatch(InboundMessage::new(InboundPayload::PlanningRequest(
                PlanningRequestData {
                    request_id: "p1".to_string(),
                    task: "refactor".to_string(),
                    context: None,
                },
            )))
            .await;

        let events = drain(&mut h.rx);
        assert!(events
            .iter()
            .all(|e| e.message_type().starts_with("planning/")));
        for event in &events {
            if let OutboundPayload::PlanningProgress(p) = &event.payload {
                assert_ne!(p.plan.steps[2].status, StepStatus::InProgress);
                assert_eq!(p.total_steps, 3);
            }
        }
        match &events.last().unwrap().payload {
            OutboundPayload::PlanningComplete(c) => {
                assert!(!c.success);
                assert_eq!(c.plan.steps[2].status, StepStatus::Pending);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert_eq!(h.provider.calls(), 4);
        assert_eq!(h.engine.status().await.active_plans, 0);
    }

    #[tokio::test]
    async fn test_wire_json_round_trip() {
        let mut h = harness(ScriptedProvider::new().with_reply("hi there"), vec![]).await;
        h.engine
            .dispatch_json(
                r#"{"id":"m1","type":"chat/request","timestamp":1,"data":{"requestId":"r9","message":"hello"}}"#,
            )
            .await;

        for msg in drain(&mut h.rx) {
            let value: serde_json::Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
            assert!(value["id"].as_str().unwrap().starts_with("msg_"));
            assert!(value["timestamp"].as_i64().unwrap() > 0);
            assert_eq!(value["data"]["requestId"], "r9");
            assert!(conduit::protocol::OUTBOUND_TYPES.contains(&value["type"].as_str().unwrap()));
        }
    }

    #[tokio::test]
    async fn test_failures_become_single_error_messages() {
        let mut h = harness(
            ScriptedProvider::new()
                .with_failure("x")
                .with_failure("y")
                .with_failure("z"),
            vec![],
        )
        .await;
        let msg = InboundMessage::new(InboundPayload::PlanningRequest(PlanningRequestData {
            request_id: "p".to_string(),
            task: "t".to_string(),
            context: None,
        }));
        let id = msg.id.clone();
        h.engine.dispatch(msg).await;

        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        match &events[0].payload {
            OutboundPayload::Error(e) => {
                assert_eq!(e.original_message_id.as_deref(), Some(id.as_str()));
                assert!(e.message.contains("z"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_shutdown_cancels_and_is_idempotent() {
        let mut h = harness(
            ScriptedProvider::new()
                .with_default_reply("x")
                .with_latency(Duration::from_secs(5)),
            vec![],
        )
        .await;
        let first = h.engine.spawn_dispatch(chat("a", "q"));
        let second = h.engine.spawn_dispatch(chat("b", "q"));
        while h.engine.status().await.active_requests < 2 {
            tokio::task::yield_now().await;
        }

        h.engine.shutdown().await;
        h.engine.shutdown().await;
        first.await.unwrap();
        second.await.unwrap();

        let status = h.engine.status().await;
        assert!(!status.initialized);
        assert_eq!(status.active_requests, 0);
        assert!(drain(&mut h.rx)
            .iter()
            .all(|e| e.message_type() == "streaming/start"));

        // 关闭后的消息只得到一条 error
        h.engine.dispatch(chat("c", "q")).await;
        let events = drain(&mut h.rx);
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].message_type(), "error");
    }
}
