//! 计划执行器：分解任务 -> 顺序执行步骤 -> 发出进度与最终结果
//!
//! 执行严格串行、快速失败：某一步重试耗尽后计划即失败，后续步骤保持 pending。
//! 每个计划恰好发出一次 planning/complete，之后从跟踪表中移除。

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::EngineConfig;
use crate::core::{retry_with_backoff, EngineContext, EngineError, ErrorContext, Result, RetryPolicy};
use crate::llm::{CompletionProvider, CompletionRequest};
use crate::protocol::{
    EventSink, OutboundPayload, Plan, PlanStatus, PlanningCompleteData, PlanningProgressData,
    PlanningRequestData, StepStatus,
};

use super::parser::parse_plan_steps;

fn decomposition_prompt(task: &str, context: Option<&str>) -> String {
    let mut prompt = String::from(
        "Break the following task into a short list of concrete, sequential steps.\n\
         Respond with JSON only, in the form {\"steps\": [\"step one\", \"step two\"]}.\n\n",
    );
    prompt.push_str("Task: ");
    prompt.push_str(task);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str("\n\nContext:\n");
        prompt.push_str(context);
    }
    prompt
}

fn step_prompt(plan: &Plan, index: usize, context: Option<&str>) -> String {
    let mut prompt = format!("Overall task: {}\n", plan.task);
    if let Some(context) = context.filter(|c| !c.trim().is_empty()) {
        prompt.push_str(&format!("Context:\n{context}\n"));
    }
    let done: Vec<String> = plan.steps[..index]
        .iter()
        .filter_map(|s| {
            s.result
                .as_deref()
                .map(|r| format!("- {}: {}", s.description, r))
        })
        .collect();
    if !done.is_empty() {
        prompt.push_str("Completed steps:\n");
        prompt.push_str(&done.join("\n"));
        prompt.push('\n');
    }
    prompt.push_str(&format!(
        "\nPerform step {} of {}: {}",
        index + 1,
        plan.steps.len(),
        plan.steps[index].description
    ));
    prompt
}

pub struct PlanExecutor {
    provider: Arc<dyn CompletionProvider>,
    ctx: EngineContext,
    sink: EventSink,
    model: String,
    decomposition: RetryPolicy,
    step_policy: RetryPolicy,
    max_fallback_steps: usize,
    /// plan id -> 最新快照
    plans: RwLock<HashMap<String, Plan>>,
    /// clear() 时取消，所有计划的令牌都是它的子令牌
    shutdown: RwLock<CancellationToken>,
}

impl PlanExecutor {
    pub fn new(
        provider: Arc<dyn CompletionProvider>,
        ctx: EngineContext,
        sink: EventSink,
        config: &EngineConfig,
    ) -> Self {
        Self {
            provider,
            ctx,
            sink,
            model: config.planning_model().to_string(),
            decomposition: config.planning.decomposition_policy(),
            step_policy: config.planning.step_policy(),
            max_fallback_steps: config.planning.max_fallback_steps,
            plans: RwLock::new(HashMap::new()),
            shutdown: RwLock::new(CancellationToken::new()),
        }
    }

    fn error_context(operation: &str, request_id: &str) -> ErrorContext {
        ErrorContext::new("PlanExecutor", operation).with("requestId", request_id.to_string())
    }

    async fn publish(&self, request_id: &str, plan: &Plan) {
        self.plans.write().await.insert(plan.id.clone(), plan.clone());
        self.sink
            .emit(OutboundPayload::PlanningProgress(PlanningProgressData {
                request_id: request_id.to_string(),
                plan: plan.clone(),
                current_step: plan.current_step_index,
                total_steps: plan.steps.len(),
            }));
    }

    async fn finish(&self, request_id: &str, plan: Plan) -> Plan {
        let success = plan.status == PlanStatus::Completed;
        self.plans.write().await.remove(&plan.id);
        tracing::info!(
            request_id,
            plan_id = %plan.id,
            success,
            completed = plan.completed_steps(),
            total = plan.steps.len(),
            "Plan finished"
        );
        self.sink
            .emit(OutboundPayload::PlanningComplete(PlanningCompleteData {
                request_id: request_id.to_string(),
                plan: plan.clone(),
                success,
            }));
        plan
    }

    async fn decompose(&self, data: &PlanningRequestData, cancel: &CancellationToken) -> Result<String> {
        let request = CompletionRequest::new(
            decomposition_prompt(&data.task, data.context.as_deref()),
            self.model.clone(),
        );
        retry_with_backoff(self.decomposition, cancel, "planning.decompose", |_| {
            self.provider.complete(&request, cancel)
        })
        .await
    }

    /// 分解失败（重试耗尽）时返回 Err，不建立计划；其余情况都以 planning/complete 结束
    pub async fn handle_plan_request(&self, data: PlanningRequestData) -> Result<Plan> {
        let cancel = self.shutdown.read().await.child_token();
        let request_id = data.request_id.as_str();

        let raw = match self.decompose(&data, &cancel).await {
            Ok(raw) => raw,
            Err(e) => {
                if !e.is_cancelled() {
                    self.ctx.error_log.error(
                        format!("Plan decomposition failed: {e}"),
                        Self::error_context("decompose", request_id).with("task", data.task.clone()),
                    );
                }
                return Err(e);
            }
        };

        let parsed = parse_plan_steps(&raw, self.max_fallback_steps);
        if parsed.degraded {
            self.ctx.error_log.warning(
                format!(
                    "Plan response was not valid JSON, using {} line(s) as steps",
                    parsed.steps.len()
                ),
                Self::error_context("parse_plan", request_id),
            );
        }

        let mut plan = Plan::new(data.task.clone(), parsed.steps);
        tracing::info!(request_id, plan_id = %plan.id, steps = plan.steps.len(), "Plan created");
        self.publish(request_id, &plan).await;

        if plan.steps.is_empty() {
            plan.status = PlanStatus::Failed;
            self.ctx.error_log.error(
                "Plan decomposition produced no steps",
                Self::error_context("decompose", request_id).with("planId", plan.id.clone()),
            );
            return Ok(self.finish(request_id, plan).await);
        }

        plan.status = PlanStatus::Executing;
        for index in 0..plan.steps.len() {
            if cancel.is_cancelled() {
                tracing::info!(request_id, plan_id = %plan.id, "Plan cancelled before next step");
                plan.status = PlanStatus::Failed;
                break;
            }

            plan.current_step_index = index;
            plan.steps[index].advance(StepStatus::InProgress);
            self.publish(request_id, &plan).await;

            let request =
                CompletionRequest::new(step_prompt(&plan, index, data.context.as_deref()), self.model.clone());
            let result = retry_with_backoff(self.step_policy, &cancel, "planning.step", |_| {
                self.provider.complete(&request, &cancel)
            })
            .await;

            match result {
                Ok(output) => {
                    let step = &mut plan.steps[index];
                    step.result = Some(output);
                    step.advance(StepStatus::Completed);
                    plan.current_step_index = index + 1;
                    self.publish(request_id, &plan).await;
                }
                Err(e) => {
                    let step = &mut plan.steps[index];
                    step.error = Some(e.to_string());
                    step.advance(StepStatus::Failed);
                    plan.status = PlanStatus::Failed;
                    if !matches!(e, EngineError::Cancelled) {
                        self.ctx.error_log.error(
                            format!("Plan step {} failed: {e}", index + 1),
                            Self::error_context("execute_step", request_id)
                                .with("planId", plan.id.clone())
                                .with("step", plan.steps[index].description.clone()),
                        );
                    }
                    break;
                }
            }
        }

        if plan.status != PlanStatus::Failed {
            plan.status = PlanStatus::Completed;
        }
        Ok(self.finish(request_id, plan).await)
    }

    pub async fn active_plans(&self) -> usize {
        self.plans.read().await.len()
    }

    pub async fn get_plan(&self, plan_id: &str) -> Option<Plan> {
        self.plans.read().await.get(plan_id).cloned()
    }

    /// 取消所有进行中的计划（在下一步开始前生效）并清空跟踪表
    pub async fn clear(&self) {
        let previous = std::mem::replace(&mut *self.shutdown.write().await, CancellationToken::new());
        previous.cancel();
        self.plans.write().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::sync::mpsc::UnboundedReceiver;

    use crate::core::Severity;
    use crate::llm::ScriptedProvider;
    use crate::protocol::OutboundMessage;

    fn executor(
        provider: Arc<ScriptedProvider>,
    ) -> (Arc<PlanExecutor>, EngineContext, UnboundedReceiver<OutboundMessage>) {
        let cfg = EngineConfig::default().without_delays();
        let ctx = EngineContext::new(&cfg);
        let (sink, rx) = EventSink::channel();
        (
            Arc::new(PlanExecutor::new(provider, ctx.clone(), sink, &cfg)),
            ctx,
            rx,
        )
    }

    fn request(task: &str) -> PlanningRequestData {
        PlanningRequestData {
            request_id: "p1".to_string(),
            task: task.to_string(),
            context: None,
        }
    }

    fn drain(rx: &mut UnboundedReceiver<OutboundMessage>) -> Vec<OutboundPayload> {
        let mut out = Vec::new();
        while let Ok(msg) = rx.try_recv() {
            out.push(msg.payload);
        }
        out
    }

    #[tokio::test]
    async fn test_successful_plan() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_reply(r#"{"steps": ["design", "build"]}"#)
                .with_reply("designed")
                .with_reply("built"),
        );
        let (executor, ctx, mut rx) = executor(provider.clone());
        let plan = executor.handle_plan_request(request("ship feature")).await.unwrap();

        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(plan.steps[1].result.as_deref(), Some("built"));
        assert_eq!(plan.current_step_index, 2);
        assert!(ctx.error_log.is_empty());
        assert_eq!(executor.active_plans().await, 0);

        let events = drain(&mut rx);
        // 初始进度 + 每步两次进度 + 完成
        assert_eq!(events.len(), 1 + 2 * 2 + 1);
        match &events[0] {
            OutboundPayload::PlanningProgress(p) => {
                assert_eq!(p.current_step, 0);
                assert_eq!(p.total_steps, 2);
                assert_eq!(p.plan.status, PlanStatus::Planning);
            }
            other => panic!("unexpected event: {other:?}"),
        }
        match events.last() {
            Some(OutboundPayload::PlanningComplete(c)) => assert!(c.success),
            other => panic!("unexpected event: {other:?}"),
        }

        // 第二步的 prompt 带上第一步的结果
        let second = &provider.requests()[2];
        assert!(second.prompt.contains("designed"));
        assert!(second.prompt.contains("step 2 of 2"));
    }

    #[tokio::test]
    async fn test_fail_fast_leaves_later_steps_pending() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_reply(r#"{"steps": ["one", "two", "three"]}"#)
                .with_reply("r1")
                .with_failure("boom")
                .with_failure("boom again")
                .with_reply("r3"),
        );
        let (executor, ctx, mut rx) = executor(provider.clone());
        let plan = executor.handle_plan_request(request("task")).await.unwrap();

        assert_eq!(provider.calls(), 4);
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.steps[0].status, StepStatus::Completed);
        assert_eq!(plan.steps[1].status, StepStatus::Failed);
        assert!(plan.steps[1].error.as_deref().unwrap().contains("boom again"));
        assert_eq!(plan.steps[2].status, StepStatus::Pending);
        assert_eq!(ctx.error_log.by_severity(Severity::Error).len(), 1);

        let events = drain(&mut rx);
        for event in &events {
            if let OutboundPayload::PlanningProgress(p) = event {
                assert_ne!(p.plan.steps[2].status, StepStatus::InProgress);
            }
        }
        let completes: Vec<_> = events
            .iter()
            .filter_map(|e| match e {
                OutboundPayload::PlanningComplete(c) => Some(c),
                _ => None,
            })
            .collect();
        assert_eq!(completes.len(), 1);
        assert!(!completes[0].success);
    }

    #[tokio::test]
    async fn test_non_json_response_degrades_with_warning() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_reply("- look around\n- fix it")
                .with_default_reply("done"),
        );
        let (executor, ctx, _rx) = executor(provider);
        let plan = executor.handle_plan_request(request("task")).await.unwrap();
        assert_eq!(plan.steps.len(), 2);
        assert_eq!(plan.steps[0].description, "look around");
        assert_eq!(plan.status, PlanStatus::Completed);
        assert_eq!(ctx.error_log.by_severity(Severity::Warning).len(), 1);
    }

    #[tokio::test]
    async fn test_zero_steps_fails_immediately() {
        let provider = Arc::new(ScriptedProvider::new().with_reply(r#"{"steps": []}"#));
        let (executor, _, mut rx) = executor(provider.clone());
        let plan = executor.handle_plan_request(request("task")).await.unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(provider.calls(), 1);
        let events = drain(&mut rx);
        assert!(matches!(
            events.last(),
            Some(OutboundPayload::PlanningComplete(c)) if !c.success
        ));
    }

    #[tokio::test]
    async fn test_decomposition_failure_is_error() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_failure("a")
                .with_failure("b")
                .with_failure("c"),
        );
        let (executor, ctx, mut rx) = executor(provider.clone());
        let err = executor.handle_plan_request(request("task")).await.unwrap_err();
        assert!(matches!(err, EngineError::Provider(_)));
        assert_eq!(provider.calls(), 3);
        assert!(drain(&mut rx).is_empty());
        assert_eq!(ctx.error_log.len(), 1);
    }

    #[tokio::test]
    async fn test_clear_cancels_running_plan() {
        let provider = Arc::new(
            ScriptedProvider::new()
                .with_reply(r#"{"steps": ["slow", "never"]}"#)
                .with_default_reply("x")
                .with_latency(Duration::from_millis(200)),
        );
        let (executor, _, _rx) = executor(provider);
        let handle = tokio::spawn({
            let executor = executor.clone();
            async move { executor.handle_plan_request(request("task")).await }
        });
        while executor.active_plans().await == 0 {
            tokio::task::yield_now().await;
        }
        executor.clear().await;

        let plan = handle.await.unwrap().unwrap();
        assert_eq!(plan.status, PlanStatus::Failed);
        assert_eq!(plan.steps[1].status, StepStatus::Pending);
        assert_eq!(executor.active_plans().await, 0);
    }
}
