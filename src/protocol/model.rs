//! 消息中携带的数据模型：对话历史、上下文文件、计划与步骤

use serde::{Deserialize, Serialize};

use super::ids::new_id;

/// 对话角色（与补全后端一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

/// 单条对话消息（history 与 system 指令）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// 为某次查询挑选出的文件；每次查询重新计算，不跨查询保存
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContextFile {
    pub path: String,
    pub content: String,
    /// [0, 1]
    pub relevance_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_accessed_timestamp: Option<i64>,
}

/// 计划状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    Planning,
    Executing,
    Completed,
    Failed,
}

/// 步骤状态，只能向前推进：pending -> in-progress -> completed | failed
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StepStatus {
    fn rank(self) -> u8 {
        match self {
            StepStatus::Pending => 0,
            StepStatus::InProgress => 1,
            StepStatus::Completed | StepStatus::Failed => 2,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlanStep {
    pub id: String,
    pub description: String,
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl PlanStep {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: new_id("step"),
            description: description.into(),
            status: StepStatus::Pending,
            result: None,
            error: None,
        }
    }

    /// 推进状态；试图回退或停留在同级时返回 false 且不修改
    pub fn advance(&mut self, to: StepStatus) -> bool {
        if to.rank() <= self.status.rank() {
            return false;
        }
        self.status = to;
        true
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub id: String,
    pub task: String,
    pub steps: Vec<PlanStep>,
    pub current_step_index: usize,
    pub status: PlanStatus,
}

impl Plan {
    /// 按描述列表建立计划，所有步骤为 pending，计划状态为 planning
    pub fn new(task: impl Into<String>, descriptions: Vec<String>) -> Self {
        Self {
            id: new_id("plan"),
            task: task.into(),
            steps: descriptions.into_iter().map(PlanStep::new).collect(),
            current_step_index: 0,
            status: PlanStatus::Planning,
        }
    }

    pub fn completed_steps(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Completed)
            .count()
    }
}
