//! 引擎配置：从 config/engine.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `CONDUIT__*` 覆盖（双下划线表示嵌套，如 `CONDUIT__CHAT__WORD_DELAY_MS=0`）。
//! 所有字段都有默认值，单次调用的参数（maxFiles / maxTokens / model / temperature）优先于这里的默认值。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryPolicy;
use crate::protocol::{DEFAULT_MAX_FILES, DEFAULT_MAX_TOKENS};

/// 配置根（对应 config/engine.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub engine: EngineSection,
    pub chat: ChatSection,
    pub context: ContextSection,
    pub planning: PlanningSection,
}

/// [engine] 段：共享状态容量、项目标识
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EngineSection {
    /// 错误日志环形缓冲容量
    pub error_log_capacity: usize,
    /// 性能指标保留条数
    pub metric_capacity: usize,
    /// 传给 IndexProvider 的项目 ID
    pub project_id: String,
}

impl Default for EngineSection {
    fn default() -> Self {
        Self {
            error_log_capacity: 500,
            metric_capacity: 1000,
            project_id: "default".to_string(),
        }
    }
}

/// [chat] 段：默认模型、重试、模拟流式的词间隔
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ChatSection {
    pub default_model: String,
    pub temperature: Option<f32>,
    /// 总尝试次数（含首次）
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    /// 每个词之间的停顿（毫秒）
    pub word_delay_ms: u64,
}

impl Default for ChatSection {
    fn default() -> Self {
        Self {
            default_model: "default".to_string(),
            temperature: None,
            retry_attempts: 2,
            retry_delay_ms: 1000,
            word_delay_ms: 30,
        }
    }
}

impl ChatSection {
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.retry_attempts, Duration::from_millis(self.retry_delay_ms))
    }

    pub fn word_delay(&self) -> Duration {
        Duration::from_millis(self.word_delay_ms)
    }
}

/// [context] 段：默认预算与索引重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ContextSection {
    /// context/request 未带 maxFiles 时使用
    pub max_files: usize,
    /// context/request 未带 maxTokens 时使用
    pub max_tokens: usize,
    pub index_retry_attempts: u32,
    pub index_retry_delay_ms: u64,
}

impl Default for ContextSection {
    fn default() -> Self {
        Self {
            max_files: DEFAULT_MAX_FILES,
            max_tokens: DEFAULT_MAX_TOKENS,
            index_retry_attempts: 3,
            index_retry_delay_ms: 500,
        }
    }
}

impl ContextSection {
    /// 索引获取使用指数退避
    pub fn index_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential(
            self.index_retry_attempts,
            Duration::from_millis(self.index_retry_delay_ms),
            2.0,
        )
    }
}

/// [planning] 段：分解与步骤执行的重试、降级解析的步数上限
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlanningSection {
    /// 未设置时沿用 chat.default_model
    pub model: Option<String>,
    pub decomposition_attempts: u32,
    pub step_attempts: u32,
    pub retry_delay_ms: u64,
    pub max_fallback_steps: usize,
}

impl Default for PlanningSection {
    fn default() -> Self {
        Self {
            model: None,
            decomposition_attempts: 3,
            step_attempts: 2,
            retry_delay_ms: 1000,
            max_fallback_steps: 10,
        }
    }
}

impl PlanningSection {
    pub fn decomposition_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(
            self.decomposition_attempts,
            Duration::from_millis(self.retry_delay_ms),
        )
    }

    pub fn step_policy(&self) -> RetryPolicy {
        RetryPolicy::fixed(self.step_attempts, Duration::from_millis(self.retry_delay_ms))
    }
}

impl EngineConfig {
    /// 计划使用的模型（planning.model 优先）
    pub fn planning_model(&self) -> &str {
        self.planning
            .model
            .as_deref()
            .unwrap_or(&self.chat.default_model)
    }

    /// 测试与本地调试用：去掉所有等待
    pub fn without_delays(mut self) -> Self {
        self.chat.retry_delay_ms = 0;
        self.chat.word_delay_ms = 0;
        self.context.index_retry_delay_ms = 0;
        self.planning.retry_delay_ms = 0;
        self
    }
}

/// 从 config 目录加载配置，环境变量 CONDUIT__* 可覆盖
///
/// 1. 按顺序查找 config/engine.toml、../config/engine.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 CONDUIT__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<EngineConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    for name in ["config/engine", "../config/engine"] {
        if std::path::Path::new(&format!("{name}.toml")).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("CONDUIT")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}
