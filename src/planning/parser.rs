//! 计划分解结果解析
//!
//! 首选 JSON：`{"steps": ["...", ...]}`，可包在 ```json 代码块里，或夹杂在说明文字中。
//! 解析失败时降级为逐行：每个非空行一个步骤（去掉列表符号），最多 max_fallback 个。

use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
struct StepsDocument {
    steps: Vec<String>,
}

/// 解析结果；degraded 为 true 表示走了逐行降级
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSteps {
    pub steps: Vec<String>,
    pub degraded: bool,
}

static LIST_MARKER: OnceLock<Option<Regex>> = OnceLock::new();

fn strip_list_marker(line: &str) -> &str {
    let re = LIST_MARKER.get_or_init(|| Regex::new(r"^\s*(?:[-*•]|\d+[.)])\s+").ok());
    match re.as_ref().and_then(|re| re.find(line)) {
        Some(m) => &line[m.end()..],
        None => line,
    }
}

/// 从模型输出中取出 JSON 片段：```json 代码块优先，其次第一个 `{` 到最后一个 `}`
fn extract_json(raw: &str) -> Option<&str> {
    let trimmed = raw.trim();
    if let Some(start) = trimmed.find("```json") {
        let rest = &trimmed[start + 7..];
        return Some(rest.find("```").map(|end| rest[..end].trim()).unwrap_or(rest.trim()));
    }
    let start = trimmed.find('{')?;
    let end = trimmed.rfind('}')?;
    (end > start).then(|| &trimmed[start..=end])
}

fn parse_json_steps(raw: &str) -> Option<Vec<String>> {
    let json = extract_json(raw)?;
    let doc: StepsDocument = serde_json::from_str(json).ok()?;
    Some(
        doc.steps
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect(),
    )
}

pub fn parse_plan_steps(raw: &str, max_fallback: usize) -> ParsedSteps {
    if let Some(steps) = parse_json_steps(raw) {
        return ParsedSteps {
            steps,
            degraded: false,
        };
    }

    let steps = raw
        .lines()
        .map(|line| strip_list_marker(line).trim())
        .filter(|line| !line.is_empty() && !line.starts_with("```"))
        .take(max_fallback)
        .map(str::to_string)
        .collect();
    ParsedSteps {
        steps,
        degraded: true,
    }
}
