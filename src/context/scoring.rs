//! 相关度打分：关键词命中内容 / 路径，外加领域词加成

/// 内容中每命中一个关键词的得分
pub const CONTENT_HIT: f64 = 0.1;
/// 路径中每命中一个关键词的得分
pub const PATH_HIT: f64 = 0.15;
/// 查询与路径同时出现领域词时的加成
pub const DOMAIN_BONUS: f64 = 0.2;
/// 排序时对访问过的文件的加成（不计入 relevanceScore）
pub const RECENCY_BONUS: f64 = 0.2;

const DOMAIN_WORDS: [&str; 3] = ["component", "service", "util"];
const MIN_KEYWORD_LEN: usize = 4;

/// 查询关键词：小写、长度大于 3 的词，去重并保持出现顺序
pub fn extract_keywords(query: &str) -> Vec<String> {
    let mut keywords: Vec<String> = Vec::new();
    for word in query
        .split(|c: char| !c.is_alphanumeric() && c != '_')
        .filter(|w| w.chars().count() >= MIN_KEYWORD_LEN)
    {
        let word = word.to_lowercase();
        if !keywords.contains(&word) {
            keywords.push(word);
        }
    }
    keywords
}

/// 计算单个文件的 relevanceScore，范围 [0, 1]
pub fn relevance_score(query: &str, keywords: &[String], path: &str, content: &str) -> f64 {
    let query = query.to_lowercase();
    let path = path.to_lowercase();
    let content = content.to_lowercase();

    let mut score = 0.0;
    for keyword in keywords {
        if content.contains(keyword.as_str()) {
            score += CONTENT_HIT;
        }
        if path.contains(keyword.as_str()) {
            score += PATH_HIT;
        }
    }
    for word in DOMAIN_WORDS {
        if query.contains(word) && path.contains(word) {
            score += DOMAIN_BONUS;
        }
    }
    score.min(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keywords_skip_short_words() {
        let keywords = extract_keywords("Update the Component state, fix it");
        assert_eq!(keywords, vec!["update", "component", "state"]);
    }

    #[test]
    fn test_content_path_and_domain_scores() {
        let query = "refactor user service";
        let keywords = extract_keywords(query);
        // content: "user"、"service"；path: "user"、"service"；领域词 service
        let score = relevance_score(query, &keywords, "src/user_service.ts", "user service impl");
        let expected = 2.0 * CONTENT_HIT + 2.0 * PATH_HIT + DOMAIN_BONUS;
        assert!((score - expected).abs() < 1e-9);
    }

    #[test]
    fn test_score_is_clamped() {
        let query = "component service util alpha beta gamma delta";
        let keywords = extract_keywords(query);
        let path = "component/service/util/alpha/beta/gamma/delta.ts";
        let score = relevance_score(query, &keywords, path, query);
        assert_eq!(score, 1.0);
    }

    #[test]
    fn test_no_match_scores_zero() {
        let keywords = extract_keywords("update component state");
        assert_eq!(relevance_score("update component state", &keywords, "util.ts", ""), 0.0);
    }
}
