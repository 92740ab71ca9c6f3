//! 匿名化服务 - 业务能力层
//!
//! 只负责"把敏感片段变成安全文本"能力
//!
//! 三种方法：
//! - `placeholder`：按正则规则顺序替换为固定占位符
//! - `hash`：检测后替换为 `[<KIND>_<8位摘要>]`
//! - `remove`：检测后直接删除
//!
//! 纯变换，无网络、无磁盘访问。

use regex::{Regex, RegexBuilder};
use sha2::{Digest, Sha256};
use std::cmp::Ordering;
use std::sync::LazyLock;
use tracing::{debug, error};

use crate::error::ConfigError;
use crate::models::privacy::{AnonymizationMethod, PiiSpan, PrivacyPolicy};
use crate::services::pii_detector;

/// 全局敏感模式的替换文本
const REDACTED: &str = "[REDACTED]";

const NAME_PATTERNS: &[&str] = &[
    r"ชื่อ\s*[:：]\s*\S+",
    r"นาย\s+\S+",
    r"นางสาว\s+\S+",
    r"นาง\s+\S+",
    r"เด็กชาย\s+\S+",
    r"เด็กหญิง\s+\S+",
];

const ID_PATTERNS: &[&str] = &[
    r"รหัส\s*[:：]\s*[0-9]+",
    r"เลขที่\s*[:：]\s*[0-9]+",
    r"รหัสนักเรียน\s*[:：]\s*[0-9]+",
    r"\b[0-9]{8,}\b",
];

static NAME_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_builtin(NAME_PATTERNS));
static ID_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| compile_builtin(ID_PATTERNS));

fn compile_builtin(patterns: &[&str]) -> Vec<Regex> {
    patterns
        .iter()
        .filter_map(|pattern| match compile(pattern) {
            Ok(regex) => Some(regex),
            Err(e) => {
                error!("内置替换规则编译失败: {}", e);
                None
            }
        })
        .collect()
}

fn compile(pattern: &str) -> Result<Regex, ConfigError> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .map_err(|source| ConfigError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })
}

/// 按策略匿名化文本
///
/// 空策略原样返回；未知方法返回 `ConfigError::UnknownMethod`。
pub fn anonymize(text: &str, policy: &PrivacyPolicy) -> Result<String, ConfigError> {
    let Some(method) = policy.resolve_method()? else {
        return Ok(text.to_string());
    };

    let result = match method {
        AnonymizationMethod::Placeholder => apply_placeholders(text, policy)?,
        AnonymizationMethod::Hash => rewrite_spans(text, |span| hash_placeholder(span)),
        AnonymizationMethod::Remove => rewrite_spans(text, |_| String::new()),
    };

    debug!(
        "匿名化完成 (方法: {}): {} → {} 字符",
        method,
        text.chars().count(),
        result.chars().count()
    );
    Ok(result)
}

/// 占位符替换
///
/// 顺序固定：全局敏感模式 → 姓名规则 → 编号规则，后一步作用于前一步的结果。
/// 未配置的占位符取默认值 `[STUDENT]` / `[ID]`。
fn apply_placeholders(text: &str, policy: &PrivacyPolicy) -> Result<String, ConfigError> {
    let mut filtered = text.to_string();

    for pattern in &policy.sensitive_patterns {
        let regex = compile(pattern)?;
        filtered = regex.replace_all(&filtered, REDACTED).into_owned();
    }

    let rules = &policy.redaction_rules;
    filtered = replace_all(&NAME_RULES, &filtered, rules.name_placeholder());
    filtered = replace_all(&ID_RULES, &filtered, rules.id_placeholder());

    Ok(filtered)
}

fn replace_all(rules: &[Regex], text: &str, replacement: &str) -> String {
    rules.iter().fold(text.to_string(), |acc, regex| {
        // NoExpand: 占位符中的 `$` 不做捕获组展开
        regex
            .replace_all(&acc, regex::NoExpand(replacement))
            .into_owned()
    })
}

/// 检测、消解冲突后按倒序改写每个片段
fn rewrite_spans(text: &str, render: impl Fn(&PiiSpan) -> String) -> String {
    let mut spans = resolve_overlaps(pii_detector::detect(text));
    spans.sort_by(|a, b| b.start.cmp(&a.start));

    let mut result = text.to_string();
    for span in &spans {
        result.replace_range(span.start..span.end, &render(span));
    }
    result
}

/// 重叠片段的冲突消解
///
/// 排序键：置信度降序 → 类别优先级（规则表顺序）→ 起始位置升序 → 长度降序；
/// 依次贪心接受与已接受片段不重叠的片段。
pub fn resolve_overlaps(mut spans: Vec<PiiSpan>) -> Vec<PiiSpan> {
    spans.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.category.cmp(&b.category))
            .then_with(|| a.start.cmp(&b.start))
            .then_with(|| b.len().cmp(&a.len()))
    });

    let mut accepted: Vec<PiiSpan> = Vec::with_capacity(spans.len());
    for span in spans {
        if accepted.iter().all(|kept| !kept.overlaps(&span)) {
            accepted.push(span);
        }
    }

    accepted.sort_by_key(|span| span.start);
    accepted
}

/// `[<KIND>_<8位摘要>]`，同一原文总是得到同一占位符
pub fn hash_placeholder(span: &PiiSpan) -> String {
    format!("[{}_{}]", span.kind.tag(), short_digest(&span.text))
}

/// SHA-256 十六进制摘要的前 8 位
pub fn short_digest(value: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(value.as_bytes());
    let result = hasher.finalize();
    let hex = format!("{result:x}");
    hex[..8].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::privacy::{PiiCategory, PiiKind, RedactionRules};

    #[test]
    fn test_empty_policy_is_identity() {
        for text in ["", "นาย สมชาย ใจดี", "รหัส: 1234 score 80/100"] {
            assert_eq!(anonymize(text, &PrivacyPolicy::default()).unwrap(), text);
        }
    }

    #[test]
    fn test_placeholder_defaults() {
        let text = "นาย สมชาย ใจดี รหัสนักเรียน: 12345678 ตอบว่า น้ำระเหย";
        let result = anonymize(text, &PrivacyPolicy::placeholder()).unwrap();

        assert_eq!(result, "[STUDENT] ใจดี [ID] ตอบว่า น้ำระเหย");
    }

    #[test]
    fn test_placeholder_rule_order() {
        // 全局模式先执行，姓名规则看到的是替换后的文本
        let policy = PrivacyPolicy {
            method: None,
            sensitive_patterns: vec![r"โทร\s*[0-9-]+".to_string()],
            redaction_rules: RedactionRules {
                replace_names: Some("<NAME>".to_string()),
                replace_ids: None,
            },
        };
        let result = anonymize("นางสาว มาลี โทร 081-234-5678 เลขที่: 7", &policy).unwrap();

        assert_eq!(result, "<NAME> [REDACTED] [ID]");
    }

    #[test]
    fn test_placeholder_method_alone_uses_defaults() {
        let policy: PrivacyPolicy = toml::from_str(r#"method = "placeholder""#).unwrap();
        assert!(policy.redaction_rules.is_empty());

        let text = "นาย สมชาย รหัสนักเรียน: 12345678";
        let result = anonymize(text, &policy).unwrap();

        assert_ne!(result, text);
        assert_eq!(result, "[STUDENT] [ID]");
        assert!(pii_detector::detect(&result).is_empty());
    }

    #[test]
    fn test_invalid_sensitive_pattern() {
        let policy = PrivacyPolicy {
            sensitive_patterns: vec!["(unclosed".to_string()],
            ..PrivacyPolicy::default()
        };
        assert!(matches!(
            anonymize("text", &policy),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_unknown_method() {
        let policy = PrivacyPolicy {
            method: Some("scramble".to_string()),
            ..PrivacyPolicy::default()
        };
        assert!(matches!(
            anonymize("นาย สมชาย", &policy),
            Err(ConfigError::UnknownMethod(_))
        ));
    }

    #[test]
    fn test_hash_is_deterministic() {
        let text = "นาย สมชาย ส่งงาน";
        let first = anonymize(text, &PrivacyPolicy::hash()).unwrap();
        let second = anonymize(text, &PrivacyPolicy::hash()).unwrap();

        let expected = format!("[PERSONAL_NAME_{}] ส่งงาน", short_digest("นาย สมชาย"));
        assert_eq!(first, expected);
        assert_eq!(first, second);
    }

    #[test]
    fn test_hash_resolves_overlapping_identifier() {
        // student_code (0.9) 胜过 numeric_id (0.6)，只替换一次
        let result = anonymize("รหัสนักเรียน: 12345678 ส่งแล้ว", &PrivacyPolicy::hash()).unwrap();
        let expected = format!("[IDENTIFIER_{}] ส่งแล้ว", short_digest("12345678"));
        assert_eq!(result, expected);
    }

    #[test]
    fn test_hash_stable_on_anonymized_text() {
        let once = anonymize("นาย สมชาย เลขที่: 12", &PrivacyPolicy::hash()).unwrap();
        assert!(pii_detector::detect(&once).is_empty());
        let twice = anonymize(&once, &PrivacyPolicy::hash()).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_remove() {
        let result = anonymize("ส่งโดย เด็กหญิง ดาว รหัส: 991", &PrivacyPolicy::remove()).unwrap();
        assert_eq!(result, "ส่งโดย  ");
    }

    #[test]
    fn test_resolve_overlaps_prefers_confidence_then_category() {
        let span = |category: PiiCategory, start, end, confidence| PiiSpan {
            kind: category.kind(),
            category,
            text: String::new(),
            start,
            end,
            confidence,
        };
        let resolved = resolve_overlaps(vec![
            span(PiiCategory::NumericId, 10, 18, 0.6),
            span(PiiCategory::StudentCode, 0, 18, 0.9),
            span(PiiCategory::CollegeName, 30, 40, 0.8),
            span(PiiCategory::UniversityName, 25, 40, 0.8),
        ]);

        let categories: Vec<PiiCategory> = resolved.iter().map(|s| s.category).collect();
        assert_eq!(
            categories,
            vec![PiiCategory::StudentCode, PiiCategory::UniversityName]
        );
        assert!(resolved.iter().all(|s| s.kind != PiiKind::PersonalName));
    }
}
