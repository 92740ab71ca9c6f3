//! PII 检测服务 - 业务能力层
//!
//! 只负责"找出敏感片段"能力，不做任何替换
//!
//! ## 规则表
//! - 姓名：`ชื่อ:` 标签字段，以及四类称谓（นาย / นางสาว / นาง / เด็กชาย / เด็กหญิง）
//! - 编号：带标签的编号字段、13 位身份证号、8–12 位长数字串（置信度较低）
//! - 机构：学校 / 大学 / 学院前缀
//!
//! 各类别互不抑制，同一段文本可能被多条规则命中，冲突消解交给匿名化服务。

use regex::{Regex, RegexBuilder};
use std::sync::LazyLock;
use tracing::{debug, error};

use crate::models::privacy::{PiiCategory, PiiSpan};

/// 带标签字段及称谓的置信度
const LABELLED_CONFIDENCE: f64 = 0.9;
/// 裸长数字串误报率高
const NUMERIC_RUN_CONFIDENCE: f64 = 0.6;
const INSTITUTION_CONFIDENCE: f64 = 0.8;

/// 单条检测规则
struct DetectionRule {
    category: PiiCategory,
    regex: Regex,
    confidence: f64,
}

/// (类别, 模式, 置信度)；模式中的捕获组 1 即敏感值
const RULE_TABLE: &[(PiiCategory, &str, f64)] = &[
    (PiiCategory::NameField, r"ชื่อ\s*[:：]\s*(\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::ThaiNameMale, r"(นาย\s+\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::ThaiNameFemale, r"(นางสาว\s+\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::ThaiNameMarried, r"(นาง\s+\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::ChildNameMale, r"(เด็กชาย\s+\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::ChildNameFemale, r"(เด็กหญิง\s+\S+)", LABELLED_CONFIDENCE),
    (PiiCategory::StudentId, r"รหัส\s*[:：]\s*([0-9]+)", LABELLED_CONFIDENCE),
    (PiiCategory::NumberId, r"เลขที่\s*[:：]\s*([0-9]+)", LABELLED_CONFIDENCE),
    (PiiCategory::StudentCode, r"รหัสนักเรียน\s*[:：]\s*([0-9]+)", LABELLED_CONFIDENCE),
    (PiiCategory::ThaiNationalId, r"\b([0-9]{13})\b", LABELLED_CONFIDENCE),
    (PiiCategory::NumericId, r"\b([0-9]{8,12})\b", NUMERIC_RUN_CONFIDENCE),
    (PiiCategory::SchoolName, r"โรงเรียน\S+", INSTITUTION_CONFIDENCE),
    (PiiCategory::UniversityName, r"มหาวิทยาลัย\S+", INSTITUTION_CONFIDENCE),
    (PiiCategory::CollegeName, r"วิทยาลัย\S+", INSTITUTION_CONFIDENCE),
];

static RULES: LazyLock<Vec<DetectionRule>> = LazyLock::new(|| {
    RULE_TABLE
        .iter()
        .filter_map(|&(category, pattern, confidence)| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Some(DetectionRule {
                    category,
                    regex,
                    confidence,
                }),
                Err(e) => {
                    error!("检测规则 {} 编译失败: {}", category, e);
                    None
                }
            }
        })
        .collect()
});

/// 扫描文本中的敏感信息
///
/// 纯函数：结果按起始偏移排序（稳定排序，同位置保持规则表顺序），不去重。
pub fn detect(text: &str) -> Vec<PiiSpan> {
    let mut spans = Vec::new();

    for rule in RULES.iter() {
        for caps in rule.regex.captures_iter(text) {
            let Some(whole) = caps.get(0) else {
                continue;
            };
            let value = caps.get(1).unwrap_or(whole);
            spans.push(PiiSpan {
                kind: rule.category.kind(),
                category: rule.category,
                text: value.as_str().to_string(),
                start: whole.start(),
                end: whole.end(),
                confidence: rule.confidence,
            });
        }
    }

    spans.sort_by_key(|span| span.start);

    debug!("PII 检测完成: {} 处命中", spans.len());
    spans
}

/// 文本中是否存在任何可检测的敏感信息
pub fn contains_pii(text: &str) -> bool {
    RULES.iter().any(|rule| rule.regex.is_match(text))
}
