//! 隐私报告服务
//!
//! 汇总一次匿名化的检测情况并给出隐私评分（1.0 表示无风险）。

use std::collections::BTreeMap;

use crate::models::privacy::{PiiKind, PiiSpan, PrivacyPolicy, PrivacyReport, SafetyReport};
use crate::services::pii_detector;

/// 配置了占位符规则时的加分
const REDACTION_RULES_BONUS: f64 = 0.2;
/// 外发安全校验的默认阈值
pub const DEFAULT_SAFETY_THRESHOLD: f64 = 0.7;

/// 生成隐私报告
///
/// 检测基于原文进行，长度统计按字符计。
pub fn privacy_report(original: &str, filtered: &str, policy: &PrivacyPolicy) -> PrivacyReport {
    let detections = pii_detector::detect(original);
    let original_length = original.chars().count();
    let filtered_length = filtered.chars().count();

    let mut summary: BTreeMap<PiiKind, usize> = BTreeMap::new();
    for span in &detections {
        *summary.entry(span.kind).or_insert(0) += 1;
    }

    PrivacyReport {
        original_length,
        filtered_length,
        chars_redacted: original_length as i64 - filtered_length as i64,
        detections_count: detections.len(),
        privacy_score: calculate_privacy_score(&detections, policy),
        rules_applied: policy.rules_applied(),
        summary,
        detections,
    }
}

/// 隐私评分
///
/// 从 1.0 开始，每个检测项扣除 `类别权重 × 置信度`；配置了替换规则时加 0.2。
pub fn calculate_privacy_score(detections: &[PiiSpan], policy: &PrivacyPolicy) -> f64 {
    if detections.is_empty() {
        return 1.0;
    }

    let penalty: f64 = detections
        .iter()
        .map(|span| span.kind.penalty() * span.confidence)
        .sum();

    let bonus = if policy.redaction_rules.is_empty() {
        0.0
    } else {
        REDACTION_RULES_BONUS
    };

    (1.0 - penalty + bonus).clamp(0.0, 1.0)
}

/// 判断文本能否直接发往外部 API
pub fn validate_api_safety(text: &str, threshold: f64) -> SafetyReport {
    let detections = pii_detector::detect(text);
    let privacy_score = calculate_privacy_score(&detections, &PrivacyPolicy::default());

    let high_risk_detections = detections
        .iter()
        .filter(|span| {
            span.confidence > 0.8
                && matches!(span.kind, PiiKind::PersonalName | PiiKind::Identifier)
        })
        .cloned()
        .collect();

    SafetyReport {
        privacy_score,
        is_safe: privacy_score >= threshold,
        threshold,
        detections_count: detections.len(),
        high_risk_detections,
    }
}
