//! 回复规范化服务 - 业务能力层
//!
//! 只负责"把任意模型回复变成 GradingRecord"能力
//!
//! 流程：
//! 1. 取第一个 `{` 到最后一个 `}` 之间的文本，尝试按结构化回复解析
//! 2. 失败则按顺序匹配分数模式（`n/100`、`คะแนน`、`score`），都不命中时默认 50 分
//! 3. 结构化路径按后端类别计算置信度，兜底路径固定 0.3
//!
//! 解析结果只在 [`ParsedReply::parse`] 中判定一次，下游不再检查原始文本。

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;
use tracing::{debug, error, warn};

use crate::clients::{BackendKind, RawReply};
use crate::error::ParseError;
use crate::models::grading::{
    clamp_confidence, clamp_score, Breakdown, GradingRecord, ParsingMethod,
};
use crate::utils::logging::truncate_text;

/// 找不到任何分数时的默认分
pub const DEFAULT_FALLBACK_SCORE: f64 = 50.0;
/// 兜底解析的固定置信度
pub const FALLBACK_CONFIDENCE: f64 = 0.3;

const BREAKDOWN_BONUS: f64 = 0.2;
const DETAILED_FEEDBACK_BONUS: f64 = 0.1;
const DETAILED_FEEDBACK_CHARS: usize = 100;
const COMPLETION_TOKENS_BONUS: f64 = 0.1;
const COMPLETION_TOKENS_THRESHOLD: u32 = 50;

/// 兜底分数模式，按顺序取第一个命中的；阿拉伯数字与泰文数字都接受
const SCORE_PATTERNS: &[&str] = &[
    r"([0-9๐-๙]+(?:\.[0-9๐-๙]+)?)\s*/\s*(?:100|๑๐๐)",
    r"คะแนน[:\s]*([0-9๐-๙]+(?:\.[0-9๐-๙]+)?)",
    r"score[:\s]*([0-9๐-๙]+(?:\.[0-9๐-๙]+)?)",
];

static SCORE_RULES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    SCORE_PATTERNS
        .iter()
        .filter_map(|pattern| {
            match RegexBuilder::new(pattern).case_insensitive(true).build() {
                Ok(regex) => Some(regex),
                Err(e) => {
                    error!("分数模式编译失败: {}", e);
                    None
                }
            }
        })
        .collect()
});

/// 结构化回复中的分项得分，缺失项按 0 计
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RawBreakdown {
    #[serde(default, deserialize_with = "lenient_number")]
    pub accuracy: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub method: Option<f64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub presentation: Option<f64>,
}

impl From<RawBreakdown> for Breakdown {
    fn from(raw: RawBreakdown) -> Self {
        Self {
            accuracy: raw.accuracy.unwrap_or(0.0),
            method: raw.method.unwrap_or(0.0),
            presentation: raw.presentation.unwrap_or(0.0),
        }
    }
}

/// 结构化回复字段
///
/// 数字字段接受数字或数字字符串；文本字段接受字符串或字符串数组。
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct StructuredReply {
    #[serde(default, deserialize_with = "lenient_number")]
    pub total_score: Option<f64>,
    #[serde(default)]
    pub breakdown: Option<RawBreakdown>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub feedback: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub strengths: Option<String>,
    #[serde(default, deserialize_with = "lenient_text")]
    pub improvements: Option<String>,
}

/// 解析后的回复
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Structured(StructuredReply),
    Fallback {
        text: String,
        extracted_score: Option<f64>,
    },
}

impl ParsedReply {
    /// 判定回复形态
    pub fn parse(content: &str) -> Self {
        match parse_structured(content) {
            Ok(reply) => ParsedReply::Structured(reply),
            Err(e) => {
                debug!("结构化解析失败，改用兜底解析: {}", e);
                ParsedReply::Fallback {
                    text: content.to_string(),
                    extracted_score: extract_fallback_score(content),
                }
            }
        }
    }

    pub fn parsing_method(&self) -> ParsingMethod {
        match self {
            Self::Structured(_) => ParsingMethod::Structured,
            Self::Fallback { .. } => ParsingMethod::Fallback,
        }
    }
}

/// 取第一个 `{` 到最后一个 `}`，按结构化回复解析
pub fn parse_structured(content: &str) -> Result<StructuredReply, ParseError> {
    if content.trim().is_empty() {
        return Err(ParseError::EmptyReply);
    }

    let start = content.find('{').ok_or(ParseError::NoStructuredBlock)?;
    let end = content.rfind('}').ok_or(ParseError::NoStructuredBlock)?;
    if end <= start {
        return Err(ParseError::NoStructuredBlock);
    }

    Ok(serde_json::from_str(&content[start..=end])?)
}

/// 按顺序匹配分数模式，返回第一个命中的分数
pub fn extract_fallback_score(text: &str) -> Option<f64> {
    SCORE_RULES.iter().find_map(|regex| {
        regex
            .captures(text)
            .and_then(|caps| caps.get(1))
            .and_then(|m| to_ascii_digits(m.as_str()).parse::<f64>().ok())
    })
}

/// 泰文数字 ๐–๙ 转为 0–9
fn to_ascii_digits(number: &str) -> String {
    number
        .chars()
        .map(|c| match c {
            '๐'..='๙' => char::from(b'0' + (c as u32 - '๐' as u32) as u8),
            _ => c,
        })
        .collect()
}

/// 将原始回复规范化为评分记录
pub fn normalize(raw: &RawReply, model_id: &str) -> GradingRecord {
    let parsed = ParsedReply::parse(&raw.content);
    let parsing_method = parsed.parsing_method();

    let record = match parsed {
        ParsedReply::Structured(reply) => {
            let confidence = structured_confidence(&reply, raw);
            GradingRecord {
                total_score: clamp_score(reply.total_score.unwrap_or(0.0)),
                breakdown: reply.breakdown.map(Breakdown::from),
                feedback: reply.feedback.unwrap_or_default(),
                strengths: reply.strengths,
                improvements: reply.improvements,
                confidence,
                parsing_method: Some(parsing_method),
                usage: raw.usage,
                ..GradingRecord::new(model_id)
            }
        }
        ParsedReply::Fallback {
            text,
            extracted_score,
        } => {
            warn!(
                "模型 {} 未返回结构化结果，使用兜底解析: {}",
                model_id,
                truncate_text(&text, 60)
            );
            GradingRecord {
                total_score: clamp_score(extracted_score.unwrap_or(DEFAULT_FALLBACK_SCORE)),
                feedback: text,
                confidence: FALLBACK_CONFIDENCE,
                parsing_method: Some(parsing_method),
                usage: raw.usage,
                ..GradingRecord::new(model_id)
            }
        }
    };

    record.clamped()
}

/// 结构化回复的置信度
///
/// 后端基础值 + 分项得分 0.2 + 详细反馈 0.1 + (仅 API) 补全 token 数 0.1
pub fn structured_confidence(reply: &StructuredReply, raw: &RawReply) -> f64 {
    let mut confidence = raw.backend.base_confidence();

    if reply.breakdown.is_some() {
        confidence += BREAKDOWN_BONUS;
    }

    let feedback_chars = reply
        .feedback
        .as_deref()
        .map(|f| f.chars().count())
        .unwrap_or(0);
    if feedback_chars > DETAILED_FEEDBACK_CHARS {
        confidence += DETAILED_FEEDBACK_BONUS;
    }

    if raw.backend == BackendKind::Api {
        let completion_tokens = raw.usage.map(|u| u.completion_tokens).unwrap_or(0);
        if completion_tokens > COMPLETION_TOKENS_THRESHOLD {
            confidence += COMPLETION_TOKENS_BONUS;
        }
    }

    clamp_confidence(confidence)
}

fn lenient_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::Number(n)) => Ok(n.as_f64()),
        Some(JsonValue::String(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected a number, got '{}'", s))),
        Some(other) => Err(D::Error::custom(format!("expected a number, got {}", other))),
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    match Option::<JsonValue>::deserialize(deserializer)? {
        None | Some(JsonValue::Null) => Ok(None),
        Some(JsonValue::String(s)) => Ok(Some(s)),
        Some(JsonValue::Number(n)) => Ok(Some(n.to_string())),
        Some(JsonValue::Array(items)) => {
            let lines: Option<Vec<String>> = items
                .into_iter()
                .map(|item| match item {
                    JsonValue::String(s) => Some(s),
                    JsonValue::Number(n) => Some(n.to_string()),
                    _ => None,
                })
                .collect();
            lines
                .map(|lines| Some(lines.join("\n")))
                .ok_or_else(|| D::Error::custom("expected a list of strings"))
        }
        Some(other) => Err(D::Error::custom(format!("expected text, got {}", other))),
    }
}
