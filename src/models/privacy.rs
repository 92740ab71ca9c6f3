//! 隐私相关的数据模型
//!
//! 检测结果 `PiiSpan`、隐私报告以及匿名化策略 `PrivacyPolicy`。

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::error::ConfigError;

/// 敏感信息大类
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiKind {
    PersonalName,
    Identifier,
    Institution,
}

impl PiiKind {
    /// 哈希占位符中使用的大写标签
    pub fn tag(&self) -> &'static str {
        match self {
            Self::PersonalName => "PERSONAL_NAME",
            Self::Identifier => "IDENTIFIER",
            Self::Institution => "INSTITUTION",
        }
    }

    /// 隐私评分中每个检测项的扣分权重
    pub fn penalty(&self) -> f64 {
        match self {
            Self::PersonalName => 0.3,
            Self::Identifier => 0.4,
            Self::Institution => 0.2,
        }
    }
}

impl fmt::Display for PiiKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PersonalName => write!(f, "personal_name"),
            Self::Identifier => write!(f, "identifier"),
            Self::Institution => write!(f, "institution"),
        }
    }
}

/// 检测规则细分类别
///
/// 声明顺序即冲突消解时的优先级顺序。
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PiiCategory {
    NameField,
    ThaiNameMale,
    ThaiNameFemale,
    ThaiNameMarried,
    ChildNameMale,
    ChildNameFemale,
    StudentId,
    NumberId,
    StudentCode,
    ThaiNationalId,
    NumericId,
    SchoolName,
    UniversityName,
    CollegeName,
}

impl PiiCategory {
    pub fn kind(&self) -> PiiKind {
        match self {
            Self::NameField
            | Self::ThaiNameMale
            | Self::ThaiNameFemale
            | Self::ThaiNameMarried
            | Self::ChildNameMale
            | Self::ChildNameFemale => PiiKind::PersonalName,
            Self::StudentId
            | Self::NumberId
            | Self::StudentCode
            | Self::ThaiNationalId
            | Self::NumericId => PiiKind::Identifier,
            Self::SchoolName | Self::UniversityName | Self::CollegeName => PiiKind::Institution,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NameField => "name_field",
            Self::ThaiNameMale => "thai_name_male",
            Self::ThaiNameFemale => "thai_name_female",
            Self::ThaiNameMarried => "thai_name_married",
            Self::ChildNameMale => "child_name_male",
            Self::ChildNameFemale => "child_name_female",
            Self::StudentId => "student_id",
            Self::NumberId => "number_id",
            Self::StudentCode => "student_code",
            Self::ThaiNationalId => "thai_national_id",
            Self::NumericId => "numeric_id",
            Self::SchoolName => "school_name",
            Self::UniversityName => "university_name",
            Self::CollegeName => "college_name",
        }
    }
}

impl fmt::Display for PiiCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次检测命中
///
/// `start`/`end` 是 UTF-8 字节偏移，覆盖整个命中区域；
/// `text` 是敏感值本身（规则有捕获组时取捕获组）。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub kind: PiiKind,
    pub category: PiiCategory,
    pub text: String,
    pub start: usize,
    pub end: usize,
    pub confidence: f64,
}

impl PiiSpan {
    pub fn overlaps(&self, other: &PiiSpan) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn len(&self) -> usize {
        self.end - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }
}

/// 隐私过滤报告
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrivacyReport {
    /// 原文字符数
    pub original_length: usize,
    /// 过滤后字符数
    pub filtered_length: usize,
    /// 被删减的字符数（可能为负：占位符比原文长）
    pub chars_redacted: i64,
    pub detections_count: usize,
    pub detections: Vec<PiiSpan>,
    pub rules_applied: Vec<String>,
    /// 1.0 表示无风险
    pub privacy_score: f64,
    pub summary: BTreeMap<PiiKind, usize>,
}

/// 外发前的安全校验结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub privacy_score: f64,
    pub is_safe: bool,
    pub threshold: f64,
    pub detections_count: usize,
    pub high_risk_detections: Vec<PiiSpan>,
}

/// 匿名化方法
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnonymizationMethod {
    Placeholder,
    Hash,
    Remove,
}

impl FromStr for AnonymizationMethod {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "placeholder" => Ok(Self::Placeholder),
            "hash" => Ok(Self::Hash),
            "remove" => Ok(Self::Remove),
            _ => Err(ConfigError::UnknownMethod(s.to_string())),
        }
    }
}

impl fmt::Display for AnonymizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Placeholder => write!(f, "placeholder"),
            Self::Hash => write!(f, "hash"),
            Self::Remove => write!(f, "remove"),
        }
    }
}

/// 姓名的默认占位符
pub const DEFAULT_NAME_PLACEHOLDER: &str = "[STUDENT]";
/// 编号的默认占位符
pub const DEFAULT_ID_PLACEHOLDER: &str = "[ID]";

/// 占位符替换规则
///
/// 未设置的项在 placeholder 方法下使用默认占位符。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedactionRules {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_names: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replace_ids: Option<String>,
}

impl RedactionRules {
    pub fn is_empty(&self) -> bool {
        self.replace_names.is_none() && self.replace_ids.is_none()
    }

    pub fn name_placeholder(&self) -> &str {
        self.replace_names
            .as_deref()
            .unwrap_or(DEFAULT_NAME_PLACEHOLDER)
    }

    pub fn id_placeholder(&self) -> &str {
        self.replace_ids.as_deref().unwrap_or(DEFAULT_ID_PLACEHOLDER)
    }
}

/// 匿名化策略
///
/// 空策略表示不做任何处理；有规则但未指定 `method` 时按 placeholder 处理。
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivacyPolicy {
    /// 字符串形式保存，非法值在使用时才报 `ConfigError`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sensitive_patterns: Vec<String>,
    #[serde(default, skip_serializing_if = "RedactionRules::is_empty")]
    pub redaction_rules: RedactionRules,
}

impl PrivacyPolicy {
    /// 默认占位符策略：姓名 → `[STUDENT]`，编号 → `[ID]`
    pub fn placeholder() -> Self {
        Self {
            method: Some(AnonymizationMethod::Placeholder.to_string()),
            sensitive_patterns: Vec::new(),
            redaction_rules: RedactionRules {
                replace_names: Some(DEFAULT_NAME_PLACEHOLDER.to_string()),
                replace_ids: Some(DEFAULT_ID_PLACEHOLDER.to_string()),
            },
        }
    }

    pub fn hash() -> Self {
        Self::with_method(AnonymizationMethod::Hash)
    }

    pub fn remove() -> Self {
        Self::with_method(AnonymizationMethod::Remove)
    }

    fn with_method(method: AnonymizationMethod) -> Self {
        Self {
            method: Some(method.to_string()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.method.is_none() && self.sensitive_patterns.is_empty() && self.redaction_rules.is_empty()
    }

    /// 解析匿名化方法；空策略返回 `None`
    pub fn resolve_method(&self) -> Result<Option<AnonymizationMethod>, ConfigError> {
        match &self.method {
            Some(method) => method.parse().map(Some),
            None if self.is_empty() => Ok(None),
            None => Ok(Some(AnonymizationMethod::Placeholder)),
        }
    }

    /// 已启用的策略段名称
    pub fn rules_applied(&self) -> Vec<String> {
        let mut applied = Vec::new();
        if self.method.is_some() {
            applied.push("method".to_string());
        }
        if !self.sensitive_patterns.is_empty() {
            applied.push("sensitive_patterns".to_string());
        }
        if !self.redaction_rules.is_empty() {
            applied.push("redaction_rules".to_string());
        }
        applied
    }
}
