//! 评分相关的数据模型
//!
//! `GradingRecord` 是整个流水线唯一的输出形态，无论走结构化解析、兜底解析
//! 还是错误路径，都会经过 [`GradingRecord::clamped`] 保证分数与置信度范围。

use serde::{Deserialize, Serialize};

/// 作业上下文（由调用方提供，只读）
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradingContext {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grading_criteria: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub standard_answer: Option<String>,
}

impl GradingContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_question(mut self, question: impl Into<String>) -> Self {
        self.question = Some(question.into());
        self
    }

    pub fn with_criteria(mut self, criteria: impl Into<String>) -> Self {
        self.grading_criteria = Some(criteria.into());
        self
    }

    pub fn with_standard_answer(mut self, answer: impl Into<String>) -> Self {
        self.standard_answer = Some(answer.into());
        self
    }
}

/// 分项得分
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Breakdown {
    pub accuracy: f64,
    pub method: f64,
    pub presentation: f64,
}

/// 解析方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParsingMethod {
    Structured,
    Fallback,
}

/// API 后端返回的 token 用量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// 规范化后的评分记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingRecord {
    /// 总分，范围 [0, 100]
    pub total_score: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<Breakdown>,
    pub feedback: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub strengths: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improvements: Option<String>,
    /// 置信度，范围 [0, 1]
    pub confidence: f64,
    pub model_used: String,
    /// 错误记录没有解析方式
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parsing_method: Option<ParsingMethod>,
    pub error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
    /// 混合模式下的本地结果
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub local_result: Option<Box<GradingRecord>>,
    /// 混合模式下的 API 结果
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_result: Option<Box<GradingRecord>>,
    pub graded_at: String,
}

impl GradingRecord {
    /// 构造一条空白记录，其余字段由调用方填充
    pub fn new(model_used: impl Into<String>) -> Self {
        Self {
            total_score: 0.0,
            breakdown: None,
            feedback: String::new(),
            strengths: None,
            improvements: None,
            confidence: 0.0,
            model_used: model_used.into(),
            parsing_method: None,
            error: false,
            error_message: None,
            usage: None,
            local_result: None,
            api_result: None,
            graded_at: chrono::Local::now().to_rfc3339(),
        }
    }

    /// 构造错误记录：分数 0，置信度 0.0
    pub fn error(model_used: impl Into<String>, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            feedback: message.clone(),
            error: true,
            error_message: Some(message),
            ..Self::new(model_used)
        }
    }

    /// 强制执行记录不变量
    pub fn clamped(mut self) -> Self {
        if self.error {
            self.total_score = 0.0;
            self.confidence = 0.0;
            return self;
        }
        self.total_score = clamp_score(self.total_score);
        self.confidence = clamp_confidence(self.confidence);
        self
    }

    pub fn is_structured(&self) -> bool {
        self.parsing_method == Some(ParsingMethod::Structured)
    }
}

/// 分数截断到 [0, 100]，NaN 视为 0
pub fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        return 0.0;
    }
    score.clamp(0.0, 100.0)
}

/// 置信度截断到 [0, 1] 并保留两位小数
pub fn clamp_confidence(confidence: f64) -> f64 {
    if confidence.is_nan() {
        return 0.0;
    }
    (confidence.clamp(0.0, 1.0) * 100.0).round() / 100.0
}
