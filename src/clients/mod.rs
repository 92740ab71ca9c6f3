//! 后端客户端层
//!
//! 每个评分后端实现同一个能力接口 [`BackendAdapter`]：
//! - `LocalModelClient` - 本地 Ollama 服务
//! - `RemoteApiClient` - 兼容 OpenAI 的远程 API
//!
//! 客户端只负责"发请求、拿原始回复"，超时由客户端自己持有，
//! 不做解析、不做重试、不做隐私处理。

pub mod api_client;
pub mod local_client;
pub mod prompt;

use async_trait::async_trait;
use std::fmt;

use crate::error::TransportError;
use crate::models::grading::{GradingContext, TokenUsage};

pub use api_client::RemoteApiClient;
pub use local_client::LocalModelClient;

/// 后端类别，决定结构化回复的基础置信度
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Local,
    Api,
}

impl BackendKind {
    /// API 后端对输出格式的遵循度更高
    pub fn base_confidence(&self) -> f64 {
        match self {
            Self::Local => 0.5,
            Self::Api => 0.6,
        }
    }

    /// 该类后端是否会把文本送出本机
    pub fn is_remote(&self) -> bool {
        matches!(self, Self::Api)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Api => write!(f, "api"),
        }
    }
}

/// 后端原始回复
#[derive(Debug, Clone, PartialEq)]
pub struct RawReply {
    /// 模型生成的文本
    pub content: String,
    /// token 用量（仅 API 后端提供）
    pub usage: Option<TokenUsage>,
    pub backend: BackendKind,
}

impl RawReply {
    pub fn new(content: impl Into<String>, backend: BackendKind) -> Self {
        Self {
            content: content.into(),
            usage: None,
            backend,
        }
    }

    pub fn with_usage(mut self, usage: TokenUsage) -> Self {
        self.usage = Some(usage);
        self
    }
}

/// 评分后端能力接口
#[async_trait]
pub trait BackendAdapter: Send + Sync {
    fn kind(&self) -> BackendKind;

    fn model_id(&self) -> &str;

    /// 发送一次评分请求；非 2xx、超时、网络失败都返回 `TransportError`
    async fn grade(&self, text: &str, context: &GradingContext) -> Result<RawReply, TransportError>;

    /// 列出后端可用模型，失败时返回空列表
    async fn list_models(&self) -> Vec<String>;

    /// 探测后端是否可达
    async fn test_connection(&self) -> bool;
}
