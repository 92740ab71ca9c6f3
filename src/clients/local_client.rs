/// 本地模型客户端
///
/// 通过 Ollama HTTP 接口调用本机模型，文本不出本机，因此不做隐私处理。
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::{prompt, BackendAdapter, BackendKind, RawReply};
use crate::config::LocalBackendConfig;
use crate::error::{ConfigError, TransportError};
use crate::models::grading::GradingContext;

/// 探测类请求使用更短的超时
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    num_predict: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

#[derive(Debug, Deserialize)]
struct TagsResponse {
    #[serde(default)]
    models: Vec<TagEntry>,
}

#[derive(Debug, Deserialize)]
struct TagEntry {
    name: String,
}

/// 本地 Ollama 客户端
#[derive(Debug, Clone)]
pub struct LocalModelClient {
    http: reqwest::Client,
    model: String,
    endpoint: String,
    temperature: f32,
    max_tokens: Option<u32>,
    timeout_secs: u64,
}

impl LocalModelClient {
    /// 创建新的本地客户端
    pub fn new(config: &LocalBackendConfig) -> Result<Self, ConfigError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            http,
            model: config.model.clone(),
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    fn map_send_error(&self, err: reqwest::Error) -> TransportError {
        if err.is_timeout() {
            TransportError::timeout("ollama", self.timeout_secs)
        } else {
            TransportError::from(err)
        }
    }

    async fn fetch_tags(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::with_status(
                response.status().as_u16(),
                "Ollama tags request failed",
            ));
        }

        let tags: TagsResponse = response.json().await?;
        Ok(tags.models.into_iter().map(|m| m.name).collect())
    }
}

#[async_trait]
impl BackendAdapter for LocalModelClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Local
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn grade(&self, text: &str, context: &GradingContext) -> Result<RawReply, TransportError> {
        let prompt = prompt::build_local_prompt(text, context);
        debug!("调用本地模型，模型: {}", self.model);
        debug!("prompt 长度: {} 字符", prompt.chars().count());

        let request = GenerateRequest {
            model: &self.model,
            prompt: &prompt,
            stream: false,
            options: GenerateOptions {
                temperature: self.temperature,
                num_predict: self.max_tokens,
            },
        };

        let response = self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .json(&request)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!("本地模型返回错误状态: {}", status);
            return Err(TransportError::with_status(
                status.as_u16(),
                format!("Ollama API error: {}", body),
            ));
        }

        let generated: GenerateResponse = response
            .json()
            .await
            .map_err(|e| self.map_send_error(e))?;

        debug!("本地模型调用成功，回复 {} 字符", generated.response.chars().count());

        Ok(RawReply::new(generated.response, BackendKind::Local))
    }

    async fn list_models(&self) -> Vec<String> {
        match self.fetch_tags().await {
            Ok(models) => models,
            Err(e) => {
                warn!("获取本地模型列表失败: {}", e);
                Vec::new()
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.fetch_tags().await.is_ok()
    }
}
