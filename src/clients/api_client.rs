//! 远程 API 客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行聊天补全调用
//! - 支持自定义 API 端点和模型
//! - 兼容 OpenAI API 的服务
//!
//! 密钥在构建时从环境变量读取一次；`Debug` 输出不包含密钥。

use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use serde::Deserialize;
use std::fmt;
use std::time::Duration;
use tracing::{debug, warn};

use crate::clients::{prompt, BackendAdapter, BackendKind, RawReply};
use crate::config::RemoteBackendConfig;
use crate::error::{ConfigError, TransportError};
use crate::models::grading::{GradingContext, TokenUsage};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct ModelList {
    #[serde(default)]
    data: Vec<ModelEntry>,
}

#[derive(Debug, Deserialize)]
struct ModelEntry {
    id: String,
}

/// 兼容 OpenAI 的远程评分客户端
#[derive(Clone)]
pub struct RemoteApiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
    timeout_secs: u64,
}

impl fmt::Debug for RemoteApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RemoteApiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("api_key", &"***")
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

impl RemoteApiClient {
    /// 创建新的远程客户端
    ///
    /// 凭据缺失时立即返回 `ConfigError::MissingCredential`。
    pub fn new(config: &RemoteBackendConfig) -> Result<Self, ConfigError> {
        let api_key = config.resolve_api_key()?;
        Self::with_api_key(config, api_key)
    }

    /// 使用显式密钥创建客户端
    pub fn with_api_key(
        config: &RemoteBackendConfig,
        api_key: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let api_key = api_key.into();
        let base_url = config.base_url.trim_end_matches('/').to_string();

        // 配置 OpenAI 客户端（兼容 OpenAI API 的服务）
        let openai_config = OpenAIConfig::new()
            .with_api_key(&api_key)
            .with_api_base(&base_url);

        let http = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .build()
            .map_err(|e| ConfigError::HttpClient(e.to_string()))?;

        Ok(Self {
            client: Client::with_config(openai_config),
            http,
            api_key,
            base_url,
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
            timeout_secs: config.timeout_secs,
        })
    }

    /// 发送一次聊天补全请求，返回 (内容, 用量)
    async fn send_chat(
        &self,
        user_message: &str,
        system_message: &str,
    ) -> Result<(String, Option<TokenUsage>), TransportError> {
        debug!("调用远程 API，模型: {}", self.model);
        debug!("用户消息长度: {} 字符", user_message.chars().count());

        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(system_message)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build request: {}", e)))?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(user_message)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build request: {}", e)))?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(self.max_tokens)
            .build()
            .map_err(|e| TransportError::new(format!("failed to build request: {}", e)))?;

        // 调用 API，超时由本客户端持有
        let response = tokio::time::timeout(
            Duration::from_secs(self.timeout_secs),
            self.client.chat().create(request),
        )
        .await
        .map_err(|_| TransportError::timeout("remote API", self.timeout_secs))?
        .map_err(|e| {
            warn!("远程 API 调用失败: {}", e);
            TransportError::new(format!("OpenAI API error: {}", e))
        })?;

        debug!("远程 API 调用成功");

        let usage = response.usage.as_ref().map(|u| TokenUsage {
            prompt_tokens: u.prompt_tokens,
            completion_tokens: u.completion_tokens,
            total_tokens: u.total_tokens,
        });

        // 提取响应内容
        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .ok_or_else(|| TransportError::new("OpenAI API returned empty content"))?;

        Ok((content.trim().to_string(), usage))
    }

    async fn fetch_models(&self) -> Result<Vec<String>, TransportError> {
        let response = self
            .http
            .get(format!("{}/models", self.base_url))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(TransportError::with_status(
                response.status().as_u16(),
                "model list request failed",
            ));
        }

        let list: ModelList = response.json().await?;
        Ok(list.data.into_iter().map(|m| m.id).collect())
    }
}

#[async_trait]
impl BackendAdapter for RemoteApiClient {
    fn kind(&self) -> BackendKind {
        BackendKind::Api
    }

    fn model_id(&self) -> &str {
        &self.model
    }

    async fn grade(&self, text: &str, context: &GradingContext) -> Result<RawReply, TransportError> {
        let (user_message, system_message) = prompt::build_api_messages(text, context);
        let (content, usage) = self.send_chat(&user_message, &system_message).await?;

        let reply = RawReply::new(content, BackendKind::Api);
        Ok(match usage {
            Some(usage) => reply.with_usage(usage),
            None => reply,
        })
    }

    /// 只保留 id 中含 `gpt` 的模型
    async fn list_models(&self) -> Vec<String> {
        match self.fetch_models().await {
            Ok(models) => models.into_iter().filter(|id| id.contains("gpt")).collect(),
            Err(e) => {
                warn!("获取远程模型列表失败: {}", e);
                Vec::new()
            }
        }
    }

    async fn test_connection(&self) -> bool {
        self.fetch_models().await.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_config() -> RemoteBackendConfig {
        RemoteBackendConfig {
            base_url: "http://127.0.0.1:9/v1/".to_string(),
            timeout_secs: 2,
            ..RemoteBackendConfig::default()
        }
    }

    #[test]
    fn test_debug_hides_api_key() {
        let client = RemoteApiClient::with_api_key(&test_config(), "sk-very-secret").unwrap();
        let debug = format!("{:?}", client);

        assert!(!debug.contains("sk-very-secret"));
        assert!(debug.contains("***"));
        assert_eq!(client.base_url, "http://127.0.0.1:9/v1");
    }

    #[test]
    fn test_missing_credential_fails_at_construction() {
        let config = RemoteBackendConfig {
            api_key_env: "PRIVACY_GRADER_TEST_NO_SUCH_KEY".to_string(),
            ..test_config()
        };
        assert!(matches!(
            RemoteApiClient::new(&config),
            Err(ConfigError::MissingCredential { .. })
        ));
    }

    #[tokio::test]
    async fn test_unreachable_api() {
        let client = RemoteApiClient::with_api_key(&test_config(), "sk-test").unwrap();
        assert!(!client.test_connection().await);
        assert!(client.list_models().await.is_empty());
    }

    #[tokio::test]
    async fn test_timeout_is_transport_error() {
        // 接受连接但从不回复
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = RemoteBackendConfig {
            base_url: format!("http://{}/v1", addr),
            timeout_secs: 1,
            ..RemoteBackendConfig::default()
        };
        let client = RemoteApiClient::with_api_key(&config, "sk-test").unwrap();

        let err = client
            .grade("[STUDENT] ตอบ 4", &GradingContext::default())
            .await
            .unwrap_err();
        assert_eq!(err.status, None);
        assert_eq!(err.to_string(), "remote API request timed out after 1s");
    }

    /// 需要设置 OPENAI_API_KEY
    #[tokio::test]
    #[ignore]
    async fn test_live_api() {
        let _ = tracing_subscriber::fmt::try_init();
        let client = RemoteApiClient::new(&RemoteBackendConfig::default()).unwrap();
        let reply = client
            .grade("[STUDENT] ตอบว่า น้ำระเหยเป็นไอ", &GradingContext::default())
            .await
            .unwrap();
        println!("{}", reply.content);
        assert!(reply.usage.is_some());
    }
}
