use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::models::privacy::PrivacyPolicy;

/// 程序配置
///
/// 启动时构建一次，按引用传入各个后端客户端。
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// 默认评分模式（local / remote / combined）
    pub default_backend: String,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 本地模型（Ollama）配置
    pub local: LocalBackendConfig,
    /// 远程 API 配置
    pub remote: RemoteBackendConfig,
    /// 发往远程 API 前的隐私策略
    pub privacy: PrivacyPolicy,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_backend: "local".to_string(),
            verbose_logging: false,
            local: LocalBackendConfig::default(),
            remote: RemoteBackendConfig::default(),
            privacy: PrivacyPolicy::default(),
        }
    }
}

/// 本地模型服务配置
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalBackendConfig {
    pub model: String,
    pub endpoint: String,
    pub temperature: f32,
    /// 生成 token 上限，`None` 时使用服务端默认值
    pub max_tokens: Option<u32>,
    pub timeout_secs: u64,
}

impl Default for LocalBackendConfig {
    fn default() -> Self {
        Self {
            model: "gpt-oss:20b".to_string(),
            endpoint: "http://localhost:11434".to_string(),
            temperature: 0.3,
            max_tokens: None,
            timeout_secs: 60,
        }
    }
}

/// 远程 API 配置
///
/// 只保存凭据所在的环境变量名，密钥本身在构建客户端时读取。
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RemoteBackendConfig {
    pub model: String,
    pub base_url: String,
    pub api_key_env: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

impl Default for RemoteBackendConfig {
    fn default() -> Self {
        Self {
            model: "gpt-3.5-turbo".to_string(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            temperature: 0.3,
            max_tokens: 2000,
            timeout_secs: 60,
        }
    }
}

impl RemoteBackendConfig {
    /// 从 `api_key_env` 指定的环境变量读取密钥
    pub fn resolve_api_key(&self) -> Result<String, ConfigError> {
        std::env::var(&self.api_key_env)
            .ok()
            .filter(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingCredential {
                var_name: self.api_key_env.clone(),
            })
    }
}

impl Config {
    /// 默认配置叠加环境变量
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// 用环境变量覆盖已有配置
    pub fn apply_env(&mut self) {
        if let Ok(v) = std::env::var("GRADER_BACKEND") {
            self.default_backend = v;
        }
        self.verbose_logging = std::env::var("VERBOSE_LOGGING")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.verbose_logging);

        if let Ok(v) = std::env::var("LOCAL_LLM_MODEL") {
            self.local.model = v;
        }
        if let Ok(v) = std::env::var("LOCAL_LLM_ENDPOINT") {
            self.local.endpoint = v;
        }
        self.local.timeout_secs = std::env::var("LOCAL_LLM_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.local.timeout_secs);

        if let Ok(v) = std::env::var("REMOTE_LLM_MODEL") {
            self.remote.model = v;
        }
        if let Ok(v) = std::env::var("REMOTE_LLM_BASE_URL") {
            self.remote.base_url = v;
        }
        if let Ok(v) = std::env::var("REMOTE_LLM_API_KEY_ENV") {
            self.remote.api_key_env = v;
        }
        self.remote.timeout_secs = std::env::var("REMOTE_LLM_TIMEOUT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(self.remote.timeout_secs);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.default_backend, "local");
        assert_eq!(config.local.endpoint, "http://localhost:11434");
        assert_eq!(config.remote.max_tokens, 2000);
        assert!(config.privacy.is_empty());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str(
            r#"
            default_backend = "combined"

            [remote]
            model = "gpt-4o-mini"

            [privacy]
            method = "hash"
            "#,
        )
        .unwrap();

        assert_eq!(config.default_backend, "combined");
        assert_eq!(config.remote.model, "gpt-4o-mini");
        assert_eq!(config.remote.api_key_env, "OPENAI_API_KEY");
        assert_eq!(config.local.model, "gpt-oss:20b");
        assert_eq!(config.privacy.method.as_deref(), Some("hash"));
    }

    #[test]
    fn test_missing_credential() {
        let remote = RemoteBackendConfig {
            api_key_env: "PRIVACY_GRADER_TEST_UNSET_KEY".to_string(),
            ..RemoteBackendConfig::default()
        };
        let err = remote.resolve_api_key().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::MissingCredential { var_name } if var_name == "PRIVACY_GRADER_TEST_UNSET_KEY"
        ));
    }
}
