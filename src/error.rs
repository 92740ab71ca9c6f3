use thiserror::Error;

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 未知的后端模式
    #[error("unknown backend mode: {0}")]
    UnknownMode(String),
    /// 未知的匿名化方法
    #[error("unknown anonymization method: {0}")]
    UnknownMethod(String),
    /// 隐私规则中的正则无效
    #[error("invalid sensitive pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
    /// 凭据环境变量不存在
    #[error("API key not found in environment variable: {var_name}")]
    MissingCredential { var_name: String },
    /// 所选模式缺少后端
    #[error("backend '{0}' is not configured")]
    MissingBackend(&'static str),
    /// 配置文件读取失败
    #[error("failed to read config file {path}: {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// TOML 解析失败
    #[error("failed to parse config file {path}: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// HTTP 客户端构建失败
    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),
}

/// 后端传输错误
///
/// 网络失败、超时、非 2xx 状态码以及空回复都归入此类。
#[derive(Debug, Clone, Error)]
#[error("{}", render_transport(.status, .message))]
pub struct TransportError {
    pub status: Option<u16>,
    pub message: String,
}

fn render_transport(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("HTTP {}: {}", code, message),
        None => message.to_string(),
    }
}

impl TransportError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            message: message.into(),
        }
    }

    pub fn with_status(status: u16, message: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            message: message.into(),
        }
    }

    /// 创建超时错误
    pub fn timeout(backend: &str, secs: u64) -> Self {
        Self::new(format!("{} request timed out after {}s", backend, secs))
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}

/// 回复解析错误
#[derive(Debug, Error)]
pub enum ParseError {
    /// 回复为空
    #[error("reply is empty")]
    EmptyReply,
    /// 找不到 `{ ... }` 结构块
    #[error("no structured block found")]
    NoStructuredBlock,
    /// JSON 解析失败
    #[error("structured block is not valid: {0}")]
    Json(#[from] serde_json::Error),
}
