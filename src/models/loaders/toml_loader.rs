use crate::config::Config;
use crate::error::ConfigError;
use crate::models::grading::GradingContext;
use serde::de::DeserializeOwned;
use std::path::Path;
use tokio::fs;

/// 读取并解析 TOML 文件
async fn load_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;

    toml::from_str(&content).map_err(|source| ConfigError::TomlParseFailed {
        path: path.display().to_string(),
        source,
    })
}

/// 从 TOML 文件加载配置，并用环境变量覆盖
pub async fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let mut config: Config = load_toml(path).await?;
    config.apply_env();

    tracing::info!(
        "已加载配置: {} (默认模式: {})",
        path.file_name().unwrap_or_default().to_string_lossy(),
        config.default_backend
    );

    Ok(config)
}

/// 从 TOML 文件加载作业上下文（题目、评分标准、标准答案）
pub async fn load_grading_context(path: &Path) -> Result<GradingContext, ConfigError> {
    let context: GradingContext = load_toml(path).await?;

    tracing::debug!(
        "已加载作业上下文: 题目 {}, 评分标准 {}, 标准答案 {}",
        context.question.is_some(),
        context.grading_criteria.is_some(),
        context.standard_answer.is_some()
    );

    Ok(context)
}
