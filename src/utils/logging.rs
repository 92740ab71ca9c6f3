/// 日志工具模块
///
/// 提供日志初始化和输出的辅助函数。
/// 只记录长度、数量和模型输出的预览，不记录学生原文与密钥。
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;

/// 初始化日志
///
/// 优先使用 `RUST_LOG`，否则按 `verbose` 选择 debug / info。
/// 重复调用是安全的（测试中常见）。
pub fn init(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 评分服务启动 - 默认模式: {}", config.default_backend);
    info!("🖥️ 本地模型: {} ({})", config.local.model, config.local.endpoint);
    info!("🌐 远程模型: {} ({})", config.remote.model, config.remote.base_url);
    info!(
        "🔒 隐私策略: {}",
        if config.privacy.is_empty() {
            "未启用".to_string()
        } else {
            config.privacy.rules_applied().join(", ")
        }
    );
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大字符数
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
