use anyhow::{Context, Result};
use std::path::Path;
use tokio::io::AsyncReadExt;

use privacy_grader::config::Config;
use privacy_grader::models::{load_config, load_grading_context, GradingContext};
use privacy_grader::orchestrator::route_until;
use privacy_grader::utils::logging;

#[tokio::main]
async fn main() -> Result<()> {
    // 加载配置：GRADER_CONFIG 指向 TOML 文件，否则只用环境变量
    let config = match std::env::var("GRADER_CONFIG") {
        Ok(path) => load_config(Path::new(&path))
            .await
            .with_context(|| format!("加载配置失败: {}", path))?,
        Err(_) => Config::from_env(),
    };

    // 初始化日志
    logging::init(config.verbose_logging);
    logging::log_startup(&config);

    // 作业上下文（可选）
    let context = match std::env::var("GRADER_CONTEXT") {
        Ok(path) => load_grading_context(Path::new(&path))
            .await
            .with_context(|| format!("加载作业上下文失败: {}", path))?,
        Err(_) => GradingContext::default(),
    };

    // 从标准输入读取作业文本
    let mut submission = String::new();
    tokio::io::stdin()
        .read_to_string(&mut submission)
        .await
        .context("读取标准输入失败")?;

    // Ctrl+C 取消进行中的评分
    let cancel = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    let record = route_until(
        submission.trim(),
        &context,
        &config.default_backend,
        &config,
        cancel,
    )
    .await;

    println!(
        "{}",
        serde_json::to_string_pretty(&record).context("序列化评分结果失败")?
    );

    if record.error {
        std::process::exit(1);
    }
    Ok(())
}
