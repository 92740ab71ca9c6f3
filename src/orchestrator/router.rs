//! 评分路由器 - 编排层
//!
//! ## 职责
//!
//! 1. **模式选择**：local / remote / combined，未知模式在触碰任何后端前失败
//! 2. **隐私处理**：发往远程后端前按策略匿名化，匿名化总在后端调用之前完成
//! 3. **调度**：单后端调用一次；混合模式两个后端并发调用
//! 4. **合并**：混合模式取分数与置信度的算术平均，保留两份原始记录
//!
//! `route` 永远返回一条 GradingRecord，任何失败都降级为 `error=true` 的记录。

use futures::future;
use phf::phf_map;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clients::{BackendAdapter, LocalModelClient, RemoteApiClient};
use crate::config::Config;
use crate::error::ConfigError;
use crate::models::grading::{GradingContext, GradingRecord, ParsingMethod};
use crate::models::privacy::PrivacyPolicy;
use crate::services::{anonymizer, pii_detector, privacy_report};
use crate::workflow::grade_with;

/// 混合模式记录的模型名
pub const HYBRID_MODEL: &str = "hybrid";

/// 评分模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendMode {
    /// 只用本地模型
    Local,
    /// 只用远程 API
    Remote,
    /// 本地 + 远程，结果取平均
    Combined,
}

/// 模式名及其别名
static MODE_ALIASES: phf::Map<&'static str, BackendMode> = phf_map! {
    "local" => BackendMode::Local,
    "remote" => BackendMode::Remote,
    "api" => BackendMode::Remote,
    "openai" => BackendMode::Remote,
    "combined" => BackendMode::Combined,
    "hybrid" => BackendMode::Combined,
};

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MODE_ALIASES
            .get(s.trim().to_ascii_lowercase().as_str())
            .copied()
            .ok_or_else(|| ConfigError::UnknownMode(s.to_string()))
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local"),
            Self::Remote => write!(f, "remote"),
            Self::Combined => write!(f, "combined"),
        }
    }
}

/// 评分路由器
///
/// 不持有可变状态，可在多个请求间共享。
#[derive(Clone, Default)]
pub struct Router {
    local: Option<Arc<dyn BackendAdapter>>,
    remote: Option<Arc<dyn BackendAdapter>>,
    privacy: PrivacyPolicy,
}

impl Router {
    pub fn new(privacy: PrivacyPolicy) -> Self {
        Self {
            local: None,
            remote: None,
            privacy,
        }
    }

    pub fn with_local(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.local = Some(adapter);
        self
    }

    pub fn with_remote(mut self, adapter: Arc<dyn BackendAdapter>) -> Self {
        self.remote = Some(adapter);
        self
    }

    /// 按模式构建所需的后端客户端
    ///
    /// 只构建该模式用得到的后端：local 模式不要求 API 密钥。
    pub fn from_config(config: &Config, mode: BackendMode) -> Result<Self, ConfigError> {
        let mut router = Self::new(config.privacy.clone());

        if matches!(mode, BackendMode::Local | BackendMode::Combined) {
            router = router.with_local(Arc::new(LocalModelClient::new(&config.local)?));
        }
        if matches!(mode, BackendMode::Remote | BackendMode::Combined) {
            router = router.with_remote(Arc::new(RemoteApiClient::new(&config.remote)?));
        }

        Ok(router)
    }

    /// 用指定模式评分
    pub async fn grade(
        &self,
        text: &str,
        context: &GradingContext,
        mode: BackendMode,
    ) -> GradingRecord {
        let record = match mode {
            BackendMode::Local => match self.require(&self.local, "local") {
                Ok(local) => self.grade_single(local, text, context).await,
                Err(e) => GradingRecord::error(self.model_label(mode), e.to_string()),
            },
            BackendMode::Remote => match self.require(&self.remote, "remote") {
                Ok(remote) => self.grade_single(remote, text, context).await,
                Err(e) => GradingRecord::error(self.model_label(mode), e.to_string()),
            },
            BackendMode::Combined => self.grade_combined(text, context).await,
        };

        let record = record.clamped();
        info!(
            "[模式 {}] 评分完成: {:.1} 分 (置信度 {:.2}, 模型 {}{})",
            mode,
            record.total_score,
            record.confidence,
            record.model_used,
            if record.error { ", 失败" } else { "" }
        );
        record
    }

    /// 带取消信号的评分
    ///
    /// `cancel` 先完成时，两个进行中的后端调用随评分 future 一起被丢弃。
    pub async fn grade_until<C>(
        &self,
        text: &str,
        context: &GradingContext,
        mode: BackendMode,
        cancel: C,
    ) -> GradingRecord
    where
        C: Future<Output = ()>,
    {
        tokio::select! {
            record = self.grade(text, context, mode) => record,
            _ = cancel => {
                warn!("[模式 {}] 评分已取消", mode);
                GradingRecord::error(self.model_label(mode), "grading cancelled").clamped()
            }
        }
    }

    async fn grade_single(
        &self,
        adapter: &Arc<dyn BackendAdapter>,
        text: &str,
        context: &GradingContext,
    ) -> GradingRecord {
        match self.prepare_text(adapter.as_ref(), text) {
            Ok(prepared) => grade_with(adapter.as_ref(), &prepared, context).await,
            Err(e) => GradingRecord::error(adapter.model_id(), e.to_string()),
        }
    }

    async fn grade_combined(&self, text: &str, context: &GradingContext) -> GradingRecord {
        let (local, remote) = match (
            self.require(&self.local, "local"),
            self.require(&self.remote, "remote"),
        ) {
            (Ok(local), Ok(remote)) => (local, remote),
            (Err(e), _) | (_, Err(e)) => return GradingRecord::error(HYBRID_MODEL, e.to_string()),
        };

        // 匿名化只做一次，并在任何调用开始前完成
        let local_text = match self.prepare_text(local.as_ref(), text) {
            Ok(t) => t,
            Err(e) => return GradingRecord::error(HYBRID_MODEL, e.to_string()),
        };
        let remote_text = match self.prepare_text(remote.as_ref(), text) {
            Ok(t) => t,
            Err(e) => return GradingRecord::error(HYBRID_MODEL, e.to_string()),
        };

        let (local_record, remote_record) = future::join(
            grade_with(local.as_ref(), &local_text, context),
            grade_with(remote.as_ref(), &remote_text, context),
        )
        .await;

        merge_records(local_record, remote_record)
    }

    /// 远程后端且策略非空时匿名化，否则原样返回
    fn prepare_text(&self, adapter: &dyn BackendAdapter, text: &str) -> Result<String, ConfigError> {
        if !adapter.kind().is_remote() || self.privacy.is_empty() {
            return Ok(text.to_string());
        }

        let filtered = anonymizer::anonymize(text, &self.privacy)?;
        let report = privacy_report::privacy_report(text, &filtered, &self.privacy);
        debug!(
            "🔒 已匿名化: 检测 {} 处, 隐私评分 {:.2}, {} → {} 字符",
            report.detections_count,
            report.privacy_score,
            report.original_length,
            report.filtered_length
        );
        if pii_detector::contains_pii(&filtered) {
            warn!("⚠️ 匿名化后仍检测到敏感信息，请检查隐私策略");
        }
        Ok(filtered)
    }

    fn require<'a>(
        &self,
        slot: &'a Option<Arc<dyn BackendAdapter>>,
        name: &'static str,
    ) -> Result<&'a Arc<dyn BackendAdapter>, ConfigError> {
        slot.as_ref().ok_or(ConfigError::MissingBackend(name))
    }

    fn model_label(&self, mode: BackendMode) -> String {
        let slot = match mode {
            BackendMode::Local => &self.local,
            BackendMode::Remote => &self.remote,
            BackendMode::Combined => return HYBRID_MODEL.to_string(),
        };
        slot.as_ref()
            .map(|a| a.model_id().to_string())
            .unwrap_or_else(|| mode.to_string())
    }
}

/// 合并本地与远程两条记录
///
/// 分数、置信度取算术平均；任一方失败时按 0 分参与平均；
/// 两方都失败时合并结果为错误记录。
pub fn merge_records(local: GradingRecord, api: GradingRecord) -> GradingRecord {
    let parsing_method = if local.is_structured() && api.is_structured() {
        Some(ParsingMethod::Structured)
    } else if local.parsing_method.is_none() && api.parsing_method.is_none() {
        None
    } else {
        Some(ParsingMethod::Fallback)
    };

    let error = local.error && api.error;
    let error_message = error.then(|| {
        format!(
            "Local: {}; API: {}",
            local.error_message.as_deref().unwrap_or("unknown error"),
            api.error_message.as_deref().unwrap_or("unknown error")
        )
    });

    GradingRecord {
        total_score: (local.total_score + api.total_score) / 2.0,
        confidence: (local.confidence + api.confidence) / 2.0,
        feedback: format!(
            "Local: {}\n\nAPI: {}",
            feedback_or_default(&local.feedback),
            feedback_or_default(&api.feedback)
        ),
        parsing_method,
        error,
        error_message,
        local_result: Some(Box::new(local)),
        api_result: Some(Box::new(api)),
        ..GradingRecord::new(HYBRID_MODEL)
    }
    .clamped()
}

fn feedback_or_default(feedback: &str) -> &str {
    if feedback.trim().is_empty() {
        "No feedback"
    } else {
        feedback
    }
}

/// 评分入口
///
/// 解析模式、按配置构建后端并评分；任何失败都返回错误记录。
pub async fn route(
    text: &str,
    context: &GradingContext,
    backend: &str,
    config: &Config,
) -> GradingRecord {
    match prepare_router(backend, config) {
        Ok((router, mode)) => router.grade(text, context, mode).await,
        Err(e) => config_failure(backend, e),
    }
}

/// 带取消信号的评分入口
pub async fn route_until<C>(
    text: &str,
    context: &GradingContext,
    backend: &str,
    config: &Config,
    cancel: C,
) -> GradingRecord
where
    C: Future<Output = ()>,
{
    match prepare_router(backend, config) {
        Ok((router, mode)) => router.grade_until(text, context, mode, cancel).await,
        Err(e) => config_failure(backend, e),
    }
}

fn prepare_router(backend: &str, config: &Config) -> Result<(Router, BackendMode), ConfigError> {
    let mode: BackendMode = backend.parse()?;
    let router = Router::from_config(config, mode)?;
    Ok((router, mode))
}

fn config_failure(backend: &str, err: ConfigError) -> GradingRecord {
    warn!("[模式 {}] 配置错误: {}", backend, err);
    let model = match backend.parse::<BackendMode>() {
        Ok(BackendMode::Combined) => HYBRID_MODEL,
        _ => "unknown",
    };
    GradingRecord::error(model, err.to_string()).clamped()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::{BackendKind, RawReply};
    use crate::error::TransportError;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::time::Duration;

    /// 记录收到的文本并返回固定回复的后端
    struct MockBackend {
        kind: BackendKind,
        model: &'static str,
        reply: Result<String, TransportError>,
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    impl MockBackend {
        fn new(kind: BackendKind, model: &'static str, reply: &str) -> Self {
            Self {
                kind,
                model,
                reply: Ok(reply.to_string()),
                delay: Duration::ZERO,
                seen: Mutex::new(Vec::new()),
            }
        }

        fn failing(kind: BackendKind, model: &'static str, err: TransportError) -> Self {
            Self {
                reply: Err(err),
                ..Self::new(kind, model, "")
            }
        }

        fn with_delay(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }

        fn seen(&self) -> Vec<String> {
            self.seen.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl BackendAdapter for MockBackend {
        fn kind(&self) -> BackendKind {
            self.kind
        }

        fn model_id(&self) -> &str {
            self.model
        }

        async fn grade(&self, text: &str, _: &GradingContext) -> Result<RawReply, TransportError> {
            self.seen.lock().unwrap().push(text.to_string());
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            self.reply
                .clone()
                .map(|content| RawReply::new(content, self.kind))
        }

        async fn list_models(&self) -> Vec<String> {
            vec![self.model.to_string()]
        }

        async fn test_connection(&self) -> bool {
            self.reply.is_ok()
        }
    }

    fn record(score: f64, confidence: f64) -> GradingRecord {
        GradingRecord {
            total_score: score,
            confidence,
            feedback: format!("score {}", score),
            parsing_method: Some(ParsingMethod::Structured),
            ..GradingRecord::new("m")
        }
    }

    #[test]
    fn test_mode_parsing() {
        assert_eq!("local".parse::<BackendMode>().unwrap(), BackendMode::Local);
        assert_eq!("OpenAI".parse::<BackendMode>().unwrap(), BackendMode::Remote);
        assert_eq!("hybrid".parse::<BackendMode>().unwrap(), BackendMode::Combined);
        assert!(matches!(
            "cloud".parse::<BackendMode>(),
            Err(ConfigError::UnknownMode(m)) if m == "cloud"
        ));
    }

    #[test]
    fn test_merge_records() {
        let merged = merge_records(record(80.0, 0.7), record(60.0, 0.9));

        assert_eq!(merged.total_score, 70.0);
        assert_eq!(merged.confidence, 0.8);
        assert_eq!(merged.model_used, HYBRID_MODEL);
        assert_eq!(merged.feedback, "Local: score 80\n\nAPI: score 60");
        assert_eq!(merged.parsing_method, Some(ParsingMethod::Structured));
        assert_eq!(merged.local_result.as_ref().unwrap().total_score, 80.0);
        assert_eq!(merged.api_result.as_ref().unwrap().total_score, 60.0);
        assert!(!merged.error);
    }

    #[test]
    fn test_merge_mixed_parsing_methods() {
        let fallback = GradingRecord {
            parsing_method: Some(ParsingMethod::Fallback),
            ..record(50.0, 0.3)
        };
        let merged = merge_records(record(90.0, 0.9), fallback);
        assert!(!merged.is_structured());
        assert_eq!(merged.parsing_method, Some(ParsingMethod::Fallback));

        let merged = merge_records(record(90.0, 0.9), record(70.0, 0.7));
        assert!(merged.is_structured());
    }

    #[test]
    fn test_merge_with_one_failure() {
        let failed = GradingRecord::error("gpt-3.5-turbo", "timeout").clamped();
        let merged = merge_records(record(80.0, 0.7), failed);

        assert_eq!(merged.total_score, 40.0);
        assert_eq!(merged.confidence, 0.35);
        assert!(!merged.error);
        assert_eq!(merged.parsing_method, Some(ParsingMethod::Fallback));
    }

    #[test]
    fn test_merge_both_failed() {
        let merged = merge_records(
            GradingRecord::error("a", "down").clamped(),
            GradingRecord::error("b", "timeout").clamped(),
        );
        assert!(merged.error);
        assert_eq!(merged.total_score, 0.0);
        assert_eq!(merged.confidence, 0.0);
        assert_eq!(merged.error_message.as_deref(), Some("Local: down; API: timeout"));
    }

    #[tokio::test]
    async fn test_local_mode_never_anonymizes() {
        let local = Arc::new(MockBackend::new(BackendKind::Local, "llama3", "85/100"));
        let router = Router::new(PrivacyPolicy::placeholder()).with_local(local.clone());

        let record = router
            .grade("นาย สมชาย ตอบว่า 4", &GradingContext::default(), BackendMode::Local)
            .await;

        assert_eq!(record.total_score, 85.0);
        assert_eq!(local.seen(), vec!["นาย สมชาย ตอบว่า 4".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_mode_anonymizes_before_call() {
        let remote = Arc::new(MockBackend::new(
            BackendKind::Api,
            "gpt-3.5-turbo",
            r#"{"total_score": 90, "feedback": "ดี"}"#,
        ));
        let router = Router::new(PrivacyPolicy::placeholder()).with_remote(remote.clone());

        let record = router
            .grade("นาย สมชาย ตอบว่า 4", &GradingContext::default(), BackendMode::Remote)
            .await;

        assert_eq!(record.total_score, 90.0);
        assert_eq!(record.model_used, "gpt-3.5-turbo");
        assert_eq!(remote.seen(), vec!["[STUDENT] ตอบว่า 4".to_string()]);
    }

    #[tokio::test]
    async fn test_remote_mode_with_empty_policy_sends_original() {
        let remote = Arc::new(MockBackend::new(BackendKind::Api, "gpt", "80/100"));
        let router = Router::default().with_remote(remote.clone());

        router
            .grade("นาย สมชาย", &GradingContext::default(), BackendMode::Remote)
            .await;
        assert_eq!(remote.seen(), vec!["นาย สมชาย".to_string()]);
    }

    #[tokio::test]
    async fn test_combined_mode() {
        let local = Arc::new(MockBackend::new(
            BackendKind::Local,
            "llama3",
            r#"{"total_score": 80, "feedback": "ครบ"}"#,
        ));
        let remote = Arc::new(MockBackend::new(
            BackendKind::Api,
            "gpt-3.5-turbo",
            r#"{"total_score": 60, "breakdown": {"accuracy": 30}, "feedback": "ขาดตัวอย่าง"}"#,
        ));
        let router = Router::new(PrivacyPolicy::placeholder())
            .with_local(local.clone())
            .with_remote(remote.clone());

        let record = router
            .grade("เด็กชาย ต้น ตอบว่า 4", &GradingContext::default(), BackendMode::Combined)
            .await;

        // local 0.5, api 0.6 + 0.2
        assert_eq!(record.total_score, 70.0);
        assert_eq!(record.confidence, 0.65);
        assert_eq!(record.model_used, HYBRID_MODEL);
        assert_eq!(record.feedback, "Local: ครบ\n\nAPI: ขาดตัวอย่าง");
        assert_eq!(local.seen(), vec!["เด็กชาย ต้น ตอบว่า 4".to_string()]);
        assert_eq!(remote.seen(), vec!["[STUDENT] ตอบว่า 4".to_string()]);
    }

    #[tokio::test]
    async fn test_combined_runs_concurrently() {
        let delay = Duration::from_millis(200);
        let local = Arc::new(MockBackend::new(BackendKind::Local, "l", "50/100").with_delay(delay));
        let remote = Arc::new(MockBackend::new(BackendKind::Api, "r", "70/100").with_delay(delay));
        let router = Router::default().with_local(local).with_remote(remote);

        let started = std::time::Instant::now();
        let record = router
            .grade("ตอบ", &GradingContext::default(), BackendMode::Combined)
            .await;

        assert_eq!(record.total_score, 60.0);
        assert!(started.elapsed() < delay * 2);
    }

    #[tokio::test]
    async fn test_transport_failure_in_remote_mode() {
        let remote = Arc::new(MockBackend::failing(
            BackendKind::Api,
            "gpt-3.5-turbo",
            TransportError::with_status(401, "invalid api key"),
        ));
        let router = Router::default().with_remote(remote);

        let record = router
            .grade("ตอบ", &GradingContext::default(), BackendMode::Remote)
            .await;

        assert!(record.error);
        assert_eq!(record.total_score, 0.0);
        assert_eq!(record.confidence, 0.0);
        assert!(record.error_message.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn test_bad_privacy_method_is_error_record() {
        let remote = Arc::new(MockBackend::new(BackendKind::Api, "gpt", "80/100"));
        let policy = PrivacyPolicy {
            method: Some("encrypt".to_string()),
            ..PrivacyPolicy::default()
        };
        let router = Router::new(policy).with_remote(remote.clone());

        let record = router
            .grade("ตอบ", &GradingContext::default(), BackendMode::Remote)
            .await;

        assert!(record.error);
        assert!(remote.seen().is_empty());
    }

    #[tokio::test]
    async fn test_missing_backend() {
        let router = Router::default();
        let record = router
            .grade("ตอบ", &GradingContext::default(), BackendMode::Combined)
            .await;

        assert!(record.error);
        assert_eq!(record.model_used, HYBRID_MODEL);
    }

    #[tokio::test]
    async fn test_cancellation() {
        let local = Arc::new(
            MockBackend::new(BackendKind::Local, "l", "50/100").with_delay(Duration::from_secs(5)),
        );
        let remote = Arc::new(
            MockBackend::new(BackendKind::Api, "r", "70/100").with_delay(Duration::from_secs(5)),
        );
        let router = Router::default().with_local(local).with_remote(remote);

        let record = router
            .grade_until(
                "ตอบ",
                &GradingContext::default(),
                BackendMode::Combined,
                tokio::time::sleep(Duration::from_millis(50)),
            )
            .await;

        assert!(record.error);
        assert_eq!(record.error_message.as_deref(), Some("grading cancelled"));
        assert_eq!(record.model_used, HYBRID_MODEL);
    }

    #[tokio::test]
    async fn test_route_unknown_mode() {
        let record = route("ตอบ", &GradingContext::default(), "cloud", &Config::default()).await;

        assert!(record.error);
        assert_eq!(record.total_score, 0.0);
        assert!(record.error_message.unwrap().contains("unknown backend mode"));
    }

    #[tokio::test]
    async fn test_route_missing_credential() {
        let mut config = Config::default();
        config.remote.api_key_env = "PRIVACY_GRADER_ROUTER_TEST_KEY".to_string();

        let record = route("ตอบ", &GradingContext::default(), "hybrid", &config).await;

        assert!(record.error);
        assert_eq!(record.model_used, HYBRID_MODEL);
        assert!(record
            .error_message
            .unwrap()
            .contains("PRIVACY_GRADER_ROUTER_TEST_KEY"));
    }
}
