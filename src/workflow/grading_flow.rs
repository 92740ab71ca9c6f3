//! 单后端评分流程 - 流程层
//!
//! 核心职责：定义"一次后端调用"的完整处理流程
//!
//! 流程顺序：
//! 1. 调用后端 `grade`
//! 2. 成功 → 规范化为 GradingRecord
//! 3. 传输失败 → 直接生成错误记录（不进入规范化，不重试）

use tracing::{debug, warn};

use crate::clients::BackendAdapter;
use crate::models::grading::{GradingContext, GradingRecord};
use crate::services::response_normalizer;

/// 用单个后端完成一次评分
///
/// 调用方负责在此之前完成匿名化。
pub async fn grade_with(
    adapter: &dyn BackendAdapter,
    text: &str,
    context: &GradingContext,
) -> GradingRecord {
    let model_id = adapter.model_id();
    debug!(
        "[{} 后端] 开始评分，模型: {}, 文本 {} 字符",
        adapter.kind(),
        model_id,
        text.chars().count()
    );

    match adapter.grade(text, context).await {
        Ok(raw) => {
            let record = response_normalizer::normalize(&raw, model_id);
            debug!(
                "[{} 后端] ✓ 评分完成: {:.1} 分 (置信度 {:.2})",
                adapter.kind(),
                record.total_score,
                record.confidence
            );
            record
        }
        Err(e) => {
            warn!("[{} 后端] ❌ 调用失败: {}", adapter.kind(), e);
            GradingRecord::error(model_id, format!("{} backend error: {}", adapter.kind(), e))
                .clamped()
        }
    }
}
