//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责模式选择和后端调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `router` - 评分路由器
//! - 解析模式名（local / remote / combined 及别名）
//! - 按模式只构建需要的后端客户端
//! - 远程后端调用前完成匿名化
//! - 混合模式并发调用两个后端并合并结果
//! - 支持外部取消信号
//!
//! ## 层次关系
//!
//! ```text
//! router (选择模式、匿名化、合并)
//!     ↓
//! workflow::grade_with (单个后端的一次调用)
//!     ↓
//! services (能力层：pii / anonymize / normalize)
//!     ↓
//! clients (基础设施：Ollama / OpenAI)
//! ```
//!
//! ## 设计原则
//!
//! 1. **只调度**：具体的解析和匿名化由 services 完成
//! 2. **永不失败**：所有错误都降级为错误记录
//! 3. **向下依赖**：编排层 → workflow → services → clients

pub mod router;

// 重新导出主要类型
pub use router::{merge_records, route, route_until, BackendMode, Router};
