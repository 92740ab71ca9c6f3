//! # Privacy Grader
//!
//! 一个注重隐私的 LLM 作业评分库
//!
//! ## 架构设计
//!
//! 本系统采用严格的四层架构：
//!
//! ### ① 客户端层（Clients）
//! - `clients/` - 持有 HTTP 连接，只暴露"发请求、拿原始回复"能力
//! - `LocalModelClient` - 本地 Ollama 服务
//! - `RemoteApiClient` - 兼容 OpenAI 的远程 API
//!
//! ### ② 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，全部是纯函数
//! - `pii_detector` - 个人信息检测
//! - `anonymizer` - 占位符 / 哈希 / 删除三种匿名化
//! - `privacy_report` - 隐私评分与 API 安全检查
//! - `response_normalizer` - 把任意模型回复变成评分记录
//!
//! ### ③ 流程层（Workflow）
//! - `workflow/` - 定义"一次后端调用"的完整处理流程
//!
//! ### ④ 编排层（Orchestration）
//! - `orchestrator/router` - 模式选择、匿名化、并发调用与结果合并
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{BackendAdapter, BackendKind, LocalModelClient, RawReply, RemoteApiClient};
pub use config::Config;
pub use error::{ConfigError, ParseError, TransportError};
pub use models::{GradingContext, GradingRecord, PrivacyPolicy, PrivacyReport};
pub use orchestrator::{route, route_until, BackendMode, Router};
pub use services::{anonymize, detect, privacy_report, validate_api_safety};
