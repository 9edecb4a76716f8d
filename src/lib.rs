//! # Portfolio Sync
//!
//! 一个用于批量审查和更新 Alma electronic portfolio 的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（令牌、并发槽位），只暴露能力
//! - `RateLimiter` - 连续补充的令牌桶
//! - `ConcurrencyLimiter` - 同时进行中的请求上限
//!
//! ### ② 客户端与存储
//! - `clients/` - `PortfolioApi` 接缝、`AlmaClient`、`ThrottledClient`
//! - `cache/` - `PersistentCache`（按 scope 划分的快照）与 `BudgetTracker`（每日调用预算）
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 只处理单条记录或一份汇总
//! - `AccessModelService` - 判断并写入 public access model
//! - `ReportWriter` - 写报告和错误日志
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义一次 review / update 的阶段顺序
//! - `RunContext` - 运行上下文（scope、错误记录、预算标记、汇总）
//! - `SyncFlow` - 流程编排（总数 → ID → 详情 → 分类 → PUT）
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/app` - 应用生命周期：读缓存 → 分发模式 → 写报告 → 保存缓存
//!
//! ## 模块结构

pub mod cache;
pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;
pub mod logger;
pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use cache::{BudgetTracker, PersistentCache, SnapshotKind};
pub use clients::{AlmaClient, PortfolioApi, ThrottledClient};
pub use config::{Config, Mode};
pub use error::{AppError, AppResult};
pub use infrastructure::{ConcurrencyLimiter, RateLimiter};
pub use models::{Portfolio, Scope};
pub use orchestrator::App;
pub use workflow::{FlowOutcome, RunContext, Stage, SyncFlow};
