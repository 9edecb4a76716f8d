//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责资源创建和模式分发，是整个系统的"指挥中心"。
//!
//! ## 层次关系
//!
//! ```text
//! orchestrator::App (模式分发、报告、保存缓存)
//!     ↓
//! workflow::SyncFlow (review / update 的阶段顺序)
//!     ↓
//! services (能力层：分类 / 报告)    cache (PersistentCache / BudgetTracker)
//!     ↓
//! clients (ThrottledClient → AlmaClient)
//!     ↓
//! infrastructure (RateLimiter / ConcurrencyLimiter)
//! ```
//!
//! ## 设计原则
//!
//! 1. **资源隔离**：只有编排层持有缓存和客户端
//! 2. **向下依赖**：编排层 → workflow → services → infrastructure
//! 3. **无业务逻辑**：只做调度和统计，不做具体业务判断

pub mod app;

// 重新导出主要类型
pub use app::App;
