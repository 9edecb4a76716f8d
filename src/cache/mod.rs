//! 持久化缓存 - 存储层
//!
//! - `document` - 缓存文件的磁盘格式（快照、调用记录）
//! - `budget` - 每日 API 调用预算
//! - `store` - `PersistentCache`，按 (collection, service) 划分的快照读写

pub mod budget;
pub mod document;
pub mod store;

pub use budget::{BudgetDecision, BudgetTracker, DEFAULT_MAX_DAILY_CALLS};
pub use document::{CacheDocument, CallLogEntry, PortfolioSet, ScopedSnapshot, SnapshotKind};
pub use store::{epoch_seconds, PersistentCache, SNAPSHOT_TTL_SECS};
