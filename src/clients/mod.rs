//! 远端 API 客户端
//!
//! `PortfolioApi` 是编排层与远端系统之间唯一的接缝

pub mod alma_client;
pub mod throttled;

use crate::error::AppResult;
use crate::models::{Portfolio, Scope};
use async_trait::async_trait;

pub use alma_client::{AlmaClient, PAGE_SIZE};
pub use throttled::ThrottledClient;

/// portfolio 相关的远端调用
#[async_trait]
pub trait PortfolioApi: Send + Sync {
    /// 查询 collection 中的 portfolio 总数
    async fn portfolio_count(&self, scope: &Scope) -> AppResult<u64>;

    /// 分页获取 portfolio 列表（只含 ID 和少量字段）
    async fn list_portfolios(
        &self,
        scope: &Scope,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Portfolio>>;

    /// 获取单个 portfolio 的完整记录
    async fn get_portfolio(&self, scope: &Scope, id: &str) -> AppResult<Portfolio>;

    /// 用完整记录覆盖远端 portfolio
    async fn update_portfolio(&self, scope: &Scope, portfolio: &Portfolio) -> AppResult<()>;
}
