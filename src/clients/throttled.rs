//! 限速客户端
//!
//! 每个请求先拿并发槽位，再拿令牌，然后才真正发出

use crate::clients::PortfolioApi;
use crate::config::Config;
use crate::error::AppResult;
use crate::infrastructure::{ConcurrencyLimiter, RateLimiter};
use crate::models::{Portfolio, Scope};
use std::sync::Arc;

/// 在任意 `PortfolioApi` 前面加上并发限制和速率限制
#[derive(Clone)]
pub struct ThrottledClient {
    api: Arc<dyn PortfolioApi>,
    concurrency: ConcurrencyLimiter,
    rate: Arc<RateLimiter>,
}

impl ThrottledClient {
    pub fn new(api: Arc<dyn PortfolioApi>, concurrency: ConcurrencyLimiter, rate: RateLimiter) -> Self {
        Self {
            api,
            concurrency,
            rate: Arc::new(rate),
        }
    }

    /// 按配置创建
    pub fn from_config(api: Arc<dyn PortfolioApi>, config: &Config) -> Self {
        Self::new(
            api,
            ConcurrencyLimiter::new(config.max_concurrent_requests),
            RateLimiter::new(config.rate_limit_burst, config.rate_limit_per_second),
        )
    }

    pub fn concurrency(&self) -> &ConcurrencyLimiter {
        &self.concurrency
    }

    /// collection 总数查询只有一次，不占并发槽位，只拿令牌
    pub async fn portfolio_count(&self, scope: &Scope) -> AppResult<u64> {
        self.rate.acquire().await;
        self.api.portfolio_count(scope).await
    }

    pub async fn list_portfolios(
        &self,
        scope: &Scope,
        offset: usize,
        limit: usize,
    ) -> AppResult<Vec<Portfolio>> {
        let _permit = self.concurrency.acquire().await?;
        self.rate.acquire().await;
        self.api.list_portfolios(scope, offset, limit).await
    }

    pub async fn get_portfolio(&self, scope: &Scope, id: &str) -> AppResult<Portfolio> {
        let _permit = self.concurrency.acquire().await?;
        self.rate.acquire().await;
        self.api.get_portfolio(scope, id).await
    }

    pub async fn update_portfolio(&self, scope: &Scope, portfolio: &Portfolio) -> AppResult<()> {
        let _permit = self.concurrency.acquire().await?;
        self.rate.acquire().await;
        self.api.update_portfolio(scope, portfolio).await
    }
}
