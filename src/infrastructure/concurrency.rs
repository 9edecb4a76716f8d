//! 并发限制器 - 基础设施层
//!
//! 限制同时进行中的远端请求数量，与速率无关

use crate::error::AppResult;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

/// 默认最大并发请求数
pub const DEFAULT_MAX_IN_FLIGHT: usize = 30;

/// 基于 Semaphore 的并发限制器
///
/// 槽位随 permit 一起释放，请求成功或失败都会归还
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    max_in_flight: usize,
}

impl ConcurrencyLimiter {
    pub fn new(max_in_flight: usize) -> Self {
        let max_in_flight = max_in_flight.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(max_in_flight)),
            max_in_flight,
        }
    }

    /// 等待一个空闲槽位
    pub async fn acquire(&self) -> AppResult<OwnedSemaphorePermit> {
        Ok(self.semaphore.clone().acquire_owned().await?)
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight
    }

    /// 当前进行中的请求数
    pub fn in_flight(&self) -> usize {
        self.max_in_flight - self.semaphore.available_permits()
    }
}

impl Default for ConcurrencyLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IN_FLIGHT)
    }
}
