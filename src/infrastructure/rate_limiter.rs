//! 令牌桶限速器 - 基础设施层
//!
//! 只限制请求的发出速率，不限制并发数量（并发由 `ConcurrencyLimiter` 负责）

use std::sync::Mutex;
use std::time::Duration;
use tokio::time::{sleep, Instant};
use tracing::debug;

/// 默认令牌桶容量
pub const DEFAULT_CAPACITY: f64 = 25.0;
/// 默认每秒补充令牌数
pub const DEFAULT_REFILL_RATE: f64 = 25.0;
/// 令牌不足时的轮询间隔
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// 连续补充的令牌桶
///
/// 令牌为浮点数，补充量 = 经过秒数 × 速率，上限为容量，小数部分跨检查保留
#[derive(Debug, Clone)]
pub struct TokenBucket {
    capacity: f64,
    tokens: f64,
    refill_rate: f64,
    last_refill: Instant,
}

impl TokenBucket {
    /// 创建满桶
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self {
            capacity,
            tokens: capacity,
            refill_rate,
            last_refill: Instant::now(),
        }
    }

    pub fn capacity(&self) -> f64 {
        self.capacity
    }

    pub fn refill_rate(&self) -> f64 {
        self.refill_rate
    }

    /// 当前可用令牌（先补充）
    pub fn available(&mut self) -> f64 {
        self.refill();
        self.tokens
    }

    /// 尝试取走一个令牌
    pub fn try_take(&mut self) -> bool {
        self.refill();

        if self.tokens >= 1.0 {
            self.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    fn refill(&mut self) {
        let now = Instant::now();
        let elapsed = now.duration_since(self.last_refill).as_secs_f64();
        self.tokens = (self.tokens + elapsed * self.refill_rate).min(self.capacity);
        self.last_refill = now;
    }
}

/// 异步限速器
///
/// `acquire()` 在令牌不足时按固定间隔轮询，直到拿到令牌；不会拒绝请求
#[derive(Debug)]
pub struct RateLimiter {
    bucket: Mutex<TokenBucket>,
    poll_interval: Duration,
}

impl RateLimiter {
    pub fn new(capacity: f64, refill_rate: f64) -> Self {
        Self::with_poll_interval(capacity, refill_rate, DEFAULT_POLL_INTERVAL)
    }

    pub fn with_poll_interval(capacity: f64, refill_rate: f64, poll_interval: Duration) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(capacity, refill_rate)),
            poll_interval,
        }
    }

    /// 等待并取走一个令牌
    pub async fn acquire(&self) {
        loop {
            if self.try_acquire() {
                return;
            }
            debug!("令牌不足，{:?} 后重试", self.poll_interval);
            sleep(self.poll_interval).await;
        }
    }

    /// 非阻塞地尝试取走一个令牌
    pub fn try_acquire(&self) -> bool {
        // 锁只在同步代码中持有，不跨越 await
        match self.bucket.lock() {
            Ok(mut bucket) => bucket.try_take(),
            Err(poisoned) => poisoned.into_inner().try_take(),
        }
    }

    /// 当前可用令牌数
    pub fn available(&self) -> f64 {
        match self.bucket.lock() {
            Ok(mut bucket) => bucket.available(),
            Err(poisoned) => poisoned.into_inner().available(),
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY, DEFAULT_REFILL_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_bucket_starts_full() {
        let mut bucket = TokenBucket::new(3.0, 1.0);
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(bucket.try_take());
        assert!(!bucket.try_take());
    }

    #[test]
    fn test_refill_capped_at_capacity() {
        let mut bucket = TokenBucket::new(5.0, 1000.0);
        bucket.try_take();
        bucket.try_take();

        thread::sleep(Duration::from_millis(20));

        assert_eq!(bucket.available(), 5.0);
    }

    #[test]
    fn test_fractional_tokens_accumulate() {
        let mut bucket = TokenBucket::new(1.0, 10.0);
        assert!(bucket.try_take());

        // 每次检查只补充不到一个令牌，但累计起来必须能凑满
        let mut granted = false;
        for _ in 0..20 {
            thread::sleep(Duration::from_millis(20));
            if bucket.try_take() {
                granted = true;
                break;
            }
        }
        assert!(granted);
    }

    #[tokio::test]
    async fn test_burst_within_capacity_is_immediate() {
        let limiter = RateLimiter::with_poll_interval(25.0, 25.0, Duration::from_millis(5));
        let started = std::time::Instant::now();

        for _ in 0..25 {
            limiter.acquire().await;
        }

        assert!(started.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_sustained_rate_is_capped() {
        let capacity = 5.0;
        let rate = 50.0;
        let n = 15;
        let limiter = RateLimiter::with_poll_interval(capacity, rate, Duration::from_millis(5));
        let started = std::time::Instant::now();

        for _ in 0..n {
            limiter.acquire().await;
        }

        // (N - C) / R = 10 / 50 = 0.2s
        let minimum = Duration::from_secs_f64((n as f64 - capacity) / rate);
        assert!(started.elapsed() + Duration::from_millis(5) >= minimum);
    }
}
