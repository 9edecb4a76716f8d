//! 基础设施层（Infrastructure）
//!
//! 持有稀缺资源（令牌、并发槽位），只暴露能力，不认识 portfolio

pub mod concurrency;
pub mod rate_limiter;

pub use concurrency::ConcurrencyLimiter;
pub use rate_limiter::{RateLimiter, TokenBucket};
