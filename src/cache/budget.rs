//! 每日 API 调用预算
//!
//! 调用记录随缓存文件持久化，每个 UTC 午夜重置

use crate::cache::document::CallLogEntry;
use chrono::{DateTime, Local, TimeZone, Utc};
use tracing::debug;

/// 默认每日最大调用次数
pub const DEFAULT_MAX_DAILY_CALLS: u64 = 10_000;

/// 一次批量操作在预算下能执行多少
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BudgetDecision {
    /// 全部执行
    Full(usize),
    /// 只能执行前 `allowed` 个
    Truncated { allowed: usize, wanted: usize },
    /// 一个都不能执行
    Exhausted,
}

impl BudgetDecision {
    /// 实际允许执行的数量
    pub fn allowed(&self) -> usize {
        match self {
            BudgetDecision::Full(n) => *n,
            BudgetDecision::Truncated { allowed, .. } => *allowed,
            BudgetDecision::Exhausted => 0,
        }
    }

    /// 是否没有覆盖全部工作
    pub fn is_short(&self) -> bool {
        !matches!(self, BudgetDecision::Full(_))
    }
}

/// 预算跟踪器
#[derive(Debug, Clone)]
pub struct BudgetTracker {
    max_daily_calls: u64,
    log: Vec<CallLogEntry>,
    used: u64,
}

impl BudgetTracker {
    /// 创建跟踪器，并立即丢弃今天以前的记录
    pub fn new(max_daily_calls: u64, log: Vec<CallLogEntry>, now: DateTime<Utc>) -> Self {
        let mut tracker = Self {
            max_daily_calls,
            log,
            used: 0,
        };
        tracker.expire(now);
        tracker
    }

    pub fn max_daily_calls(&self) -> u64 {
        self.max_daily_calls
    }

    /// 最近一次计算出的今日已用次数
    pub fn used(&self) -> u64 {
        self.used
    }

    pub fn log(&self) -> &[CallLogEntry] {
        &self.log
    }

    /// 只保留严格晚于最近一个 UTC 午夜的记录，时间无法解析的条目一并丢弃
    pub fn expire(&mut self, now: DateTime<Utc>) {
        let midnight = utc_midnight(now);
        let before = self.log.len();

        self.log.retain(|entry| {
            DateTime::parse_from_rfc3339(&entry.time)
                .map(|t| t.with_timezone(&Utc) > midnight)
                .unwrap_or(false)
        });
        self.used = self.log.iter().map(|e| e.count).sum();

        if before != self.log.len() {
            debug!("清理过期调用记录 {} 条", before - self.log.len());
        }
    }

    /// 今日剩余可用次数
    pub fn remaining(&mut self) -> u64 {
        self.remaining_at(Utc::now())
    }

    pub fn remaining_at(&mut self, now: DateTime<Utc>) -> u64 {
        self.expire(now);
        self.max_daily_calls.saturating_sub(self.used)
    }

    /// 记录一次批量调用
    pub fn record(&mut self, count: u64) {
        self.record_at(count, Utc::now());
    }

    pub fn record_at(&mut self, count: u64, now: DateTime<Utc>) {
        if count == 0 {
            return;
        }
        self.log.push(CallLogEntry {
            count,
            time: now.with_timezone(&Local).to_rfc3339(),
        });
        self.expire(now);
    }

    /// 根据剩余预算决定 `wanted` 个调用能执行多少
    pub fn plan(&mut self, wanted: usize) -> BudgetDecision {
        self.plan_at(wanted, Utc::now())
    }

    pub fn plan_at(&mut self, wanted: usize, now: DateTime<Utc>) -> BudgetDecision {
        let remaining = usize::try_from(self.remaining_at(now)).unwrap_or(usize::MAX);

        if remaining >= wanted {
            BudgetDecision::Full(wanted)
        } else if remaining == 0 {
            BudgetDecision::Exhausted
        } else {
            BudgetDecision::Truncated {
                allowed: remaining,
                wanted,
            }
        }
    }
}

fn utc_midnight(now: DateTime<Utc>) -> DateTime<Utc> {
    let midnight = now
        .date_naive()
        .and_hms_opt(0, 0, 0)
        .unwrap_or_else(|| now.naive_utc());
    Utc.from_utc_datetime(&midnight)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn entry(count: u64, time: &str) -> CallLogEntry {
        CallLogEntry {
            count,
            time: time.to_string(),
        }
    }

    #[test]
    fn test_yesterday_calls_do_not_count() {
        let now = at("2024-05-02T12:00:00Z");
        let log = vec![
            entry(9000, "2024-05-01T23:00:00+00:00"),
            entry(100, "2024-05-02T01:00:00+00:00"),
        ];

        let mut budget = BudgetTracker::new(10_000, log, now);
        assert_eq!(budget.remaining_at(now), 9900);
        assert_eq!(budget.log().len(), 1);
    }

    #[test]
    fn test_offsets_are_normalized_to_utc() {
        let now = at("2024-05-02T12:00:00Z");
        // 本地时间 5 月 1 日 22:00 (-05:00) 等于 UTC 5 月 2 日 03:00
        let log = vec![entry(40, "2024-05-01T22:00:00.123456-05:00")];

        let mut budget = BudgetTracker::new(100, log, now);
        assert_eq!(budget.remaining_at(now), 60);
    }

    #[test]
    fn test_midnight_entry_and_garbage_are_dropped() {
        let now = at("2024-05-02T12:00:00Z");
        let log = vec![
            entry(5, "2024-05-02T00:00:00+00:00"),
            entry(7, "not a time"),
        ];

        let budget = BudgetTracker::new(100, log, now);
        assert_eq!(budget.used(), 0);
        assert!(budget.log().is_empty());
    }

    #[test]
    fn test_record_and_rollover() {
        let day_one = at("2024-05-02T23:30:00Z");
        let mut budget = BudgetTracker::new(100, Vec::new(), day_one);

        budget.record_at(30, day_one);
        budget.record_at(0, day_one);
        assert_eq!(budget.remaining_at(day_one), 70);
        assert_eq!(budget.log().len(), 1);

        let day_two = at("2024-05-03T00:00:01Z");
        assert_eq!(budget.remaining_at(day_two), 100);
    }

    #[test]
    fn test_remaining_never_negative() {
        let now = at("2024-05-02T12:00:00Z");
        let mut budget = BudgetTracker::new(10, vec![entry(50, "2024-05-02T11:00:00Z")], now);
        assert_eq!(budget.remaining_at(now), 0);
    }

    #[test]
    fn test_plan_truncates_to_remaining() {
        let now = at("2024-05-02T12:00:00Z");
        let mut budget = BudgetTracker::new(10, Vec::new(), now);

        assert_eq!(budget.plan_at(5, now), BudgetDecision::Full(5));

        let decision = budget.plan_at(15, now);
        assert_eq!(decision, BudgetDecision::Truncated { allowed: 10, wanted: 15 });
        assert_eq!(decision.allowed(), 10);
        assert!(decision.is_short());

        budget.record_at(10, now);
        assert_eq!(budget.plan_at(1, now), BudgetDecision::Exhausted);
        assert_eq!(budget.plan_at(0, now), BudgetDecision::Full(0));
    }
}
