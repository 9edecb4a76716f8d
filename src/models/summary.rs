use crate::models::Portfolio;
use std::collections::BTreeSet;
use std::time::Duration;

/// review 模式的运行结果
#[derive(Debug, Clone, Default)]
pub struct ReviewSummary {
    /// 本次审查的记录（来自缓存的全部已获取记录）
    pub reviewed: Vec<Portfolio>,
    /// 出现过的 access model 值，空串表示未设置
    pub access_models: BTreeSet<String>,
    /// 远端报告的总数
    pub total_in_collection: u64,
    /// 记录获取阶段结束时的耗时
    pub retrieval_elapsed: Option<Duration>,
}

impl ReviewSummary {
    /// 某个 access model 值下的记录
    pub fn with_access_model<'a>(&'a self, value: &'a str) -> impl Iterator<Item = &'a Portfolio> {
        self.reviewed
            .iter()
            .filter(move |p| p.access_model_value().unwrap_or("") == value)
    }
}

/// update 模式的运行结果
#[derive(Debug, Clone, Default)]
pub struct UpdateSummary {
    /// 本次 PUT 成功的记录
    pub updated: Vec<Portfolio>,
    /// 本次 PUT 失败的记录（仍留在待更新列表中）
    pub failed: Vec<Portfolio>,
    /// 缓存中已经合规、无需更新的记录
    pub not_updating: Vec<Portfolio>,
    /// 缓存中累计已更新数量（含以前的运行）
    pub cumulative_updated: usize,
    /// 缓存中仍待更新的数量
    pub cumulative_ready: usize,
    pub retrieval_elapsed: Option<Duration>,
    pub apply_elapsed: Option<Duration>,
}

impl UpdateSummary {
    /// 本次尝试 PUT 的数量
    pub fn attempted(&self) -> usize {
        self.updated.len() + self.failed.len()
    }
}
