use crate::cache::budget::{BudgetTracker, DEFAULT_MAX_DAILY_CALLS};
use crate::cache::document::{CacheDocument, PortfolioSet, ScopedSnapshot, SnapshotKind};
use crate::error::{AppResult, CacheError};
use crate::models::{Portfolio, Scope};
use chrono::{DateTime, Utc};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 快照保留时间：7 天
pub const SNAPSHOT_TTL_SECS: f64 = 7.0 * 24.0 * 60.0 * 60.0;

/// 把时间转换为 epoch 秒
pub fn epoch_seconds(now: DateTime<Utc>) -> f64 {
    now.timestamp_millis() as f64 / 1000.0
}

/// `cache.json` -> `cache.json.tmp`
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".tmp");
    PathBuf::from(name)
}

/// 持久化缓存
///
/// 启动时读取一次、结束时写回一次；运行期间只在内存中修改
#[derive(Debug, Clone)]
pub struct PersistentCache {
    document: CacheDocument,
    budget: BudgetTracker,
}

impl PersistentCache {
    /// 创建空缓存
    pub fn new(max_daily_calls: u64) -> Self {
        Self::from_document(CacheDocument::default(), max_daily_calls, Utc::now())
    }

    /// 从文档构建，同时清理过期快照和过期调用记录
    pub fn from_document(
        mut document: CacheDocument,
        max_daily_calls: u64,
        now: DateTime<Utc>,
    ) -> Self {
        let log = std::mem::take(&mut document.api_calls_logged);
        let budget = BudgetTracker::new(max_daily_calls, log, now);
        document.total_api_calls_past_24_hrs = budget.used();

        let mut cache = Self { document, budget };
        cache.expire_all(epoch_seconds(now));
        cache
    }

    /// 读取缓存文件
    ///
    /// 文件不存在或无法解析时返回空缓存，不会失败
    pub fn load(path: &Path, max_daily_calls: u64) -> Self {
        Self::load_at(path, max_daily_calls, Utc::now())
    }

    pub fn load_at(path: &Path, max_daily_calls: u64, now: DateTime<Utc>) -> Self {
        match Self::read_document(path) {
            Ok(document) => {
                let cache = Self::from_document(document, max_daily_calls, now);
                info!(
                    "📂 已加载缓存 {}（今日已用 API 调用 {} 次）",
                    path.display(),
                    cache.budget.used()
                );
                cache
            }
            Err(e) => {
                warn!("⚠️ 无法读取缓存，使用空缓存: {}", e);
                Self::from_document(CacheDocument::default(), max_daily_calls, now)
            }
        }
    }

    fn read_document(path: &Path) -> Result<CacheDocument, CacheError> {
        let content = fs::read_to_string(path).map_err(|source| CacheError::ReadFailed {
            path: path.display().to_string(),
            source,
        })?;
        Ok(serde_json::from_str(&content)?)
    }

    /// 当前状态的完整文档（含调用记录）
    pub fn to_document(&self) -> CacheDocument {
        let mut document = self.document.clone();
        document.api_calls_logged = self.budget.log().to_vec();
        document.total_api_calls_past_24_hrs = self.budget.used();
        document
    }

    /// 写回缓存文件
    ///
    /// 先写临时文件再改名，中途被杀也不会留下截断的缓存
    pub fn save(&self, path: &Path) -> AppResult<()> {
        let content = serde_json::to_string_pretty(&self.to_document()).map_err(CacheError::from)?;
        let temp_path = temp_path_for(path);

        let write_failed = |source| CacheError::WriteFailed {
            path: path.display().to_string(),
            source,
        };
        let mut file = fs::File::create(&temp_path).map_err(write_failed)?;
        file.write_all(content.as_bytes()).map_err(write_failed)?;
        file.sync_all().map_err(write_failed)?;
        fs::rename(&temp_path, path).map_err(write_failed)?;

        info!("💾 缓存已保存: {}", path.display());
        Ok(())
    }

    // ========== 预算 ==========

    pub fn budget(&self) -> &BudgetTracker {
        &self.budget
    }

    pub fn budget_mut(&mut self) -> &mut BudgetTracker {
        &mut self.budget
    }

    pub fn remaining_api_calls(&mut self) -> u64 {
        self.budget.remaining()
    }

    pub fn record_api_calls(&mut self, count: u64) {
        self.budget.record(count);
    }

    // ========== 快照写入 ==========

    /// 追加一个快照，时间戳为当前时间
    pub fn add(&mut self, kind: SnapshotKind, scope: &Scope, data: impl IntoIterator<Item = Portfolio>) {
        self.add_at(kind, scope, data, epoch_seconds(Utc::now()));
    }

    pub fn add_at(
        &mut self,
        kind: SnapshotKind,
        scope: &Scope,
        data: impl IntoIterator<Item = Portfolio>,
        timestamp: f64,
    ) {
        let data: PortfolioSet = data.into_iter().collect();
        debug!("缓存 {} 快照 {}：{} 条", kind.label(), scope, data.len());
        self.document
            .snapshots_mut(kind)
            .push(ScopedSnapshot::new(scope, timestamp, data));
    }

    /// 删除该 scope 下某种类的全部快照
    pub fn remove_all_by_scope(&mut self, kind: SnapshotKind, scope: &Scope) -> usize {
        let snapshots = self.document.snapshots_mut(kind);
        let before = snapshots.len();
        snapshots.retain(|s| !s.belongs_to(scope));
        before - snapshots.len()
    }

    /// 从该 scope 第一个包含此 ID 的快照中删除记录
    pub fn remove_one(&mut self, kind: SnapshotKind, scope: &Scope, id: &str) -> Option<Portfolio> {
        self.document
            .snapshots_mut(kind)
            .iter_mut()
            .filter(|s| s.belongs_to(scope))
            .find_map(|s| s.data.remove(id))
    }

    /// 从所有记录类快照中删除某个 portfolio，返回命中的种类
    pub fn remove_portfolio_everywhere(&mut self, scope: &Scope, id: &str) -> Vec<SnapshotKind> {
        let mut hits = Vec::new();
        for kind in SnapshotKind::RECORDS {
            let mut removed = false;
            for snapshot in self.document.snapshots_mut(kind).iter_mut() {
                if snapshot.belongs_to(scope) && snapshot.data.remove(id).is_some() {
                    removed = true;
                }
            }
            if removed {
                hits.push(kind);
            }
        }
        hits
    }

    /// 删除该 scope 的全部快照
    pub fn clear_scope(&mut self, scope: &Scope) -> usize {
        SnapshotKind::ALL
            .iter()
            .map(|kind| self.remove_all_by_scope(*kind, scope))
            .sum()
    }

    /// 删除所有快照，保留调用记录
    pub fn clear_all_snapshots(&mut self) {
        for kind in SnapshotKind::ALL {
            self.document.snapshots_mut(kind).clear();
        }
    }

    /// 删除早于 TTL 的快照
    pub fn expire(&mut self, kind: SnapshotKind, now: f64) -> usize {
        let cutoff = now - SNAPSHOT_TTL_SECS;
        let snapshots = self.document.snapshots_mut(kind);
        let before = snapshots.len();
        snapshots.retain(|s| s.timestamp > cutoff);
        before - snapshots.len()
    }

    pub fn expire_all(&mut self, now: f64) {
        for kind in SnapshotKind::ALL {
            let removed = self.expire(kind, now);
            if removed > 0 {
                debug!("清理过期 {} 快照 {} 个", kind.label(), removed);
            }
        }
    }

    // ========== 快照读取 ==========

    fn scoped(&self, kind: SnapshotKind, scope: &Scope) -> impl Iterator<Item = &ScopedSnapshot> {
        let scope = scope.clone();
        self.document
            .snapshots(kind)
            .iter()
            .filter(move |s| s.belongs_to(&scope))
    }

    /// 该 scope 下某种类的全部记录，按快照顺序拼接
    pub fn portfolios(&self, kind: SnapshotKind, scope: &Scope) -> Vec<Portfolio> {
        self.scoped(kind, scope)
            .flat_map(|s| s.data.iter().cloned())
            .collect()
    }

    pub fn ids(&self, kind: SnapshotKind, scope: &Scope) -> Vec<String> {
        self.scoped(kind, scope)
            .flat_map(|s| s.data.iter().map(|p| p.id.clone()))
            .collect()
    }

    pub fn count(&self, kind: SnapshotKind, scope: &Scope) -> usize {
        self.scoped(kind, scope).map(|s| s.data.len()).sum()
    }

    pub fn snapshot_count(&self, kind: SnapshotKind) -> usize {
        self.document.snapshots(kind).len()
    }

    // ========== 便捷访问 ==========

    pub fn overview_ids(&self, scope: &Scope) -> Vec<String> {
        self.ids(SnapshotKind::Overview, scope)
    }

    pub fn retrieved_ids(&self, scope: &Scope) -> Vec<String> {
        self.ids(SnapshotKind::Retrieved, scope)
    }

    pub fn retrieved_portfolios(&self, scope: &Scope) -> Vec<Portfolio> {
        self.portfolios(SnapshotKind::Retrieved, scope)
    }

    pub fn ready_to_update_portfolios(&self, scope: &Scope) -> Vec<Portfolio> {
        self.portfolios(SnapshotKind::ReadyToUpdate, scope)
    }

    pub fn not_updating_portfolios(&self, scope: &Scope) -> Vec<Portfolio> {
        self.portfolios(SnapshotKind::NotUpdating, scope)
    }

    pub fn updated_portfolios(&self, scope: &Scope) -> Vec<Portfolio> {
        self.portfolios(SnapshotKind::Updated, scope)
    }
}

impl Default for PersistentCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DAILY_CALLS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::document::CallLogEntry;
    use serde_json::json;
    use tempfile::TempDir;

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn records(ids: &[&str]) -> Vec<Portfolio> {
        ids.iter().map(|id| Portfolio::new(*id)).collect()
    }

    #[test]
    fn test_ttl_boundary() {
        let now = at("2024-05-02T12:00:00Z");
        let now_secs = epoch_seconds(now);
        let scope = Scope::new("61", "62");

        let mut cache = PersistentCache::new(100);
        cache.add_at(SnapshotKind::Retrieved, &scope, records(&["old"]), now_secs - SNAPSHOT_TTL_SECS - 1.0);
        cache.add_at(SnapshotKind::Retrieved, &scope, records(&["new"]), now_secs - SNAPSHOT_TTL_SECS + 1.0);

        assert_eq!(cache.expire(SnapshotKind::Retrieved, now_secs), 1);
        assert_eq!(cache.retrieved_ids(&scope), vec!["new"]);
    }

    #[test]
    fn test_reads_are_scoped() {
        let scope = Scope::new("61", "62");
        let other = Scope::new("61", "99");

        let mut cache = PersistentCache::new(100);
        cache.add(SnapshotKind::Retrieved, &scope, records(&["1", "2"]));
        cache.add(SnapshotKind::Retrieved, &other, records(&["3"]));
        cache.add(SnapshotKind::Retrieved, &scope, records(&["4"]));

        assert_eq!(cache.retrieved_ids(&scope), vec!["1", "2", "4"]);
        assert_eq!(cache.count(SnapshotKind::Retrieved, &other), 1);
        assert_eq!(cache.count(SnapshotKind::Updated, &scope), 0);

        assert_eq!(cache.remove_all_by_scope(SnapshotKind::Retrieved, &scope), 2);
        assert_eq!(cache.snapshot_count(SnapshotKind::Retrieved), 1);
    }

    #[test]
    fn test_remove_one_by_id() {
        let scope = Scope::new("61", "62");
        let mut cache = PersistentCache::new(100);
        cache.add(SnapshotKind::ReadyToUpdate, &scope, records(&["1", "2"]));

        let removed = cache.remove_one(SnapshotKind::ReadyToUpdate, &scope, "1");
        assert_eq!(removed.map(|p| p.id), Some("1".to_string()));
        assert!(cache.remove_one(SnapshotKind::ReadyToUpdate, &scope, "1").is_none());
        assert_eq!(cache.count(SnapshotKind::ReadyToUpdate, &scope), 1);
    }

    #[test]
    fn test_remove_portfolio_everywhere() {
        let scope = Scope::new("61", "62");
        let mut cache = PersistentCache::new(100);
        cache.add(SnapshotKind::Retrieved, &scope, records(&["1", "2"]));
        cache.add(SnapshotKind::Updated, &scope, records(&["1"]));
        cache.add(SnapshotKind::Overview, &scope, records(&["1", "2"]));

        let hits = cache.remove_portfolio_everywhere(&scope, "1");
        assert_eq!(hits, vec![SnapshotKind::Retrieved, SnapshotKind::Updated]);
        assert_eq!(cache.retrieved_ids(&scope), vec!["2"]);
        assert_eq!(cache.overview_ids(&scope), vec!["1", "2"]);
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let scope = Scope::new("61", "62");

        let mut cache = PersistentCache::new(10_000);
        cache.add(SnapshotKind::Overview, &scope, records(&["1", "2"]));
        cache.add(SnapshotKind::NotUpdating, &scope, records(&["2"]));
        cache.record_api_calls(3);
        cache.save(&path).unwrap();

        let mut loaded = PersistentCache::load(&path, 10_000);
        assert_eq!(loaded.overview_ids(&scope), vec!["1", "2"]);
        assert_eq!(loaded.not_updating_portfolios(&scope).len(), 1);
        assert_eq!(loaded.remaining_api_calls(), 9_997);

        let raw: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw["total_api_calls_past_24_hrs"], json!(3));
        assert!(raw["portfolios_not_updating"][0].get("saved").is_some());
    }

    #[test]
    fn test_corrupt_or_missing_file_gives_empty_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");

        let mut cache = PersistentCache::load(&path, 50);
        assert_eq!(cache.remaining_api_calls(), 50);

        fs::write(&path, "{ not json").unwrap();
        let cache = PersistentCache::load(&path, 50);
        assert_eq!(cache.snapshot_count(SnapshotKind::Retrieved), 0);
    }

    #[test]
    fn test_bad_call_log_entry_keeps_rest_of_cache() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        let now = Utc::now();
        let raw = json!({
            "portfolios_retrieved": [
                { "collection_id": "61", "service_id": "62", "retrieved": epoch_seconds(now), "data": [{ "id": "1" }] }
            ],
            "api_calls_logged": [
                { "count": 9000, "time": now.to_rfc3339() },
                { "count": 5, "time": null }
            ]
        });
        fs::write(&path, raw.to_string()).unwrap();

        let mut cache = PersistentCache::load_at(&path, 10_000, now);
        assert_eq!(cache.budget_mut().remaining_at(now), 1_000);
        assert_eq!(cache.retrieved_ids(&Scope::new("61", "62")), vec!["1"]);
    }

    #[test]
    fn test_save_replaces_file_without_leftovers() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cache.json");
        fs::write(&path, "old contents").unwrap();

        let mut cache = PersistentCache::new(100);
        cache.record_api_calls(7);
        tokio_test::assert_ok!(cache.save(&path));

        assert!(!temp_path_for(&path).exists());
        assert_eq!(temp_path_for(&path), dir.path().join("cache.json.tmp"));
        let mut loaded = PersistentCache::load(&path, 100);
        assert_eq!(loaded.remaining_api_calls(), 93);
    }

    #[test]
    fn test_load_recomputes_daily_total() {
        let now = at("2024-05-02T12:00:00Z");
        let document = CacheDocument {
            api_calls_logged: vec![
                CallLogEntry { count: 9000, time: "2024-05-01T23:00:00+00:00".to_string() },
                CallLogEntry { count: 100, time: "2024-05-02T01:00:00+00:00".to_string() },
            ],
            total_api_calls_past_24_hrs: 9100,
            ..Default::default()
        };

        let mut cache = PersistentCache::from_document(document, 10_000, now);
        assert_eq!(cache.to_document().total_api_calls_past_24_hrs, 100);
        assert_eq!(cache.budget_mut().remaining_at(now), 9_900);
    }

    #[test]
    fn test_clear_keeps_call_log() {
        let scope = Scope::new("61", "62");
        let mut cache = PersistentCache::new(100);
        cache.add(SnapshotKind::Retrieved, &scope, records(&["1"]));
        cache.add(SnapshotKind::Updated, &Scope::new("7", "8"), records(&["9"]));
        cache.record_api_calls(4);

        assert_eq!(cache.clear_scope(&scope), 1);
        assert_eq!(cache.snapshot_count(SnapshotKind::Updated), 1);

        cache.clear_all_snapshots();
        assert_eq!(cache.snapshot_count(SnapshotKind::Updated), 0);
        assert_eq!(cache.budget().used(), 4);
    }
}
