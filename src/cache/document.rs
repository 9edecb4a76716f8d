//! 缓存文件的磁盘格式
//!
//! 顶层键与历史缓存文件保持一致，快照时间戳键按种类写出
//! （`retrieved` / `updated` / `saved`），读取时三者均可接受。

use crate::models::{Portfolio, Scope};
use serde::de::{DeserializeOwned, Deserializer};
use serde::ser::{SerializeMap, SerializeSeq, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

/// 快照种类
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SnapshotKind {
    /// collection 列表概览（只有 ID 和少量字段）
    Overview,
    /// 已获取的完整记录
    Retrieved,
    /// 已准备好、等待 PUT 的记录
    ReadyToUpdate,
    /// 已经合规、不需要更新的记录
    NotUpdating,
    /// 已成功更新的记录
    Updated,
}

impl SnapshotKind {
    pub const ALL: [SnapshotKind; 5] = [
        SnapshotKind::Overview,
        SnapshotKind::Retrieved,
        SnapshotKind::ReadyToUpdate,
        SnapshotKind::NotUpdating,
        SnapshotKind::Updated,
    ];

    /// 保存完整记录的种类（不含概览）
    pub const RECORDS: [SnapshotKind; 4] = [
        SnapshotKind::Retrieved,
        SnapshotKind::ReadyToUpdate,
        SnapshotKind::Updated,
        SnapshotKind::NotUpdating,
    ];

    /// 磁盘上的时间戳键
    pub fn time_field(&self) -> &'static str {
        match self {
            SnapshotKind::Overview | SnapshotKind::Retrieved => "retrieved",
            SnapshotKind::Updated => "updated",
            SnapshotKind::ReadyToUpdate | SnapshotKind::NotUpdating => "saved",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SnapshotKind::Overview => "overview",
            SnapshotKind::Retrieved => "retrieved",
            SnapshotKind::ReadyToUpdate => "ready to update",
            SnapshotKind::NotUpdating => "not updating",
            SnapshotKind::Updated => "updated",
        }
    }
}

/// 按 `id` 索引、保持插入顺序的 portfolio 集合
///
/// 删除按 ID 进行，不依赖整条记录的结构相等
#[derive(Debug, Clone, Default)]
pub struct PortfolioSet {
    order: Vec<String>,
    entries: HashMap<String, Portfolio>,
    stale: usize,
}

impl PortfolioSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入记录；同一 ID 已存在时替换并返回旧记录
    pub fn insert(&mut self, portfolio: Portfolio) -> Option<Portfolio> {
        if !self.entries.contains_key(&portfolio.id) {
            if self.stale > 0 {
                self.compact();
            }
            self.order.push(portfolio.id.clone());
        }
        self.entries.insert(portfolio.id.clone(), portfolio)
    }

    pub fn remove(&mut self, id: &str) -> Option<Portfolio> {
        let removed = self.entries.remove(id);
        if removed.is_some() {
            self.stale += 1;
        }
        removed
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn get(&self, id: &str) -> Option<&Portfolio> {
        self.entries.get(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = &Portfolio> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    fn compact(&mut self) {
        let entries = &self.entries;
        self.order.retain(|id| entries.contains_key(id));
        self.stale = 0;
    }
}

impl FromIterator<Portfolio> for PortfolioSet {
    fn from_iter<I: IntoIterator<Item = Portfolio>>(iter: I) -> Self {
        let mut set = PortfolioSet::new();
        for portfolio in iter {
            set.insert(portfolio);
        }
        set
    }
}

impl Serialize for PortfolioSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.len()))?;
        for portfolio in self.iter() {
            seq.serialize_element(portfolio)?;
        }
        seq.end()
    }
}

/// 容错读取：非数组（旧格式的空对象）视为空集合，无法解析的条目跳过
fn lenient_portfolios<'de, D>(deserializer: D) -> Result<PortfolioSet, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    let Value::Array(items) = raw else {
        return Ok(PortfolioSet::new());
    };

    let mut set = PortfolioSet::new();
    for item in items {
        match serde_json::from_value::<Portfolio>(item) {
            Ok(portfolio) => {
                set.insert(portfolio);
            }
            Err(e) => warn!("跳过无法解析的缓存条目: {}", e),
        }
    }
    Ok(set)
}

/// 容错读取列表：非数组视为空，逐条解析，坏条目跳过
fn lenient_list<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let raw = Value::deserialize(deserializer)?;
    let Value::Array(items) = raw else {
        return Ok(Vec::new());
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<T>(item) {
            Ok(entry) => Some(entry),
            Err(e) => {
                warn!("跳过无法解析的缓存条目: {}", e);
                None
            }
        })
        .collect())
}

/// 磁盘上的合计值不参与计算，读不出来就当 0
fn lenient_total<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Value::deserialize(deserializer)?;
    Ok(raw.as_u64().unwrap_or(0))
}

/// 一次带时间戳、带 scope 的 portfolio 快照
#[derive(Debug, Clone, Deserialize)]
pub struct ScopedSnapshot {
    #[serde(default)]
    pub collection_id: String,
    #[serde(default)]
    pub service_id: String,
    /// epoch 秒
    #[serde(rename = "retrieved", alias = "updated", alias = "saved", default)]
    pub timestamp: f64,
    #[serde(default, deserialize_with = "lenient_portfolios")]
    pub data: PortfolioSet,
}

impl ScopedSnapshot {
    pub fn new(scope: &Scope, timestamp: f64, data: PortfolioSet) -> Self {
        Self {
            collection_id: scope.collection_id.clone(),
            service_id: scope.service_id.clone(),
            timestamp,
            data,
        }
    }

    pub fn belongs_to(&self, scope: &Scope) -> bool {
        self.collection_id == scope.collection_id && self.service_id == scope.service_id
    }
}

/// 单次批量调用的记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallLogEntry {
    pub count: u64,
    /// 带时区偏移的 ISO-8601 时间
    pub time: String,
}

/// 缓存文件整体（唯一的持久化单元）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheDocument {
    #[serde(
        default,
        serialize_with = "serialize_retrieved",
        deserialize_with = "lenient_list"
    )]
    pub collection_overviews: Vec<ScopedSnapshot>,
    #[serde(
        default,
        serialize_with = "serialize_retrieved",
        deserialize_with = "lenient_list"
    )]
    pub portfolios_retrieved: Vec<ScopedSnapshot>,
    #[serde(
        default,
        serialize_with = "serialize_updated",
        deserialize_with = "lenient_list"
    )]
    pub portfolios_updated: Vec<ScopedSnapshot>,
    #[serde(
        default,
        serialize_with = "serialize_saved",
        deserialize_with = "lenient_list"
    )]
    pub portfolios_ready_to_update: Vec<ScopedSnapshot>,
    #[serde(
        default,
        serialize_with = "serialize_saved",
        deserialize_with = "lenient_list"
    )]
    pub portfolios_not_updating: Vec<ScopedSnapshot>,
    #[serde(default, deserialize_with = "lenient_list")]
    pub api_calls_logged: Vec<CallLogEntry>,
    /// 读取时重新计算，不信任磁盘上的值
    #[serde(default, deserialize_with = "lenient_total")]
    pub total_api_calls_past_24_hrs: u64,
}

impl CacheDocument {
    pub fn snapshots(&self, kind: SnapshotKind) -> &Vec<ScopedSnapshot> {
        match kind {
            SnapshotKind::Overview => &self.collection_overviews,
            SnapshotKind::Retrieved => &self.portfolios_retrieved,
            SnapshotKind::ReadyToUpdate => &self.portfolios_ready_to_update,
            SnapshotKind::NotUpdating => &self.portfolios_not_updating,
            SnapshotKind::Updated => &self.portfolios_updated,
        }
    }

    pub fn snapshots_mut(&mut self, kind: SnapshotKind) -> &mut Vec<ScopedSnapshot> {
        match kind {
            SnapshotKind::Overview => &mut self.collection_overviews,
            SnapshotKind::Retrieved => &mut self.portfolios_retrieved,
            SnapshotKind::ReadyToUpdate => &mut self.portfolios_ready_to_update,
            SnapshotKind::NotUpdating => &mut self.portfolios_not_updating,
            SnapshotKind::Updated => &mut self.portfolios_updated,
        }
    }
}

struct KindedSnapshot<'a> {
    time_field: &'static str,
    snapshot: &'a ScopedSnapshot,
}

impl Serialize for KindedSnapshot<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(4))?;
        map.serialize_entry("collection_id", &self.snapshot.collection_id)?;
        map.serialize_entry("service_id", &self.snapshot.service_id)?;
        map.serialize_entry(self.time_field, &self.snapshot.timestamp)?;
        map.serialize_entry("data", &self.snapshot.data)?;
        map.end()
    }
}

fn serialize_kinded<S: Serializer>(
    snapshots: &[ScopedSnapshot],
    time_field: &'static str,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    let mut seq = serializer.serialize_seq(Some(snapshots.len()))?;
    for snapshot in snapshots {
        seq.serialize_element(&KindedSnapshot {
            time_field,
            snapshot,
        })?;
    }
    seq.end()
}

fn serialize_retrieved<S: Serializer>(v: &[ScopedSnapshot], s: S) -> Result<S::Ok, S::Error> {
    serialize_kinded(v, "retrieved", s)
}

fn serialize_updated<S: Serializer>(v: &[ScopedSnapshot], s: S) -> Result<S::Ok, S::Error> {
    serialize_kinded(v, "updated", s)
}

fn serialize_saved<S: Serializer>(v: &[ScopedSnapshot], s: S) -> Result<S::Ok, S::Error> {
    serialize_kinded(v, "saved", s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_removes_by_id_after_mutation() {
        let mut set: PortfolioSet = vec![Portfolio::new("a"), Portfolio::new("b")]
            .into_iter()
            .collect();

        // 修改后的记录与缓存中的原记录不再相等，但仍能按 ID 删除
        let mut changed = set.get("a").cloned().unwrap();
        changed.extra.insert("touched".to_string(), json!(true));
        assert!(set.remove(&changed.id).is_some());

        assert_eq!(set.len(), 1);
        assert_eq!(set.iter().map(|p| p.id.as_str()).collect::<Vec<_>>(), vec!["b"]);
    }

    #[test]
    fn test_set_reinsert_keeps_single_entry() {
        let mut set = PortfolioSet::new();
        set.insert(Portfolio::new("a"));
        set.insert(Portfolio::new("b"));
        set.remove("a");
        set.insert(Portfolio::new("a"));
        set.insert(Portfolio::new("b"));

        let ids: Vec<_> = set.iter().map(|p| p.id.clone()).collect();
        assert_eq!(ids, vec!["b", "a"]);
    }

    #[test]
    fn test_time_field_per_kind() {
        let scope = Scope::new("61", "62");
        let mut doc = CacheDocument::default();
        for kind in SnapshotKind::ALL {
            doc.snapshots_mut(kind)
                .push(ScopedSnapshot::new(&scope, 10.0, PortfolioSet::new()));
        }

        let value = serde_json::to_value(&doc).unwrap();
        assert_eq!(value["collection_overviews"][0]["retrieved"], json!(10.0));
        assert_eq!(value["portfolios_updated"][0]["updated"], json!(10.0));
        assert_eq!(value["portfolios_ready_to_update"][0]["saved"], json!(10.0));
        assert_eq!(value["portfolios_not_updating"][0]["service_id"], json!("62"));
    }

    #[test]
    fn test_reads_legacy_document() {
        let raw = json!({
            "collection_overviews": [{ "collection_id": "", "retrieved": 0.0, "data": {} }],
            "portfolios_retrieved": [{ "collection_id": "61", "retrieved": 5.0, "data": [{ "id": "1" }, { "bad": 1 }] }],
            "portfolios_updated": [{ "collection_id": "61", "updated": 6.0, "data": [] }],
            "api_calls_logged": [{ "count": 3, "time": "2024-05-01T10:00:00.123456-05:00" }],
            "total_api_calls_past_24_hrs": 99
        });

        let doc: CacheDocument = serde_json::from_value(raw).unwrap();
        assert!(doc.collection_overviews[0].data.is_empty());
        assert_eq!(doc.portfolios_retrieved[0].data.len(), 1);
        assert_eq!(doc.portfolios_retrieved[0].service_id, "");
        assert_eq!(doc.portfolios_updated[0].timestamp, 6.0);
        assert!(doc.portfolios_ready_to_update.is_empty());
        assert_eq!(doc.api_calls_logged.len(), 1);
    }

    #[test]
    fn test_bad_entries_are_skipped_individually() {
        let raw = json!({
            "portfolios_retrieved": [
                { "collection_id": "61", "retrieved": 5.0, "data": [{ "id": "1" }] },
                { "collection_id": 61, "retrieved": "yesterday", "data": [] }
            ],
            "portfolios_updated": "broken",
            "api_calls_logged": [
                { "count": 9000, "time": "2024-05-01T10:00:00+00:00" },
                { "count": 5, "time": null },
                { "count": "many", "time": "2024-05-01T11:00:00+00:00" }
            ],
            "total_api_calls_past_24_hrs": "n/a"
        });

        let doc: CacheDocument = serde_json::from_value(raw).unwrap();
        assert_eq!(doc.portfolios_retrieved.len(), 1);
        assert_eq!(doc.portfolios_retrieved[0].data.len(), 1);
        assert!(doc.portfolios_updated.is_empty());
        assert_eq!(
            doc.api_calls_logged,
            vec![CallLogEntry { count: 9000, time: "2024-05-01T10:00:00+00:00".to_string() }]
        );
        assert_eq!(doc.total_api_calls_past_24_hrs, 0);
    }
}
