use serde::{Deserialize, Serialize};
use std::fmt;

/// (collection, service) 标识对
///
/// 所有缓存快照和远端调用都按 Scope 划分
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub struct Scope {
    pub collection_id: String,
    #[serde(default)]
    pub service_id: String,
}

impl Scope {
    pub fn new(collection_id: impl Into<String>, service_id: impl Into<String>) -> Self {
        Self {
            collection_id: collection_id.into(),
            service_id: service_id.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[collection #{} service #{}]",
            self.collection_id, self.service_id
        )
    }
}
