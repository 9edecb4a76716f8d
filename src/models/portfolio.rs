use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Public access model 子结构
///
/// 除 `value`/`desc` 外的字段保存在 `extra` 中，PUT 时原样回写
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PublicAccessModel {
    #[serde(default)]
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub desc: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 远端 portfolio 记录
///
/// 只有 `id` 和 `public_access_model` 是强类型字段，其余字段（resource_metadata 等）
/// 保存在 `extra` 中，保证 PUT 时发送完整记录
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub id: String,
    #[serde(default)]
    pub public_access_model: Option<PublicAccessModel>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Portfolio {
    /// 创建只有 ID 的记录
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            public_access_model: None,
            extra: Map::new(),
        }
    }

    /// 当前 access model 值（缺失时为 None）
    pub fn access_model_value(&self) -> Option<&str> {
        self.public_access_model.as_ref().map(|m| m.value.as_str())
    }

    /// 当前 access model 描述
    pub fn access_model_desc(&self) -> Option<&str> {
        self.public_access_model
            .as_ref()
            .and_then(|m| m.desc.as_deref())
    }

    /// 标题（resource_metadata.title）
    pub fn title(&self) -> Option<&str> {
        self.extra
            .get("resource_metadata")
            .and_then(|m| m.get("title"))
            .and_then(Value::as_str)
    }

    /// MMS ID（resource_metadata.mms_id.value）
    pub fn mms_id(&self) -> Option<&str> {
        self.extra
            .get("resource_metadata")
            .and_then(|m| m.get("mms_id"))
            .and_then(|m| m.get("value"))
            .and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_fields_survive() {
        let raw = json!({
            "id": "5310",
            "is_local": true,
            "public_access_model": { "value": "", "desc": "", "link": "x" },
            "resource_metadata": { "title": "Nature", "mms_id": { "value": "991" } }
        });

        let portfolio: Portfolio = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(portfolio.title(), Some("Nature"));
        assert_eq!(portfolio.mms_id(), Some("991"));
        assert_eq!(portfolio.access_model_value(), Some(""));

        let back = serde_json::to_value(&portfolio).unwrap();
        assert_eq!(back, raw);
    }

    #[test]
    fn test_null_access_model() {
        let portfolio: Portfolio =
            serde_json::from_value(json!({ "id": "1", "public_access_model": null })).unwrap();
        assert!(portfolio.public_access_model.is_none());

        let portfolio: Portfolio = serde_json::from_value(json!({ "id": "2" })).unwrap();
        assert!(portfolio.public_access_model.is_none());
    }
}
