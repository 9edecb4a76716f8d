//! Access model 分类服务 - 业务能力层
//!
//! 只判断和修改单条记录，不关心缓存和流程

use crate::config::Config;
use crate::models::{Portfolio, PublicAccessModel};
use serde_json::Map;
use tracing::debug;

/// 分类结果
#[derive(Debug, Clone, Default)]
pub struct Classification {
    /// 已写入目标值、等待 PUT 的记录
    pub ready_to_update: Vec<Portfolio>,
    /// 已有 access model、保持不变的记录
    pub not_updating: Vec<Portfolio>,
}

impl Classification {
    pub fn len(&self) -> usize {
        self.ready_to_update.len() + self.not_updating.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Public access model 服务
///
/// 持有要写入的目标 code 和描述
#[derive(Debug, Clone)]
pub struct AccessModelService {
    code: String,
    desc: String,
}

impl AccessModelService {
    /// 创建新的 access model 服务
    ///
    /// # 参数
    /// - `code`: 目标值（如 `UA`）
    /// - `desc`: 目标描述
    pub fn new(code: impl Into<String>, desc: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            desc: desc.into(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            config.public_access_model_code.clone(),
            config.public_access_model_desc.clone(),
        )
    }

    /// 记录是否需要更新：值为空串，或整个字段缺失
    pub fn needs_update(portfolio: &Portfolio) -> bool {
        match &portfolio.public_access_model {
            None => true,
            Some(model) => model.value.is_empty(),
        }
    }

    /// 就地写入目标值，保留子结构中的其他字段
    pub fn apply(&self, portfolio: &mut Portfolio) {
        match portfolio.public_access_model.as_mut() {
            Some(model) => {
                model.value = self.code.clone();
                model.desc = Some(self.desc.clone());
            }
            None => {
                portfolio.public_access_model = Some(PublicAccessModel {
                    value: self.code.clone(),
                    desc: Some(self.desc.clone()),
                    extra: Map::new(),
                });
            }
        }
    }

    /// 把每条记录分到且只分到一个列表
    pub fn classify(&self, portfolios: impl IntoIterator<Item = Portfolio>) -> Classification {
        let mut result = Classification::default();

        for mut portfolio in portfolios {
            if Self::needs_update(&portfolio) {
                self.apply(&mut portfolio);
                result.ready_to_update.push(portfolio);
            } else {
                result.not_updating.push(portfolio);
            }
        }

        debug!(
            "分类完成: 待更新 {} / 无需更新 {}",
            result.ready_to_update.len(),
            result.not_updating.len()
        );
        result
    }
}
