use crate::error::{AppError, AppResult, ConfigError};
use crate::models::Scope;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// 运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// 只读审查
    Review,
    /// 更新缺失的 public access model
    Update,
    /// 清空所有缓存快照（保留 API 调用记录）
    ClearCacheAll,
    /// 清空当前 collection/service 的缓存快照
    ClearCacheCollection,
    /// 从当前 collection/service 的缓存中移除单个 portfolio
    ClearCachePortfolio,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Review => "review",
            Mode::Update => "update",
            Mode::ClearCacheAll => "clear_cache_all",
            Mode::ClearCacheCollection => "clear_cache_collection",
            Mode::ClearCachePortfolio => "clear_cache_portfolio",
        }
    }

    /// 是否需要 collection/service 标识
    pub fn needs_scope(&self) -> bool {
        !matches!(self, Mode::ClearCacheAll)
    }
}

impl FromStr for Mode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "review" => Ok(Mode::Review),
            "update" => Ok(Mode::Update),
            "clear_cache_all" => Ok(Mode::ClearCacheAll),
            "clear_cache_collection" => Ok(Mode::ClearCacheCollection),
            "clear_cache_portfolio" | "clear_cache_portfolios" => Ok(Mode::ClearCachePortfolio),
            other => Err(ConfigError::EnvVarParseFailed {
                var_name: "MODE".to_string(),
                value: other.to_string(),
                expected_type: "review | update | clear_cache_all | clear_cache_collection | clear_cache_portfolio".to_string(),
            }),
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 程序配置
#[derive(Clone, Debug)]
pub struct Config {
    /// 运行模式
    pub mode: Mode,
    /// Electronic collection ID
    pub collection_id: String,
    /// Electronic service ID
    pub service_id: String,
    /// clear_cache_portfolio 模式下要移除的 portfolio ID
    pub portfolio_id: Option<String>,
    // --- Alma API 配置 ---
    pub api_key: String,
    pub api_base_url: String,
    /// 每日 API 调用上限（需考虑其他系统共用的额度）
    pub max_api_calls_per_day: u64,
    /// 同时进行中的请求数量
    pub max_concurrent_requests: usize,
    /// 令牌桶每秒补充数量
    pub rate_limit_per_second: f64,
    /// 令牌桶容量
    pub rate_limit_burst: f64,
    // --- 更新目标值 ---
    pub public_access_model_code: String,
    pub public_access_model_desc: String,
    /// 缓存文件路径
    pub cache_file: PathBuf,
    /// 报告输出目录
    pub output_dir: PathBuf,
    /// 是否显示详细日志
    pub verbose_logging: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: Mode::Review,
            collection_id: String::new(),
            service_id: String::new(),
            portfolio_id: None,
            api_key: String::new(),
            api_base_url: "https://api-na.hosted.exlibrisgroup.com/almaws/v1/electronic"
                .to_string(),
            max_api_calls_per_day: 10_000,
            max_concurrent_requests: 30,
            rate_limit_per_second: 25.0,
            rate_limit_burst: 25.0,
            public_access_model_code: "UA".to_string(),
            public_access_model_desc: "- Please note that the platform supports unlimited access"
                .to_string(),
            cache_file: PathBuf::from("cache.json"),
            output_dir: PathBuf::from("."),
            verbose_logging: false,
        }
    }
}

impl Config {
    pub fn from_env() -> AppResult<Self> {
        let default = Self::default();
        let mode = match std::env::var("MODE") {
            Ok(v) => v.parse::<Mode>()?,
            Err(_) => default.mode,
        };

        let config = Self {
            mode,
            collection_id: std::env::var("COLLECTION_ID").unwrap_or(default.collection_id),
            service_id: std::env::var("SERVICE_ID").unwrap_or(default.service_id),
            portfolio_id: std::env::var("PORTFOLIO_ID").ok().filter(|v| !v.trim().is_empty()),
            api_key: std::env::var("ALMA_API_KEY").unwrap_or(default.api_key),
            api_base_url: std::env::var("ALMA_API_BASE_URL").unwrap_or(default.api_base_url),
            max_api_calls_per_day: std::env::var("MAX_API_CALLS_PER_DAY").ok().and_then(|v| v.parse().ok()).unwrap_or(default.max_api_calls_per_day),
            max_concurrent_requests: std::env::var("MAX_CONCURRENT_REQUESTS").ok().and_then(|v| v.parse().ok()).filter(|n| *n > 0).unwrap_or(default.max_concurrent_requests),
            rate_limit_per_second: std::env::var("RATE_LIMIT_PER_SECOND").ok().and_then(|v| v.parse().ok()).filter(|r: &f64| *r > 0.0).unwrap_or(default.rate_limit_per_second),
            rate_limit_burst: std::env::var("RATE_LIMIT_BURST").ok().and_then(|v| v.parse().ok()).filter(|c: &f64| *c >= 1.0).unwrap_or(default.rate_limit_burst),
            public_access_model_code: std::env::var("PUBLIC_ACCESS_MODEL_CODE").unwrap_or(default.public_access_model_code),
            public_access_model_desc: std::env::var("PUBLIC_ACCESS_MODEL_DESC").unwrap_or(default.public_access_model_desc),
            cache_file: std::env::var("CACHE_FILE").map(PathBuf::from).unwrap_or(default.cache_file),
            output_dir: std::env::var("OUTPUT_DIR").map(PathBuf::from).unwrap_or(default.output_dir),
            verbose_logging: std::env::var("VERBOSE_LOGGING").ok().and_then(|v| v.parse().ok()).unwrap_or(default.verbose_logging),
        };

        config.validate()?;
        Ok(config)
    }

    /// 本次运行操作的 (collection, service)
    pub fn scope(&self) -> Scope {
        Scope::new(self.collection_id.trim(), self.service_id.trim())
    }

    /// 检查当前模式所需的配置项是否齐全
    pub fn validate(&self) -> AppResult<()> {
        if self.mode.needs_scope() {
            if self.collection_id.trim().is_empty() {
                return Err(AppError::env_var_not_found("COLLECTION_ID"));
            }
            if self.service_id.trim().is_empty() {
                return Err(AppError::env_var_not_found("SERVICE_ID"));
            }
        }
        if self.mode == Mode::ClearCachePortfolio && self.portfolio_id.is_none() {
            return Err(AppError::env_var_not_found("PORTFOLIO_ID"));
        }
        Ok(())
    }
}
