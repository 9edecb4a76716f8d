//! 运行上下文
//!
//! 封装"这一次运行处理的是哪个 scope、出了哪些错、走到了哪一步"

use crate::config::Mode;
use crate::error::AppError;
use crate::models::{ReviewSummary, Scope, UpdateSummary};
use crate::utils::format_elapsed;
use std::fmt::Display;
use std::time::{Duration, Instant};
use tracing::{error, info};

/// 流程所处阶段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Init,
    /// 已拿到远端总数
    OverviewFetched,
    /// 已拿到完整 ID 列表
    IdsResolved,
    /// 已获取（部分或全部）完整记录
    DetailsResolved,
    /// review 结束
    Done,
    /// 已分类出待更新列表
    PreparedForUpdate,
    /// update 结束
    Applied,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::Init => "初始化",
            Stage::OverviewFetched => "已获取总数",
            Stage::IdsResolved => "已获取 ID 列表",
            Stage::DetailsResolved => "已获取记录详情",
            Stage::Done => "审查完成",
            Stage::PreparedForUpdate => "已准备更新",
            Stage::Applied => "更新完成",
        }
    }
}

/// 本次运行的错误记录
#[derive(Debug, Clone, Default)]
pub struct ErrorLog {
    entries: Vec<String>,
}

impl ErrorLog {
    /// 追加一条错误
    ///
    /// 格式：`消息 [with error code: 代码] after HH hrs: MM mins: SS secs. elapsed`
    pub fn push(&mut self, message: &str, code: Option<&str>, elapsed: Duration) {
        let entry = match code {
            Some(code) => format!(
                "{} with error code: {} after{} elapsed",
                message,
                code,
                format_elapsed(elapsed)
            ),
            None => format!("{} after{} elapsed", message, format_elapsed(elapsed)),
        };
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[String] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// 运行上下文
///
/// 替代全局状态：错误记录、运行汇总、预算耗尽标记都挂在这里，
/// 由编排层创建并显式传给流程
#[derive(Debug, Clone)]
pub struct RunContext {
    pub mode: Mode,
    pub scope: Scope,
    started: Instant,
    stage: Stage,
    errors: ErrorLog,
    /// 本次运行是否因预算不足少做了工作
    pub budget_exhausted: bool,
    pub review: ReviewSummary,
    pub update: UpdateSummary,
}

impl RunContext {
    /// 创建新的运行上下文
    pub fn new(mode: Mode, scope: Scope) -> Self {
        Self {
            mode,
            scope,
            started: Instant::now(),
            stage: Stage::Init,
            errors: ErrorLog::default(),
            budget_exhausted: false,
            review: ReviewSummary::default(),
            update: UpdateSummary::default(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// 进入下一阶段
    pub fn advance(&mut self, next: Stage) {
        info!(
            "{} ➜ {} → {}",
            self.scope,
            self.stage.label(),
            next.label()
        );
        self.stage = next;
    }

    pub fn errors(&self) -> &ErrorLog {
        &self.errors
    }

    /// 记录错误（写日志并加入错误记录）
    pub fn log_error(&mut self, message: impl Display, code: Option<&str>) {
        let message = message.to_string();
        match code {
            Some(code) => error!("{} ❌ {} (代码: {})", self.scope, message, code),
            None => error!("{} ❌ {}", self.scope, message),
        }
        let elapsed = self.elapsed();
        self.errors.push(&message, code, elapsed);
    }

    /// 记录远端调用失败，有状态码时带上状态码
    pub fn log_api_error(&mut self, message: impl Display, err: &AppError) {
        match err.status() {
            Some(status) => self.log_error(message, Some(&status.to_string())),
            None => self.log_error(format!("{}: {}", message, err), None),
        }
    }

    /// 标记预算不足
    pub fn mark_budget_exhausted(&mut self) {
        self.budget_exhausted = true;
    }
}

impl Display for RunContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{} {}]", self.mode, self.scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_entry_format() {
        let mut log = ErrorLog::default();
        log.push("Failed to update porfolio: 5", Some("500"), Duration::from_secs(65));
        log.push("The server connection was dropped", None, Duration::from_secs(3600));

        assert_eq!(
            log.entries()[0],
            "Failed to update porfolio: 5 with error code: 500 after 00 hrs: 01 mins: 05 secs. elapsed"
        );
        assert_eq!(
            log.entries()[1],
            "The server connection was dropped after 01 hrs: 00 mins: 00 secs. elapsed"
        );
    }

    #[test]
    fn test_api_error_uses_status() {
        let mut ctx = RunContext::new(Mode::Review, Scope::new("61", "62"));
        ctx.log_api_error("lookup failed", &AppError::api_bad_status("/x", 404));
        ctx.log_api_error("lookup failed", &AppError::Other("boom".to_string()));

        let entries = ctx.errors().entries();
        assert!(entries[0].starts_with("lookup failed with error code: 404 after"));
        assert!(entries[1].starts_with("lookup failed: 错误: boom after"));
    }

    #[test]
    fn test_advance_tracks_stage() {
        let mut ctx = RunContext::new(Mode::Update, Scope::new("61", "62"));
        assert_eq!(ctx.stage(), Stage::Init);
        ctx.advance(Stage::OverviewFetched);
        assert_eq!(ctx.stage(), Stage::OverviewFetched);
        assert!(!ctx.budget_exhausted);
    }
}
