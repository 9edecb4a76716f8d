//! 应用生命周期 - 编排层
//!
//! ## 职责
//!
//! 本模块是整个应用的入口，负责资源创建和模式分发。
//!
//! ## 核心功能
//!
//! 1. **应用初始化**：读取缓存、创建 Alma 客户端、套上并发和速率限制
//! 2. **模式分发**：review / update 走同步流程，clear_* 只改缓存
//! 3. **报告输出**：review / update 结束后写报告和错误日志
//! 4. **缓存保存**：无论流程是否中止，最后都写回缓存
//!
//! ## 设计特点
//!
//! - **资源所有者**：唯一持有缓存和客户端的模块
//! - **向下委托**：阶段细节交给 `SyncFlow`

use crate::cache::{PersistentCache, SnapshotKind};
use crate::clients::{AlmaClient, PortfolioApi, ThrottledClient};
use crate::config::{Config, Mode};
use crate::error::AppResult;
use crate::models::Scope;
use crate::services::ReportWriter;
use crate::utils::logging::{log_startup, print_final_stats};
use crate::workflow::{FlowOutcome, RunContext, SyncFlow};
use std::sync::Arc;
use tracing::{error, info, warn};

/// 应用主结构
pub struct App {
    config: Config,
    cache: PersistentCache,
    flow: SyncFlow,
    reports: ReportWriter,
}

impl App {
    /// 初始化应用
    pub fn initialize(config: Config) -> AppResult<Self> {
        log_startup(&config);

        let api: Arc<dyn PortfolioApi> = Arc::new(AlmaClient::new(&config)?);
        Ok(Self::with_api(config, api))
    }

    /// 使用任意 `PortfolioApi` 实现初始化
    pub fn with_api(config: Config, api: Arc<dyn PortfolioApi>) -> Self {
        let cache = PersistentCache::load(&config.cache_file, config.max_api_calls_per_day);
        let client = ThrottledClient::from_config(api, &config);
        let flow = SyncFlow::from_config(client, &config);
        let reports = ReportWriter::new(&config.output_dir);

        Self {
            config,
            cache,
            flow,
            reports,
        }
    }

    pub fn cache(&self) -> &PersistentCache {
        &self.cache
    }

    /// 运行应用主逻辑，返回本次运行的上下文
    pub async fn run(&mut self) -> AppResult<RunContext> {
        let mut ctx = RunContext::new(self.config.mode, self.config.scope());

        match self.config.mode {
            Mode::Review | Mode::Update => self.run_workflow(&mut ctx).await,
            Mode::ClearCacheAll => self.clear_all(),
            Mode::ClearCacheCollection => self.clear_collection(&ctx.scope),
            Mode::ClearCachePortfolio => self.clear_portfolio(&ctx.scope),
        }

        // 提前中止的路径也要走到这里
        self.cache.save(&self.config.cache_file)?;

        print_final_stats(
            self.config.mode.as_str(),
            ctx.elapsed(),
            ctx.errors().len(),
            self.cache.remaining_api_calls(),
        );
        Ok(ctx)
    }

    async fn run_workflow(&mut self, ctx: &mut RunContext) {
        if self.cache.remaining_api_calls() == 0 {
            warn!("⚠️ 根据缓存记录，今日 API 调用已达上限，请明天再试或调高上限");
            return;
        }

        let outcome = if ctx.mode == Mode::Update {
            self.flow.update(&mut self.cache, ctx).await
        } else {
            self.flow.review(&mut self.cache, ctx).await
        };

        if outcome == FlowOutcome::Aborted {
            warn!("⚠️ 流程在「{}」之后中止", ctx.stage().label());
        }
        if ctx.budget_exhausted {
            warn!("⚠️ API 调用次数不足，本次未能完成全部工作");
        }

        if ctx.mode == Mode::Update {
            ctx.update.cumulative_updated = self.cache.count(SnapshotKind::Updated, &ctx.scope);
            ctx.update.cumulative_ready = self.cache.count(SnapshotKind::ReadyToUpdate, &ctx.scope);
            ctx.update.not_updating = self.cache.not_updating_portfolios(&ctx.scope);
        }

        self.write_reports(ctx);
    }

    /// 报告写入失败只记日志，不影响缓存保存
    fn write_reports(&self, ctx: &RunContext) {
        info!("📝 正在生成报告...");
        let elapsed = ctx.elapsed();

        let port_log = if ctx.mode == Mode::Update {
            self.reports
                .write_update(&ctx.update, ctx.budget_exhausted, elapsed)
        } else {
            self.reports
                .write_review(&ctx.review, ctx.budget_exhausted, elapsed)
        };
        if let Err(e) = port_log {
            error!("❌ 写入报告失败: {}", e);
        }

        if let Err(e) = self
            .reports
            .write_errors(ctx.mode.as_str(), ctx.errors().entries())
        {
            error!("❌ 写入错误日志失败: {}", e);
        }
    }

    // ========== 缓存清理模式 ==========

    fn clear_all(&mut self) {
        info!("🧹 清空全部缓存快照...");
        self.cache.clear_all_snapshots();
        info!("✓ 缓存已清空（保留 API 调用记录）");
    }

    fn clear_collection(&mut self, scope: &Scope) {
        info!("🧹 清空 {} 的缓存快照...", scope);
        let removed = self.cache.clear_scope(scope);
        info!("✓ 已删除 {} 个快照", removed);
    }

    fn clear_portfolio(&mut self, scope: &Scope) {
        let Some(id) = self.config.portfolio_id.clone() else {
            warn!("⚠️ 未指定 PORTFOLIO_ID，跳过");
            return;
        };

        info!("🧹 从 {} 的缓存中移除 portfolio {}...", scope, id);
        let hits = self.cache.remove_portfolio_everywhere(scope, &id);
        for kind in SnapshotKind::RECORDS {
            if hits.contains(&kind) {
                info!("✓ 已从 {} 列表中移除", kind.label());
            } else {
                info!("  {} 列表中没有该 portfolio", kind.label());
            }
        }
    }
}
