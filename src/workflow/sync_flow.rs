//! Portfolio 同步流程 - 流程层
//!
//! 核心职责：定义一次 review / update 的完整阶段顺序
//!
//! 流程顺序：
//! 1. 查询总数（唯一没有缓存兜底的阶段）
//! 2. 解析 ID 列表（缓存命中则复用，否则分页拉取）
//! 3. 获取缺失的完整记录（预算不足时截断）
//! 4. review：汇总；update：分类 → PUT
//!
//! 每个阶段的并发批次全部完成后才进入下一阶段；
//! 缓存、错误记录和预算只在批次结束后修改

use futures::future::join_all;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::cache::{BudgetDecision, PersistentCache, SnapshotKind};
use crate::clients::{ThrottledClient, PAGE_SIZE};
use crate::config::Config;
use crate::models::Portfolio;
use crate::services::AccessModelService;
use crate::utils::logging::{log_batch_complete, log_stage_start};
use crate::utils::truncate_text;
use crate::workflow::run_ctx::{RunContext, Stage};

/// 流程结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowOutcome {
    /// 走完了全部阶段
    Completed,
    /// 中途放弃（原因已写入错误记录或日志）
    Aborted,
}

/// Portfolio 同步流程
///
/// - 编排阶段顺序，决定何时用缓存、何时请求远端
/// - 不持有缓存，缓存和上下文由编排层传入
/// - 只依赖客户端和业务能力（services）
pub struct SyncFlow {
    client: ThrottledClient,
    access_model: AccessModelService,
    verbose_logging: bool,
}

impl SyncFlow {
    /// 创建新的同步流程
    pub fn new(client: ThrottledClient, access_model: AccessModelService, verbose_logging: bool) -> Self {
        Self {
            client,
            access_model,
            verbose_logging,
        }
    }

    pub fn from_config(client: ThrottledClient, config: &Config) -> Self {
        Self::new(
            client,
            AccessModelService::from_config(config),
            config.verbose_logging,
        )
    }

    /// review：拿到全部（或预算允许的）记录后汇总 access model
    pub async fn review(&self, cache: &mut PersistentCache, ctx: &mut RunContext) -> FlowOutcome {
        let Some((total, retrieved)) = self.resolve_records(cache, ctx).await else {
            return FlowOutcome::Aborted;
        };

        log_stage_start("汇总审查结果");
        for portfolio in &retrieved {
            let value = portfolio.access_model_value().unwrap_or("").to_string();
            ctx.review.access_models.insert(value);
        }
        info!(
            "✓ 审查 {}/{} 条记录，发现 {} 种 access model",
            retrieved.len(),
            total,
            ctx.review.access_models.len()
        );
        ctx.review.reviewed = retrieved;
        ctx.review.total_in_collection = total;

        ctx.advance(Stage::Done);
        FlowOutcome::Completed
    }

    /// update：分类后对待更新记录逐条 PUT
    pub async fn update(&self, cache: &mut PersistentCache, ctx: &mut RunContext) -> FlowOutcome {
        let Some((total, retrieved)) = self.resolve_records(cache, ctx).await else {
            return FlowOutcome::Aborted;
        };

        let Some(ready) = self.prepare(cache, ctx, total, retrieved) else {
            return FlowOutcome::Aborted;
        };
        ctx.advance(Stage::PreparedForUpdate);

        self.apply(cache, ctx, ready).await;
        ctx.advance(Stage::Applied);
        FlowOutcome::Completed
    }

    /// 两种模式共用的前三个阶段，返回 (总数, 已获取记录)
    async fn resolve_records(
        &self,
        cache: &mut PersistentCache,
        ctx: &mut RunContext,
    ) -> Option<(u64, Vec<Portfolio>)> {
        let total = self.fetch_total(cache, ctx).await?;
        ctx.advance(Stage::OverviewFetched);

        let ids = self.resolve_ids(cache, ctx, total).await?;
        ctx.advance(Stage::IdsResolved);

        let retrieved = self.resolve_details(cache, ctx, total, &ids).await?;
        ctx.advance(Stage::DetailsResolved);

        Some((total, retrieved))
    }

    // ========== 阶段 1: 总数 ==========

    async fn fetch_total(&self, cache: &mut PersistentCache, ctx: &mut RunContext) -> Option<u64> {
        log_stage_start("查询 collection 概览");
        let scope = ctx.scope.clone();

        if cache.budget_mut().plan(1) == BudgetDecision::Exhausted {
            ctx.mark_budget_exhausted();
            ctx.log_error(
                "Ran out of API requests, couldn't check the number of portfolios in the collection",
                Some("API limit exceeded"),
            );
            return None;
        }
        cache.record_api_calls(1);

        match self.client.portfolio_count(&scope).await {
            Ok(0) => {
                ctx.log_error("Collection reports zero portfolios, nothing to do", None);
                None
            }
            Ok(total) => {
                info!("✓ {} 共有 {} 条 portfolio", scope, total);
                Some(total)
            }
            Err(e) => {
                ctx.log_api_error(
                    "Something went wrong looking up number of portfolios in the collection!",
                    &e,
                );
                None
            }
        }
    }

    // ========== 阶段 2: ID 列表 ==========

    async fn resolve_ids(
        &self,
        cache: &mut PersistentCache,
        ctx: &mut RunContext,
        total: u64,
    ) -> Option<Vec<String>> {
        log_stage_start("解析 portfolio ID 列表");
        let scope = ctx.scope.clone();

        let cached = cache.overview_ids(&scope);
        if cached.len() as u64 == total {
            info!("✓ 使用缓存中的 ID 列表（{} 条）", cached.len());
            return Some(cached);
        }

        let pages = total.div_ceil(PAGE_SIZE as u64) as usize;
        if cache.budget_mut().plan(pages).is_short() {
            ctx.mark_budget_exhausted();
            ctx.log_error("couldn't retrieve the overview", Some("api limit insufficient"));
            return None;
        }

        info!("🔍 分 {} 页拉取 ID 列表...", pages);
        let offsets: Vec<usize> = (0..pages).map(|page| page * PAGE_SIZE).collect();
        let results = join_all(offsets.iter().enumerate().map(|(i, offset)| {
            let scope = &scope;
            async move {
                let result = self.client.list_portfolios(scope, *offset, PAGE_SIZE).await;
                debug!("列表第 {}/{} 页返回", i + 1, pages);
                result
            }
        }))
        .await;
        cache.record_api_calls(pages as u64);

        let mut listing = Vec::with_capacity(total as usize);
        let mut failed_pages = 0;
        for (offset, result) in offsets.iter().zip(results) {
            match result {
                Ok(page) => listing.extend(page),
                Err(e) => {
                    failed_pages += 1;
                    ctx.log_api_error(
                        format!("Failed to retrieve portfolio list at offset {}", offset),
                        &e,
                    );
                }
            }
        }
        log_batch_complete("ID 列表", pages - failed_pages, pages);

        if failed_pages > 0 || listing.len() as u64 != total {
            ctx.log_error(
                format!(
                    "Failed to get all portfolios! Listing returned {} of {}",
                    listing.len(),
                    total
                ),
                None,
            );
            return None;
        }

        cache.remove_all_by_scope(SnapshotKind::Overview, &scope);
        cache.add(SnapshotKind::Overview, &scope, listing);
        Some(cache.overview_ids(&scope))
    }

    // ========== 阶段 3: 完整记录 ==========

    async fn resolve_details(
        &self,
        cache: &mut PersistentCache,
        ctx: &mut RunContext,
        total: u64,
        ids: &[String],
    ) -> Option<Vec<Portfolio>> {
        log_stage_start("获取 portfolio 详情");
        let scope = ctx.scope.clone();

        if (cache.count(SnapshotKind::Retrieved, &scope) as u64) < total {
            let existing: HashSet<String> = cache.retrieved_ids(&scope).into_iter().collect();
            let mut seen = HashSet::new();
            let missing: Vec<&String> = ids
                .iter()
                .filter(|id| !existing.contains(*id) && seen.insert(*id))
                .collect();

            let decision = cache.budget_mut().plan(missing.len());
            if decision.is_short() {
                ctx.mark_budget_exhausted();
                warn!(
                    "⚠️ API 调用次数不足，本次只获取 {}/{} 条记录",
                    decision.allowed(),
                    missing.len()
                );
            }
            let batch = &missing[..decision.allowed()];

            if !batch.is_empty() {
                info!("🔍 获取 {} 条缺失的记录...", batch.len());
                let count = batch.len();
                let results = join_all(batch.iter().enumerate().map(|(i, id)| {
                    let scope = &scope;
                    async move {
                        let result = self.client.get_portfolio(scope, id).await;
                        if result.is_ok() {
                            debug!("[{}/{}] ✓ 已获取 portfolio {}", i + 1, count, id);
                        }
                        result
                    }
                }))
                .await;
                cache.record_api_calls(count as u64);

                let mut fetched = Vec::with_capacity(count);
                for (id, result) in batch.iter().zip(results) {
                    match result {
                        Ok(portfolio) => fetched.push(portfolio),
                        Err(e) => {
                            ctx.log_api_error(format!("Failed to retrieve portfolio: {}", id), &e)
                        }
                    }
                }
                log_batch_complete("记录详情", fetched.len(), count);

                if !fetched.is_empty() {
                    cache.add(SnapshotKind::Retrieved, &scope, fetched);
                    // 新记录到达后，之前的分类作废；已更新的记录保留
                    cache.remove_all_by_scope(SnapshotKind::ReadyToUpdate, &scope);
                    cache.remove_all_by_scope(SnapshotKind::NotUpdating, &scope);
                }
            }
        } else {
            info!("✓ 全部记录已在缓存中");
        }

        let elapsed = ctx.elapsed();
        ctx.review.retrieval_elapsed = Some(elapsed);
        ctx.update.retrieval_elapsed = Some(elapsed);

        let retrieved = cache.retrieved_portfolios(&scope);
        if retrieved.is_empty() {
            ctx.log_error("No portfolios could be retrieved", None);
            return None;
        }
        info!("✓ 缓存中共有 {}/{} 条完整记录", retrieved.len(), total);
        Some(retrieved)
    }

    // ========== 阶段 4: 分类（仅 update） ==========

    fn prepare(
        &self,
        cache: &mut PersistentCache,
        ctx: &mut RunContext,
        total: u64,
        retrieved: Vec<Portfolio>,
    ) -> Option<Vec<Portfolio>> {
        log_stage_start("准备更新");
        let scope = ctx.scope.clone();

        let ready = cache.count(SnapshotKind::ReadyToUpdate, &scope);
        let not_updating = cache.count(SnapshotKind::NotUpdating, &scope);
        let updated = cache.count(SnapshotKind::Updated, &scope);

        if (ready + not_updating + updated) as u64 == total {
            info!(
                "✓ 使用缓存中的分类结果：待更新 {} / 无需更新 {} / 已更新 {}",
                ready, not_updating, updated
            );
            return Some(cache.ready_to_update_portfolios(&scope));
        }

        if (retrieved.len() as u64) < total {
            warn!(
                "⚠️ 只获取了 {}/{} 条记录，暂不开始更新",
                retrieved.len(),
                total
            );
            return None;
        }

        let updated_ids: HashSet<String> = cache
            .ids(SnapshotKind::Updated, &scope)
            .into_iter()
            .collect();
        let classification = self.access_model.classify(
            retrieved
                .into_iter()
                .filter(|p| !updated_ids.contains(&p.id)),
        );

        if self.verbose_logging {
            for portfolio in &classification.ready_to_update {
                debug!(
                    "待更新: {} {}",
                    portfolio.id,
                    truncate_text(portfolio.title().unwrap_or(""), 60)
                );
            }
        }
        info!(
            "✓ 分类完成：待更新 {} / 无需更新 {} / 已更新 {}",
            classification.ready_to_update.len(),
            classification.not_updating.len(),
            updated
        );

        cache.remove_all_by_scope(SnapshotKind::ReadyToUpdate, &scope);
        cache.remove_all_by_scope(SnapshotKind::NotUpdating, &scope);
        if !classification.not_updating.is_empty() {
            cache.add(SnapshotKind::NotUpdating, &scope, classification.not_updating);
        }
        if !classification.ready_to_update.is_empty() {
            cache.add(
                SnapshotKind::ReadyToUpdate,
                &scope,
                classification.ready_to_update.iter().cloned(),
            );
        }
        Some(classification.ready_to_update)
    }

    // ========== 阶段 5: PUT ==========

    async fn apply(&self, cache: &mut PersistentCache, ctx: &mut RunContext, ready: Vec<Portfolio>) {
        log_stage_start("更新 portfolio");
        let scope = ctx.scope.clone();
        let (ready, missing_id): (Vec<Portfolio>, Vec<Portfolio>) =
            ready.into_iter().partition(|p| !p.id.is_empty());
        for portfolio in &missing_id {
            ctx.log_error(
                format!("Skipped portfolio without id: {}", portfolio.title().unwrap_or("untitled")),
                None,
            );
        }

        let decision = cache.budget_mut().plan(ready.len());
        if decision.is_short() {
            ctx.mark_budget_exhausted();
            warn!(
                "⚠️ API 调用次数不足，本次只更新 {}/{} 条记录",
                decision.allowed(),
                ready.len()
            );
        }
        let batch = &ready[..decision.allowed()];

        if batch.is_empty() {
            info!("✓ 没有需要更新的记录");
        } else {
            info!("📤 正在更新 {} 条记录...", batch.len());
            let count = batch.len();
            let results = join_all(batch.iter().enumerate().map(|(i, portfolio)| {
                let scope = &scope;
                async move {
                    let result = self.client.update_portfolio(scope, portfolio).await;
                    if result.is_ok() {
                        debug!("[{}/{}] ✓ 已更新 portfolio {}", i + 1, count, portfolio.id);
                    }
                    result
                }
            }))
            .await;
            cache.record_api_calls(count as u64);

            for (portfolio, result) in batch.iter().zip(results) {
                match result {
                    Ok(()) => ctx.update.updated.push(portfolio.clone()),
                    Err(e) => {
                        ctx.log_api_error(
                            format!("Failed to update porfolio: {}", portfolio.id),
                            &e,
                        );
                        ctx.update.failed.push(portfolio.clone());
                    }
                }
            }
            log_batch_complete("更新", ctx.update.updated.len(), count);

            if !ctx.update.updated.is_empty() {
                cache.add(SnapshotKind::Updated, &scope, ctx.update.updated.iter().cloned());
                for portfolio in &ctx.update.updated {
                    cache.remove_one(SnapshotKind::ReadyToUpdate, &scope, &portfolio.id);
                }
            }
        }

        ctx.update.apply_elapsed = Some(ctx.elapsed());
    }
}
