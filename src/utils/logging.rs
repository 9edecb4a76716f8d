/// 日志工具模块
///
/// 提供日志格式化和输出的辅助函数
use crate::config::Config;
use std::time::Duration;
use tracing::info;

/// 把耗时格式化为 ` HH hrs: MM mins: SS secs.`
///
/// # 参数
/// - `elapsed`: 耗时
///
/// # 返回
/// 返回带前导空格的固定格式字符串
pub fn format_elapsed(elapsed: Duration) -> String {
    let total = elapsed.as_secs();
    let hours = total / 3600;
    let mins = (total % 3600) / 60;
    let secs = total % 60;
    format!(" {:02} hrs: {:02} mins: {:02} secs.", hours, mins, secs)
}

/// 记录程序启动信息
///
/// # 参数
/// - `config`: 当前配置
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - {} 模式", config.mode);
    if config.mode.needs_scope() {
        info!("📚 目标: {}", config.scope());
    }
    info!(
        "📊 最大并发数: {} | 限速: {}/秒 (突发 {})",
        config.max_concurrent_requests, config.rate_limit_per_second, config.rate_limit_burst
    );
    info!("📅 每日 API 调用上限: {}", config.max_api_calls_per_day);
    info!("{}", "=".repeat(60));
}

/// 记录阶段开始
///
/// # 参数
/// - `title`: 阶段名称
pub fn log_stage_start(title: &str) {
    info!("\n{}", "─".repeat(60));
    info!("📦 {}", title);
    info!("{}", "─".repeat(60));
}

/// 记录一个并发批次的结果
///
/// # 参数
/// - `what`: 批次内容描述
/// - `success`: 成功数量
/// - `attempted`: 尝试数量
pub fn log_batch_complete(what: &str, success: usize, attempted: usize) {
    info!("✓ {} 完成: 成功 {}/{}", what, success, attempted);
}

/// 打印最终统计信息
///
/// # 参数
/// - `mode`: 运行模式
/// - `elapsed`: 总耗时
/// - `errors`: 本次记录的错误数
/// - `remaining_calls`: 今日剩余 API 调用次数
pub fn print_final_stats(mode: &str, elapsed: Duration, errors: usize, remaining_calls: u64) {
    info!("\n{}", "=".repeat(60));
    info!("📊 {} 运行结束", mode);
    info!(
        "完成时间: {}",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
    );
    info!("{}", "=".repeat(60));
    info!("⏱️ 总耗时:{}", format_elapsed(elapsed));
    info!("❌ 错误: {}", errors);
    info!("📅 今日剩余 API 调用: {}", remaining_calls);
    info!("{}", "=".repeat(60));
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
