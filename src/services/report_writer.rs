//! 报告写入服务 - 业务能力层
//!
//! 只负责把一次运行的汇总写成文本文件，不关心流程

use crate::models::{Portfolio, ReviewSummary, UpdateSummary};
use crate::utils::format_elapsed;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

const NO_ERRORS: &str = "No errors this time";
const BUDGET_NOTICE: &str = "\n API limit prevented finishing the review. \n";

/// 报告写入服务
///
/// 职责：
/// - 写 `{mode}_port_log-{时间戳}.txt`
/// - 写 `{mode}_error_log-{时间戳}.txt`
/// - 不修改缓存，不发请求
pub struct ReportWriter {
    output_dir: PathBuf,
    timestamp: String,
}

impl ReportWriter {
    /// 创建新的报告写入服务，文件名时间戳取当前本地时间
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_timestamp(
            output_dir,
            chrono::Local::now().format("%Y-%m-%d-%H_%M").to_string(),
        )
    }

    /// 使用固定时间戳创建
    pub fn with_timestamp(output_dir: impl Into<PathBuf>, timestamp: impl Into<String>) -> Self {
        Self {
            output_dir: output_dir.into(),
            timestamp: timestamp.into(),
        }
    }

    pub fn port_log_path(&self, mode: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_port_log-{}.txt", mode, self.timestamp))
    }

    pub fn error_log_path(&self, mode: &str) -> PathBuf {
        self.output_dir
            .join(format!("{}_error_log-{}.txt", mode, self.timestamp))
    }

    /// 写入 review 报告
    ///
    /// # 参数
    /// - `summary`: review 汇总
    /// - `budget_exhausted`: 是否因预算不足没有完成
    /// - `total_elapsed`: 总耗时
    pub fn write_review(
        &self,
        summary: &ReviewSummary,
        budget_exhausted: bool,
        total_elapsed: Duration,
    ) -> std::io::Result<PathBuf> {
        let path = self.port_log_path("review");
        let content = render_review(summary, budget_exhausted, total_elapsed);
        write_file(&path, &content)?;
        Ok(path)
    }

    /// 写入 update 报告
    pub fn write_update(
        &self,
        summary: &UpdateSummary,
        budget_exhausted: bool,
        total_elapsed: Duration,
    ) -> std::io::Result<PathBuf> {
        let path = self.port_log_path("update");
        let content = render_update(summary, budget_exhausted, total_elapsed);
        write_file(&path, &content)?;
        Ok(path)
    }

    /// 写入错误日志，没有错误时写一行提示
    pub fn write_errors(&self, mode: &str, errors: &[String]) -> std::io::Result<PathBuf> {
        let path = self.error_log_path(mode);
        let content = render_errors(errors);
        write_file(&path, &content)?;
        Ok(path)
    }
}

fn write_file(path: &Path, content: &str) -> std::io::Result<()> {
    debug!("写入报告: {} ({} 字节)", path.display(), content.len());
    fs::write(path, content)?;
    info!("📝 已写入 {}", path.display());
    Ok(())
}

fn pam_label(value: &str) -> &str {
    if value.is_empty() {
        "blank"
    } else {
        value
    }
}

fn divider(title: &str) -> String {
    format!("{}{}{}", "-".repeat(20), title, "-".repeat(20))
}

/// 单条记录的报告格式
pub fn format_entry(portfolio: &Portfolio, count: usize, total: usize) -> String {
    let value = portfolio.access_model_value().unwrap_or("");
    let desc = portfolio.access_model_desc().unwrap_or(" ");
    format!(
        "{}/{}\nTitle: {}\nMMS ID: {}\nPublic Access Model: {};  Description: {}\nPortfolio ID: {}\n\n",
        count,
        total,
        portfolio.title().unwrap_or(""),
        portfolio.mms_id().unwrap_or(""),
        value,
        desc,
        portfolio.id
    )
}

fn render_entries(out: &mut String, portfolios: &[&Portfolio]) {
    let total = portfolios.len();
    for (i, portfolio) in portfolios.iter().enumerate() {
        out.push_str(&format_entry(portfolio, i + 1, total));
    }
}

pub fn render_review(summary: &ReviewSummary, budget_exhausted: bool, total_elapsed: Duration) -> String {
    let reviewed = summary.reviewed.len();
    let total = summary.total_in_collection;
    let mut header = String::new();
    let mut details = String::new();

    let _ = writeln!(header, "Number of Portfolios Reviewed: {} out of {} ", reviewed, total);
    let _ = writeln!(
        header,
        "Portfolio Review time: {} ",
        format_elapsed(summary.retrieval_elapsed.unwrap_or_default())
    );
    let _ = writeln!(header, "Total time elapsed: {} ", format_elapsed(total_elapsed));
    let _ = writeln!(
        header,
        "\n {} ",
        divider(&format!(" {}/{} Portfolios Reviewed ", reviewed, total))
    );
    header.push_str("Following PAMS found in collected portfolios:\n");

    for value in &summary.access_models {
        let group: Vec<&Portfolio> = summary.with_access_model(value).collect();
        let _ = writeln!(header, "{}: {}", pam_label(value), group.len());

        let _ = write!(
            details,
            "\n{}\n\n",
            divider(&format!(" Portfolios with a PAM that is {} ", pam_label(value)))
        );
        render_entries(&mut details, &group);
    }

    if budget_exhausted {
        header.push_str(BUDGET_NOTICE);
    }
    header + &details
}

pub fn render_update(summary: &UpdateSummary, budget_exhausted: bool, total_elapsed: Duration) -> String {
    let apply_time = summary
        .apply_elapsed
        .unwrap_or_default()
        .saturating_sub(summary.retrieval_elapsed.unwrap_or_default());
    let mut out = String::new();

    let _ = writeln!(
        out,
        "Total Portfolios Updated Across All Runs (according to cache): {} out of {} ",
        summary.cumulative_updated,
        summary.cumulative_updated + summary.cumulative_ready
    );
    let _ = writeln!(out, "Portfolio Update time: {} ", format_elapsed(apply_time));
    let _ = writeln!(out, "Total time elapsed: {} ", format_elapsed(total_elapsed));
    let _ = writeln!(
        out,
        "{}",
        divider(&format!(
            " {}/{} Portfolios Updated This Run ",
            summary.updated.len(),
            summary.attempted()
        ))
    );
    if budget_exhausted {
        out.push_str(BUDGET_NOTICE);
    }

    let sections: [(&str, &[Portfolio]); 3] = [
        ("Portfolios That Failed to Update", summary.failed.as_slice()),
        ("Portfolios That Updated This Run", summary.updated.as_slice()),
        ("Portfolios That Were Set In Alma Already", summary.not_updating.as_slice()),
    ];
    for (title, portfolios) in sections {
        let _ = write!(out, "\n{}\n\n", divider(title));
        let refs: Vec<&Portfolio> = portfolios.iter().collect();
        render_entries(&mut out, &refs);
    }
    out
}

pub fn render_errors(errors: &[String]) -> String {
    if errors.is_empty() {
        return format!("{}\n", NO_ERRORS);
    }
    errors.iter().map(|e| format!("{}\n", e)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn record(id: &str, value: Option<&str>) -> Portfolio {
        let mut raw = json!({
            "id": id,
            "resource_metadata": { "title": format!("Title {}", id), "mms_id": { "value": "99" } }
        });
        if let Some(v) = value {
            raw["public_access_model"] = json!({ "value": v, "desc": "d" });
        }
        serde_json::from_value(raw).unwrap()
    }

    #[test]
    fn test_entry_format() {
        let entry = format_entry(&record("7", Some("UA")), 1, 2);
        assert_eq!(
            entry,
            "1/2\nTitle: Title 7\nMMS ID: 99\nPublic Access Model: UA;  Description: d\nPortfolio ID: 7\n\n"
        );

        // 缺失字段不会导致失败
        let bare = format_entry(&Portfolio::new("8"), 1, 1);
        assert!(bare.contains("Public Access Model: ;  Description:  \n"));
    }

    #[test]
    fn test_review_groups_by_access_model() {
        let summary = ReviewSummary {
            reviewed: vec![record("1", Some("")), record("2", Some("UA")), record("3", None)],
            access_models: ["".to_string(), "UA".to_string()].into_iter().collect(),
            total_in_collection: 3,
            retrieval_elapsed: Some(Duration::from_secs(2)),
        };

        let text = render_review(&summary, false, Duration::from_secs(5));
        assert!(text.starts_with("Number of Portfolios Reviewed: 3 out of 3 \n"));
        assert!(text.contains("blank: 2\n"));
        assert!(text.contains("UA: 1\n"));
        assert!(text.contains("Portfolios with a PAM that is blank"));
        assert!(!text.contains("API limit prevented"));

        let text = render_review(&summary, true, Duration::from_secs(5));
        assert!(text.contains("API limit prevented"));
    }

    #[test]
    fn test_update_sections() {
        let summary = UpdateSummary {
            updated: vec![record("1", Some("UA"))],
            failed: vec![record("2", Some("UA"))],
            not_updating: vec![record("3", Some("SU"))],
            cumulative_updated: 4,
            cumulative_ready: 1,
            ..Default::default()
        };

        let text = render_update(&summary, false, Duration::from_secs(1));
        assert!(text.contains("according to cache): 4 out of 5 \n"));
        assert!(text.contains(" 1/2 Portfolios Updated This Run "));
        let failed_at = text.find("Failed to Update").unwrap();
        let updated_at = text.find("Updated This Run--").unwrap();
        let already_at = text.find("Set In Alma Already").unwrap();
        assert!(failed_at < updated_at && updated_at < already_at);
    }

    #[test]
    fn test_error_log_files() {
        let dir = TempDir::new().unwrap();
        let writer = ReportWriter::with_timestamp(dir.path(), "2024-05-02-12_00");

        let path = writer.write_errors("review", &[]).unwrap();
        assert!(path.ends_with("review_error_log-2024-05-02-12_00.txt"));
        assert_eq!(fs::read_to_string(&path).unwrap(), "No errors this time\n");

        let errors = vec!["a".to_string(), "b".to_string()];
        let path = writer.write_errors("update", &errors).unwrap();
        assert_eq!(fs::read_to_string(path).unwrap(), "a\nb\n");
    }
}
