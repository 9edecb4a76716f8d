//! 业务能力层（Services）
//!
//! 描述"我能做什么"，只处理单条记录或一份汇总

pub mod access_model;
pub mod report_writer;

pub use access_model::{AccessModelService, Classification};
pub use report_writer::ReportWriter;
