//! 命令行工具模块

pub mod report;

pub use report::{format_parsed_uri, format_report, worst_verdict};
