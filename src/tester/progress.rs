//! 测试进度通知

use tracing::info;

/// 进度观察者
///
/// 进度是分层的：level 1 为整体，level 2 为 URI，level 3 为单个 URI 内的阶段
pub trait ProgressSink: Send + Sync {
    fn on_progress(&self, level: usize, current: usize, max: usize, label: &str);
}

/// 输出到日志的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct LogProgress;

/// 格式化一行进度
pub fn format_progress(level: usize, current: usize, max: usize, label: &str) -> String {
    format!("{}[{}/{}] {}", "• ".repeat(level), current, max, label)
}

impl ProgressSink for LogProgress {
    fn on_progress(&self, level: usize, current: usize, max: usize, label: &str) {
        info!("{}", format_progress(level, current, max, label));
    }
}
