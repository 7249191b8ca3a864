// src/downloader/progress.rs

use crate::{constants, models::TransferStatus, symbols, ui, utils};
use colored::*;
use indicatif::{MultiProgress, ProgressBar};
use log::info;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    time::Duration,
    sync::{
        Arc, Mutex, OnceLock, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
};

/// 一次进度快照，由批次协调器在轮询时发出
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub id: String,
    pub bytes_complete: u64,
    pub bytes_total: u64,
    pub done: bool,
    pub success: bool,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl ProgressEvent {
    pub fn fraction(&self) -> f32 {
        utils::ratio(self.bytes_complete, self.bytes_total)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferFailure {
    pub status: TransferStatus,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedItem {
    pub id: String,
    pub status: TransferStatus,
    pub message: String,
}

/// 一轮批次结束后的统计
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failures: Vec<FailedItem>,
}

impl BatchSummary {
    pub fn completed(&self) -> usize {
        self.succeeded + self.failures.len()
    }

    pub fn failed(&self) -> usize {
        self.total - self.succeeded
    }
}

/// 进度的接收方。每次批次调用都显式传入，不存在全局钩子。
pub trait ProgressObserver: Send + Sync {
    fn on_progress(&self, event: &ProgressEvent);

    fn on_batch_finished(&self, _summary: &BatchSummary) {}

    fn on_retry_scheduled(&self, _round: usize, _failed: usize, _delay: Duration) {}
}

/// 不关心进度时使用
pub struct SilentObserver;

impl ProgressObserver for SilentObserver {
    fn on_progress(&self, _event: &ProgressEvent) {}
}

struct TransferState {
    id: String,
    path: OnceLock<PathBuf>,
    complete: AtomicU64,
    total: AtomicU64,
    outcome: OnceLock<Result<(), TransferFailure>>,
}

/// 工作线程与协调器之间共享的单个传输状态
#[derive(Clone)]
pub struct TransferHandle(Arc<TransferState>);

impl TransferHandle {
    pub fn new(id: &str) -> Self {
        Self(Arc::new(TransferState {
            id: id.to_string(),
            path: OnceLock::new(),
            complete: AtomicU64::new(0),
            total: AtomicU64::new(0),
            outcome: OnceLock::new(),
        }))
    }

    /// 还没开始传输就失败的条目
    pub fn failed(id: &str, status: TransferStatus, message: impl Into<String>) -> Self {
        let handle = Self::new(id);
        handle.finish(Err(TransferFailure {
            status,
            message: message.into(),
        }));
        handle
    }

    pub fn id(&self) -> &str {
        &self.0.id
    }

    pub fn set_path(&self, path: PathBuf) {
        let _ = self.0.path.set(path);
    }

    pub fn path(&self) -> Option<&Path> {
        self.0.path.get().map(PathBuf::as_path)
    }

    pub fn set_total(&self, total: u64) {
        self.0.total.store(total, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, n: u64) {
        self.0.complete.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_complete(&self) -> u64 {
        self.0.complete.load(Ordering::Relaxed)
    }

    /// 只有第一次调用生效
    pub fn finish(&self, outcome: Result<(), TransferFailure>) {
        let _ = self.0.outcome.set(outcome);
    }

    pub fn is_complete(&self) -> bool {
        self.0.outcome.get().is_some()
    }

    pub fn outcome(&self) -> Option<&Result<(), TransferFailure>> {
        self.0.outcome.get()
    }

    pub fn snapshot(&self) -> ProgressEvent {
        let outcome = self.outcome();
        ProgressEvent {
            id: self.0.id.clone(),
            bytes_complete: self.bytes_complete(),
            bytes_total: self.0.total.load(Ordering::Relaxed),
            done: outcome.is_some(),
            success: matches!(outcome, Some(Ok(()))),
            path: self.path().map(Path::to_path_buf),
            error: match outcome {
                Some(Err(failure)) => Some(failure.message.clone()),
                _ => None,
            },
        }
    }
}

/// 命令行模式下的进度显示：每个进行中的条目一个进度条，结束时打印结果
pub struct CliObserver {
    multi: MultiProgress,
    bars: Mutex<HashMap<String, ProgressBar>>,
}

impl Default for CliObserver {
    fn default() -> Self {
        Self::new()
    }
}

impl CliObserver {
    pub fn new() -> Self {
        Self {
            multi: MultiProgress::new(),
            bars: Mutex::new(HashMap::new()),
        }
    }
}

impl ProgressObserver for CliObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        let mut bars = self.bars.lock().unwrap_or_else(PoisonError::into_inner);

        if event.done {
            if let Some(bar) = bars.remove(&event.id) {
                bar.finish_and_clear();
            }
            let name = event
                .path
                .as_deref()
                .and_then(Path::file_name)
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| event.id.clone());
            if event.success {
                let _ = self.multi.println(format!("{} 已保存: {}", *symbols::OK, name));
            } else {
                let reason = event.error.as_deref().unwrap_or("未知错误");
                self.multi.suspend(|| {
                    eprintln!(
                        "{} {} {}",
                        *symbols::ERROR,
                        name,
                        format!("下载失败: {}", reason).red()
                    )
                });
            }
            return;
        }

        let bar = bars.entry(event.id.clone()).or_insert_with(|| {
            let label = utils::truncate_text(&event.id, constants::FILENAME_TRUNCATE_LENGTH);
            self.multi.add(ui::new_transfer_bar(event.bytes_total, &label))
        });
        if event.bytes_total > 0 && bar.length() != Some(event.bytes_total) {
            bar.set_length(event.bytes_total);
        }
        bar.set_position(event.bytes_complete);
    }

    fn on_batch_finished(&self, summary: &BatchSummary) {
        info!(
            "批次结束: Total={}, Completed={}, Success={}, Failed={}",
            summary.total,
            summary.completed(),
            summary.succeeded,
            summary.failed()
        );
        print_batch_report(summary);
    }

    fn on_retry_scheduled(&self, round: usize, failed: usize, delay: Duration) {
        ui::warn(&format!(
            "第 {} 轮有 {} 个视频下载失败，{} 秒后重试...",
            round,
            failed,
            delay.as_secs()
        ));
    }
}

pub fn print_batch_report(summary: &BatchSummary) {
    if !summary.failures.is_empty() {
        ui::print_sub_header("下载详情报告");
        println!("\n{} 失败的条目 ({}个):", *symbols::ERROR, summary.failures.len());
        print_grouped_failures(&summary.failures);
    }
    ui::print_sub_header("任务总结");
    if summary.total > 0 && summary.succeeded == summary.total {
        println!("{} 所有 {} 个任务均已成功。", *symbols::OK, summary.total);
    } else {
        println!(
            "{} | {} | {}",
            format!("完成: {}", summary.completed()).cyan(),
            format!("成功: {}", summary.succeeded).green(),
            format!("失败: {}", summary.failed()).red()
        );
    }
}

fn print_grouped_failures(items: &[FailedItem]) {
    let mut grouped: HashMap<&'static str, Vec<&FailedItem>> = HashMap::new();
    for item in items {
        let (_, _, reason) = item.status.get_display_info();
        grouped.entry(reason).or_default().push(item);
    }
    let mut reasons: Vec<_> = grouped.keys().copied().collect();
    reasons.sort();
    for reason in reasons {
        println!("  - {}", format!("原因: {}", reason).red());
        let mut entries = grouped.get(reason).cloned().unwrap_or_default();
        entries.sort_by(|a, b| a.id.cmp(&b.id));
        for entry in entries {
            println!("    - {} ({})", entry.id, entry.message);
        }
    }
}
