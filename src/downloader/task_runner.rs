// src/downloader/task_runner.rs

use super::{
    job::JobList,
    progress::{BatchSummary, FailedItem, ProgressObserver, TransferHandle},
    task_processor::{TaskProcessor, TransferOptions},
};
use crate::{
    DownloadJobContext, client::build_transfer_client, constants, error::*,
    models::TransferStatus,
};
use anyhow::anyhow;
use log::{debug, error, info, warn};
use std::{cmp::min, sync::Arc};
use tokio::{
    sync::{Mutex as TokioMutex, mpsc},
    task::JoinHandle,
};

/// 执行一轮批次：过滤已下载的 ID，用固定大小的工作池下载其余条目，返回失败数量。
pub async fn run_once(
    context: &DownloadJobContext,
    jobs: &mut JobList,
    options: &TransferOptions,
    observer: &dyn ProgressObserver,
) -> AppResult<usize> {
    context.ledger.refresh();
    let skipped = jobs.retain_pending(&context.ledger)?;
    if skipped > 0 {
        info!("{} 个视频已在下载历史中，跳过", skipped);
    }
    jobs.save()?;

    let total = jobs.len();
    if total == 0 {
        observer.on_batch_finished(&BatchSummary::default());
        return Ok(0);
    }

    let client = build_transfer_client(&context.config, options.proxy_url.as_deref())?;
    let processor = Arc::new(TaskProcessor::new(context.clone(), options.clone(), client));

    let (job_tx, job_rx) = mpsc::channel::<String>(total);
    for id in jobs.ids() {
        job_tx
            .send(id.clone())
            .await
            .map_err(|_| AppError::Other(anyhow!("任务通道意外关闭")))?;
    }
    drop(job_tx);

    let (result_tx, mut result_rx) = mpsc::channel::<TransferHandle>(total);
    let workers = spawn_workers(
        min(context.config.thread_num.max(1), total),
        processor,
        Arc::new(TokioMutex::new(job_rx)),
        result_tx,
    );
    info!("开始下载 {} 个视频 (并发数: {})", total, workers.len());

    let mut summary = BatchSummary {
        total,
        ..Default::default()
    };
    let mut in_flight: Vec<TransferHandle> = Vec::new();
    let mut finalized = 0;
    let mut results_open = true;
    let mut ticker = tokio::time::interval(constants::POLL_TICK);

    while finalized < total {
        tokio::select! {
            received = result_rx.recv(), if results_open => match received {
                Some(handle) => in_flight.push(handle),
                None => results_open = false,
            },
            _ = ticker.tick() => {
                let mut still_running = Vec::with_capacity(in_flight.len());
                for handle in in_flight.drain(..) {
                    if handle.is_complete() {
                        finalize(context, &handle, &mut summary, observer);
                        finalized += 1;
                    } else {
                        observer.on_progress(&handle.snapshot());
                        still_running.push(handle);
                    }
                }
                in_flight = still_running;

                if !results_open && in_flight.is_empty() && finalized < total {
                    error!("工作线程提前退出，{} 个视频没有返回结果", total - finalized);
                    break;
                }
            }
        }
    }

    for worker in workers {
        if let Err(e) = worker.await {
            error!("下载工作线程异常退出: {}", e);
        }
    }

    jobs.retain_pending(&context.ledger)?;
    jobs.save()?;

    observer.on_batch_finished(&summary);
    Ok(total - summary.succeeded)
}

/// 重复执行批次直到全部成功或达到轮数上限，两轮之间固定等待
pub async fn run_with_retry(
    context: &DownloadJobContext,
    jobs: &mut JobList,
    options: &TransferOptions,
    observer: &dyn ProgressObserver,
    max_retry: usize,
) -> AppResult<usize> {
    let rounds = max_retry.max(1);
    let mut failed = 0;
    for round in 1..=rounds {
        debug!("第 {}/{} 轮下载", round, rounds);
        failed = run_once(context, jobs, options, observer).await?;
        if failed == 0 {
            break;
        }
        if round < rounds {
            let delay = context.config.retry_interval;
            warn!("第 {} 轮有 {} 个视频失败，{:?} 后重试", round, failed, delay);
            observer.on_retry_scheduled(round, failed, delay);
            tokio::time::sleep(delay).await;
        }
    }
    Ok(failed)
}

fn spawn_workers(
    count: usize,
    processor: Arc<TaskProcessor>,
    jobs: Arc<TokioMutex<mpsc::Receiver<String>>>,
    results: mpsc::Sender<TransferHandle>,
) -> Vec<JoinHandle<()>> {
    (0..count)
        .map(|worker_id| {
            let processor = processor.clone();
            let jobs = jobs.clone();
            let results = results.clone();
            tokio::spawn(async move {
                loop {
                    let next = jobs.lock().await.recv().await;
                    let Some(id) = next else { break };
                    debug!("工作线程 {} 开始处理 {}", worker_id, id);
                    processor.process(&id, &results).await;
                }
                debug!("工作线程 {} 退出", worker_id);
            })
        })
        .collect()
}

fn finalize(
    context: &DownloadJobContext,
    handle: &TransferHandle,
    summary: &mut BatchSummary,
    observer: &dyn ProgressObserver,
) {
    match handle.outcome() {
        Some(Ok(())) => {
            context.ledger.record(handle.id());
            summary.succeeded += 1;
        }
        Some(Err(failure)) => summary.failures.push(FailedItem {
            id: handle.id().to_string(),
            status: failure.status,
            message: failure.message.clone(),
        }),
        None => summary.failures.push(FailedItem {
            id: handle.id().to_string(),
            status: TransferStatus::UnexpectedError,
            message: "传输未结束".to_string(),
        }),
    }
    observer.on_progress(&handle.snapshot());
}
