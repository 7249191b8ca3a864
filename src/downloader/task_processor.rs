// src/downloader/task_processor.rs

use super::{
    path::{OutputPath, resolve_output_path},
    progress::{TransferFailure, TransferHandle},
};
use crate::{DownloadJobContext, config::AppConfig, error::*, models::TransferStatus};
use futures::StreamExt;
use log::{debug, error, info};
use reqwest::{StatusCode, header};
use std::io::Write as IoWrite;
use tempfile::NamedTempFile;
use tokio::sync::mpsc;

/// 单个批次的传输选项，守护进程中每个任务可以有自己的一份
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferOptions {
    pub proxy_url: Option<String>,
    /// 一次性使用的 Cookie，随下载请求发送
    pub cookie: Option<String>,
    pub dir_template: String,
    pub filename_template: String,
}

impl TransferOptions {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            proxy_url: config.proxy_url.clone(),
            cookie: None,
            dir_template: config.download_dir_template.clone(),
            filename_template: config.filename_template.clone(),
        }
    }
}

/// `TaskProcessor` 封装了处理单个视频 ID 的全部步骤：
/// 获取信息、解析地址、计算路径、写 NFO、下载。
pub struct TaskProcessor {
    context: DownloadJobContext,
    options: TransferOptions,
    client: reqwest::Client,
}

impl TaskProcessor {
    pub fn new(context: DownloadJobContext, options: TransferOptions, client: reqwest::Client) -> Self {
        Self {
            context,
            options,
            client,
        }
    }

    /// 处理一个 ID，并把对应的传输句柄发送给协调器。
    ///
    /// 下载开始前就失败的条目会发送一个已结束的失败句柄；正常开始的下载先发送句柄，
    /// 再阻塞到下载结束。任何失败都不会中断工作线程。
    pub async fn process(&self, id: &str, results: &mpsc::Sender<TransferHandle>) {
        let handle = match self.prepare(id).await {
            Ok((output, url)) => {
                let handle = TransferHandle::new(id);
                handle.set_path(output.file_path.clone());
                post(results, handle.clone()).await;
                let outcome = self.stream_to_file(&url, &output, &handle).await;
                if let Err(e) = &outcome {
                    error!("下载视频 {} 失败: {}", id, e);
                } else {
                    info!("视频 {} 已保存到 {:?}", id, output.file_path);
                }
                handle.finish(outcome.map_err(|e| TransferFailure {
                    status: TransferStatus::from(&e),
                    message: e.to_string(),
                }));
                return;
            }
            Err(failure) => {
                error!("处理视频 {} 失败: {}", id, failure.message);
                TransferHandle::failed(id, failure.status, failure.message)
            }
        };
        post(results, handle).await;
    }

    /// 下载前的准备步骤，返回保存位置和下载地址
    async fn prepare(&self, id: &str) -> Result<(OutputPath, String), TransferFailure> {
        let catalog = &self.context.catalog;

        let meta = catalog
            .fetch_metadata(id)
            .await
            .map_err(|e| failure(TransferStatus::MetadataFailed, &e))?;

        let source = catalog
            .resolve_transfer(&meta)
            .await
            .map_err(|e| failure(TransferStatus::from(&e), &e))?;
        if source.url.is_empty() {
            return Err(TransferFailure {
                status: TransferStatus::NoSource,
                message: format!("获取视频 {} 的下载地址失败", id),
            });
        }

        let output = resolve_output_path(
            &meta,
            &source.quality,
            &self.options.dir_template,
            &self.options.filename_template,
            &self.context.config,
        )
        .map_err(|e| failure(TransferStatus::PathError, &e))?;

        self.context
            .sidecar
            .write(&meta, &output.sidecar_path())
            .map_err(|e| failure(TransferStatus::SidecarFailed, &e))?;

        debug!("开始下载 {} -> {:?}", source.url, output.file_path);
        Ok((output, source.url))
    }

    /// 流式写入同目录下的临时文件，成功后原子地重命名为最终文件名
    async fn stream_to_file(
        &self,
        url: &str,
        output: &OutputPath,
        handle: &TransferHandle,
    ) -> AppResult<()> {
        let mut request = self.client.get(url);
        if let Some(cookie) = &self.options.cookie {
            request = request.header(header::COOKIE, cookie);
        }
        let res = request.send().await?;
        if matches!(res.status(), StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN) {
            return Err(AppError::TokenInvalid);
        }
        let res = res.error_for_status()?;
        if let Some(total) = res.content_length() {
            handle.set_total(total);
        }

        let mut file = NamedTempFile::new_in(&output.dir)?;
        let mut stream = res.bytes_stream();
        while let Some(chunk_result) = stream.next().await {
            let chunk = chunk_result?;
            file.write_all(&chunk)?;
            handle.add_bytes(chunk.len() as u64);
        }
        file.flush()?;
        file.persist(&output.file_path)?;
        Ok(())
    }
}

fn failure(status: TransferStatus, err: &AppError) -> TransferFailure {
    TransferFailure {
        status,
        message: err.to_string(),
    }
}

async fn post(results: &mpsc::Sender<TransferHandle>, handle: TransferHandle) {
    let id = handle.id().to_string();
    if results.send(handle).await.is_err() {
        error!("结果通道已关闭，无法提交视频 {} 的结果", id);
    }
}
