// src/lib.rs

pub mod catalog;
pub mod cli;
pub mod client;
pub mod config;
pub mod constants;
pub mod downloader;
pub mod error;
pub mod logging;
pub mod models;
pub mod server;
pub mod sidecar;
pub mod symbols;
pub mod ui;
pub mod utils;
mod workflows;

pub use workflows::{VideoFilter, is_accept_video, validate_genlist_args};

use crate::{
    catalog::{CatalogApi, IwaraCatalog},
    cli::{Cli, Command},
    config::AppConfig,
    downloader::HistoryLedger,
    error::AppResult,
    sidecar::{NfoWriter, SidecarWriter},
};
use log::debug;
use std::sync::Arc;

/// 下载引擎的共享依赖，批量模式与守护进程共用
#[derive(Clone)]
pub struct DownloadJobContext {
    pub config: Arc<AppConfig>,
    pub catalog: Arc<dyn CatalogApi>,
    pub sidecar: Arc<dyn SidecarWriter>,
    pub ledger: Arc<HistoryLedger>,
}

impl DownloadJobContext {
    /// 使用 iwara 目录服务与 NFO 描述文件
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let catalog = Arc::new(IwaraCatalog::new(config.clone())?);
        Ok(Self::with_parts(config, catalog, Arc::new(NfoWriter)))
    }

    pub fn with_parts(
        config: Arc<AppConfig>,
        catalog: Arc<dyn CatalogApi>,
        sidecar: Arc<dyn SidecarWriter>,
    ) -> Self {
        let ledger = Arc::new(HistoryLedger::new(config.history_path()));
        Self {
            config,
            catalog,
            sidecar,
            ledger,
        }
    }
}

/// 库的公共入口点，由 `main.rs` 调用
pub async fn run_from_cli(args: Arc<Cli>) -> AppResult<()> {
    debug!("CLI 参数: {:?}", args);
    let config = Arc::new(AppConfig::new(&args)?);
    debug!("加载的应用配置: root={:?}, threads={}", config.root_dir, config.thread_num);

    match &args.command {
        Some(Command::GenList(genlist)) => workflows::run_genlist(config, genlist).await,
        Some(Command::Serve(serve)) => {
            let context = DownloadJobContext::new(config)?;
            workflows::run_serve(context, serve).await
        }
        None => {
            let context = DownloadJobContext::new(config)?;
            workflows::run_download(context, &args).await
        }
    }
}
