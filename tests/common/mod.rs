// tests/common/mod.rs

#![allow(dead_code)]

use async_trait::async_trait;
use iwara_dl::{
    DownloadJobContext,
    catalog::CatalogApi,
    config::AppConfig,
    error::{AppError, AppResult},
    models::{Author, ItemMetadata, TransferSource},
    sidecar::{NfoWriter, SidecarWriter},
};
use std::{
    collections::HashMap,
    path::Path,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

/// 固定返回 "Demo" / alice 的目录服务，下载地址指向 mock CDN
pub struct StubCatalog {
    cdn_base: String,
    failing: Vec<String>,
    no_source: Vec<String>,
    delay: Duration,
    calls: Mutex<HashMap<String, usize>>,
    total_calls: AtomicUsize,
    active: AtomicUsize,
    peak: AtomicUsize,
}

impl StubCatalog {
    pub fn new(cdn_base: &str) -> Self {
        Self {
            cdn_base: cdn_base.trim_end_matches('/').to_string(),
            failing: Vec::new(),
            no_source: Vec::new(),
            delay: Duration::ZERO,
            calls: Mutex::new(HashMap::new()),
            total_calls: AtomicUsize::new(0),
            active: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
        }
    }

    /// 这些 ID 解析不到下载地址
    pub fn without_source(mut self, ids: &[&str]) -> Self {
        self.no_source = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    /// 每次元数据请求都等待一段时间，用来观察工作池的并发度
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// 同时进行中的元数据请求的最大数量
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    /// 这些 ID 的元数据请求总是失败
    pub fn failing(mut self, ids: &[&str]) -> Self {
        self.failing = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn metadata_calls(&self, id: &str) -> usize {
        self.calls.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_metadata_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogApi for StubCatalog {
    async fn resolve_user(&self, handle: &str) -> AppResult<Vec<String>> {
        Ok(vec![format!("{}-1", handle), format!("{}-2", handle)])
    }

    async fn fetch_metadata(&self, id: &str) -> AppResult<ItemMetadata> {
        *self.calls.lock().unwrap().entry(id.to_string()).or_default() += 1;
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let now_active = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now_active, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.failing.iter().any(|f| f == id) {
            return Err(AppError::Catalog(format!("stub failure for {}", id)));
        }
        Ok(ItemMetadata {
            id: id.to_string(),
            title: "Demo".to_string(),
            body: "stub body".to_string(),
            author: Author {
                handle: "alice".to_string(),
                name: String::new(),
            },
            tags: vec!["test".to_string()],
            ..Default::default()
        })
    }

    async fn resolve_transfer(&self, item: &ItemMetadata) -> AppResult<TransferSource> {
        if self.no_source.contains(&item.id) {
            return Ok(TransferSource::default());
        }
        Ok(TransferSource {
            url: format!("{}/{}.mp4", self.cdn_base, item.id),
            quality: "Source".to_string(),
        })
    }
}

/// 目标文件名包含指定 ID 时写入失败，其余委托给 NfoWriter
pub struct FailingSidecar {
    pub failing_id: String,
}

impl SidecarWriter for FailingSidecar {
    fn write(&self, meta: &ItemMetadata, target: &Path) -> AppResult<()> {
        if meta.id == self.failing_id {
            return Err(AppError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                format!("sidecar denied: {:?}", target),
            )));
        }
        NfoWriter.write(meta, target)
    }
}

pub fn test_config(root: &Path) -> AppConfig {
    AppConfig {
        root_dir: root.to_path_buf(),
        site_hosts: vec!["site".to_string()],
        thread_num: 2,
        max_retry: 3,
        retry_interval: Duration::ZERO,
        ..Default::default()
    }
}

pub fn test_context(config: AppConfig, catalog: Arc<StubCatalog>) -> DownloadJobContext {
    DownloadJobContext::with_parts(Arc::new(config), catalog, Arc::new(NfoWriter))
}
