// src/catalog/mod.rs

mod iwara;

pub use iwara::IwaraCatalog;

use crate::{
    error::AppResult,
    models::{ItemMetadata, TransferSource},
};
use async_trait::async_trait;

/// 视频目录服务。任何一个调用失败都只影响当前条目。
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// 展开用户主页下的全部视频 ID
    async fn resolve_user(&self, handle: &str) -> AppResult<Vec<String>>;

    async fn fetch_metadata(&self, id: &str) -> AppResult<ItemMetadata>;

    /// 解析实际下载地址；找不到可用地址时返回空 URL
    async fn resolve_transfer(&self, item: &ItemMetadata) -> AppResult<TransferSource>;
}
