// src/downloader/dispatcher.rs

use crate::{catalog::CatalogApi, error::*, symbols};
use itertools::Itertools;
use log::{debug, error, info};
use url::Url;

/// 一个链接指向的下载目标
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    Video(String),
    Profile(String),
}

/// 把站点链接解析为视频 ID 或用户主页。域名需要匹配配置中的某个站点域名 (允许子域名)。
pub fn parse_url(url_str: &str, hosts: &[String]) -> AppResult<Target> {
    let url = Url::parse(url_str.trim())?;
    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let host_ok = hosts.iter().any(|h| {
        let h = h.trim().to_ascii_lowercase();
        !h.is_empty() && (host == h || host.ends_with(&format!(".{}", h)))
    });
    if !host_ok {
        return Err(AppError::InvalidRequest(format!("不支持的站点: {}", url_str)));
    }

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|seg| !seg.is_empty()).collect())
        .unwrap_or_default();
    match segments.as_slice() {
        ["video", id, ..] => Ok(Target::Video(id.to_string())),
        ["profile", handle, ..] => Ok(Target::Profile(handle.to_string())),
        _ => Err(AppError::InvalidRequest(format!("无法识别的链接: {}", url_str))),
    }
}

/// 解析一组链接为去重后的视频 ID 列表，保持首次出现的顺序。
/// 单个链接失败只报告并跳过。
pub async fn resolve_inputs(urls: &[String], catalog: &dyn CatalogApi, hosts: &[String]) -> Vec<String> {
    let mut ids = Vec::new();
    for raw in urls.iter().map(|u| u.trim()).filter(|u| !u.is_empty()) {
        match parse_url(raw, hosts) {
            Ok(Target::Video(id)) => {
                debug!("链接 {} -> 视频 {}", raw, id);
                ids.push(id);
            }
            Ok(Target::Profile(handle)) => match catalog.resolve_user(&handle).await {
                Ok(found) => {
                    info!("用户 {} 展开为 {} 个视频", handle, found.len());
                    ids.extend(found);
                }
                Err(e) => report(raw, &e),
            },
            Err(e) => report(raw, &e),
        }
    }
    ids.into_iter().unique().collect()
}

fn report(url: &str, e: &AppError) {
    error!("解析链接 {} 失败: {}", url, e);
    eprintln!("{} 解析链接 {} 失败: {}", *symbols::ERROR, url, e);
}
