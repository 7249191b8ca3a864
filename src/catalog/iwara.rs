// src/catalog/iwara.rs

use super::CatalogApi;
use crate::{
    client::RobustClient,
    config::{AppConfig, token},
    constants::api,
    error::*,
    models::{
        ItemMetadata, TransferSource,
        api::{AccessTokenResponse, LoginResponse, ResolutionInfo, UserProfile, VideoInfo, VideoList},
    },
};
use async_trait::async_trait;
use log::{debug, info, warn};
use serde_json::json;
use sha1::{Digest, Sha1};
use std::sync::Arc;
use tokio::sync::Mutex as TokioMutex;
use url::Url;

#[derive(Default)]
struct TokenState {
    authorization: Option<String>,
    access: Option<String>,
}

/// iwara.tv 的 API 客户端
pub struct IwaraCatalog {
    http: RobustClient,
    config: Arc<AppConfig>,
    tokens: TokioMutex<TokenState>,
}

impl IwaraCatalog {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let http = RobustClient::new(config.clone())?;
        let tokens = TokenState {
            authorization: config.authorization.clone(),
            access: None,
        };
        Ok(Self {
            http,
            config,
            tokens: TokioMutex::new(tokens),
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.api_base.trim_end_matches('/'), path)
    }

    /// 获取访问 Token。授权 Token 换取失败且配置了邮箱密码时，先登录刷新授权 Token。
    /// 都不可用时以匿名身份继续。
    async fn bearer(&self) -> Option<String> {
        let mut tokens = self.tokens.lock().await;
        if let Some(access) = &tokens.access {
            return Some(access.clone());
        }
        let has_login = self.config.email.is_some() && self.config.password.is_some();
        if tokens.authorization.is_none() && !has_login {
            return None;
        }

        if let Some(auth) = tokens.authorization.clone() {
            match self.exchange_token(&auth).await {
                Ok(access) => {
                    tokens.access = Some(access.clone());
                    return Some(access);
                }
                Err(e) => warn!("使用授权 Token 换取访问 Token 失败: {}", e),
            }
        }

        if has_login {
            match self.login().await {
                Ok(auth) => {
                    tokens.authorization = Some(auth.clone());
                    match self.exchange_token(&auth).await {
                        Ok(access) => {
                            tokens.access = Some(access.clone());
                            return Some(access);
                        }
                        Err(e) => warn!("登录后换取访问 Token 失败: {}", e),
                    }
                }
                Err(e) => warn!("邮箱登录刷新授权 Token 失败: {}", e),
            }
        }
        None
    }

    async fn exchange_token(&self, authorization: &str) -> AppResult<String> {
        debug!("正在换取访问 Token");
        let res: AccessTokenResponse = self
            .http
            .post_json(&self.endpoint("user/token"), Some(authorization), None::<&()>)
            .await?;
        Ok(res.access_token)
    }

    async fn login(&self) -> AppResult<String> {
        let body = json!({
            "email": self.config.email.as_deref().unwrap_or_default(),
            "password": self.config.password.as_deref().unwrap_or_default(),
        });
        let res: LoginResponse = self
            .http
            .post_json(&self.endpoint("user/login"), None, Some(&body))
            .await?;
        info!("已通过邮箱登录刷新授权 Token");
        if let Some(path) = &self.config.config_path
            && let Err(e) = token::save_authorization(path, &res.token)
        {
            warn!("保存授权 Token 失败: {}", e);
        }
        Ok(res.token)
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        url: &str,
        x_version: Option<&str>,
    ) -> AppResult<T> {
        let bearer = self.bearer().await;
        self.http.get_json(url, bearer.as_deref(), x_version).await
    }

    async fn page_count(&self, user_id: &str) -> AppResult<usize> {
        let url = Url::parse_with_params(
            &self.endpoint("videos"),
            &[("limit", "8"), ("user", user_id)],
        )?;
        let list: VideoList = self.get_json(url.as_str(), None).await?;
        Ok(pages_for(list.count))
    }

    /// 按排序与分级获取一页视频列表 (page 从 0 开始)
    pub async fn list_videos(&self, sort: &str, page: usize, rating: &str) -> AppResult<VideoList> {
        let page = page.to_string();
        let url = Url::parse_with_params(
            &self.endpoint("videos"),
            &[("sort", sort), ("page", page.as_str()), ("rating", rating)],
        )?;
        self.get_json(url.as_str(), None).await
    }
}

/// 每页 32 条，计数不大于 0 时没有页面
fn pages_for(count: i64) -> usize {
    if count <= 0 {
        0
    } else if count as usize <= api::USER_PAGE_SIZE {
        1
    } else {
        count as usize / api::USER_PAGE_SIZE + 1
    }
}

/// X-Version = sha1("{file_id}_{expires}_{salt}")
pub(crate) fn x_version(file_id: &str, expires: &str) -> String {
    let digest = Sha1::digest(format!("{}_{}_{}", file_id, expires, api::X_VERSION_SALT).as_bytes());
    hex::encode(digest)
}

fn absolute_download_url(src: &str) -> String {
    if src.starts_with("//") { format!("https:{}", src) } else { src.to_string() }
}

#[async_trait]
impl CatalogApi for IwaraCatalog {
    async fn resolve_user(&self, handle: &str) -> AppResult<Vec<String>> {
        debug!("正在获取用户 {} 的视频列表", handle);
        let profile: UserProfile = self
            .get_json(&self.endpoint(&format!("profile/{}", handle)), None)
            .await?;
        let user_id = profile.user.id;
        if user_id.is_empty() {
            return Err(AppError::Catalog(format!("未找到用户: {}", handle)));
        }

        let pages = self.page_count(&user_id).await?;
        debug!("用户 ID: {}, 共 {} 页", user_id, pages);

        let mut ids = Vec::new();
        for page in 0..pages {
            let page_str = page.to_string();
            let url = Url::parse_with_params(
                &self.endpoint("videos"),
                &[("page", page_str.as_str()), ("sort", "date"), ("user", user_id.as_str())],
            )?;
            match self.get_json::<VideoList>(url.as_str(), None).await {
                Ok(list) => ids.extend(list.results.into_iter().map(|v| v.id)),
                Err(e) => warn!("获取用户 {} 第 {} 页失败: {}", handle, page + 1, e),
            }
        }
        info!("用户 {} 共解析出 {} 个视频", handle, ids.len());
        Ok(ids)
    }

    async fn fetch_metadata(&self, id: &str) -> AppResult<ItemMetadata> {
        let info: VideoInfo = self
            .get_json(&self.endpoint(&format!("video/{}", id)), None)
            .await?;
        if info.id.is_empty() {
            return Err(AppError::Catalog(format!("视频 {} 的信息为空", id)));
        }
        debug!("获取视频信息成功: {} ({})", info.title, info.id);
        Ok(ItemMetadata::from(info))
    }

    async fn resolve_transfer(&self, item: &ItemMetadata) -> AppResult<TransferSource> {
        let (Some(file_url), Some(file_id)) = (&item.file_url, &item.file_id) else {
            warn!("视频 {} 缺少文件信息，无法解析下载地址", item.id);
            return Ok(TransferSource::default());
        };
        let parsed = Url::parse(file_url)?;
        let expires = parsed
            .query_pairs()
            .find(|(k, _)| k == "expires")
            .map(|(_, v)| v.into_owned())
            .unwrap_or_default();
        let xv = x_version(file_id, &expires);

        let resolutions: Vec<ResolutionInfo> = self.get_json(file_url, Some(&xv)).await?;
        let source = resolutions
            .into_iter()
            .find(|r| r.name == api::SOURCE_RESOLUTION && !r.src.download.is_empty())
            .map(|r| TransferSource {
                url: absolute_download_url(&r.src.download),
                quality: r.name,
            })
            .unwrap_or_default();
        if source.url.is_empty() {
            warn!("视频 {} 未找到 {} 清晰度", item.id, api::SOURCE_RESOLUTION);
        }
        Ok(source)
    }
}
