// src/client.rs

use crate::{config::AppConfig, error::*};
use anyhow::anyhow;
use log::debug;
use reqwest::{
    IntoUrl, Response, StatusCode,
    header::{self, HeaderMap, HeaderValue},
};
use reqwest_middleware::{ClientBuilder, ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;

/// 访问目录 API 的客户端：带站点来源请求头、代理与瞬时错误重试
#[derive(Clone)]
pub struct RobustClient {
    pub client: ClientWithMiddleware,
}

impl RobustClient {
    pub fn new(config: Arc<AppConfig>) -> AppResult<Self> {
        let retry_policy =
            ExponentialBackoff::builder().build_with_max_retries(config.max_retries);

        let mut builder = reqwest::Client::builder()
            .user_agent(config.user_agent.clone())
            .default_headers(site_headers(&config)?)
            .connect_timeout(config.connect_timeout)
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.thread_num * 3);
        if let Some(proxy) = &config.proxy_url {
            debug!("API 请求使用代理: {}", proxy);
            builder = builder.proxy(reqwest::Proxy::all(proxy)?);
        }

        let client = ClientBuilder::new(builder.build()?)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(Self { client })
    }

    pub async fn get<T: IntoUrl>(&self, url: T) -> AppResult<Response> {
        let res = self.client.get(url).send().await?;
        check_status(res)
    }

    /// GET 并解析 JSON，可附带 Bearer Token 与 X-Version 请求头
    pub async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        bearer: Option<&str>,
        x_version: Option<&str>,
    ) -> AppResult<T> {
        let mut req = with_bearer(self.client.get(url), bearer);
        if let Some(xv) = x_version {
            req = req.header("X-Version", xv);
        }
        let res = check_status(req.send().await?)?;
        parse_json(url, res).await
    }

    pub async fn post_json<T: DeserializeOwned, B: Serialize + ?Sized>(
        &self,
        url: &str,
        bearer: Option<&str>,
        body: Option<&B>,
    ) -> AppResult<T> {
        let mut req = with_bearer(self.client.post(url), bearer);
        if let Some(body) = body {
            req = req.json(body);
        }
        let res = check_status(req.send().await?)?;
        parse_json(url, res).await
    }
}

fn with_bearer(req: RequestBuilder, bearer: Option<&str>) -> RequestBuilder {
    match bearer {
        Some(token) if !token.is_empty() => req.bearer_auth(token),
        _ => req,
    }
}

fn check_status(res: Response) -> AppResult<Response> {
    if res.status() == StatusCode::UNAUTHORIZED || res.status() == StatusCode::FORBIDDEN {
        return Err(AppError::TokenInvalid);
    }
    Ok(res.error_for_status()?)
}

async fn parse_json<T: DeserializeOwned>(url: &str, res: Response) -> AppResult<T> {
    let text = res.text().await?;
    serde_json::from_str(&text).map_err(|source| AppError::ApiParseFailed {
        url: url.to_string(),
        source,
    })
}

fn site_headers(config: &AppConfig) -> AppResult<HeaderMap> {
    let site = config.site_base.trim_end_matches('/');
    let value = |v: &str| {
        HeaderValue::from_str(v).map_err(|e| AppError::Other(anyhow!("无效的请求头 '{}': {}", v, e)))
    };
    let mut headers = HeaderMap::new();
    headers.insert(header::ACCEPT, value("application/json")?);
    headers.insert(header::ACCEPT_LANGUAGE, value("en-US,en;q=0.5")?);
    headers.insert(header::ORIGIN, value(site)?);
    headers.insert(header::REFERER, value(&format!("{}/", site))?);
    Ok(headers)
}

/// 大文件传输用的客户端：只设置连接超时，整体传输不限时
pub fn build_transfer_client(config: &AppConfig, proxy_url: Option<&str>) -> AppResult<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(config.user_agent.clone())
        .connect_timeout(config.connect_timeout);
    if let Some(proxy) = proxy_url.map(str::trim).filter(|p| !p.is_empty()) {
        debug!("下载使用代理: {}", proxy);
        builder = builder.proxy(reqwest::Proxy::all(proxy)?);
    }
    Ok(builder.build()?)
}
