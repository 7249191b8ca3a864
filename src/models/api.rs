// src/models/api.rs

use chrono::{DateTime, Utc};
use serde::Deserialize;

// --- 通用结构体 ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct UserInfo {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct FileInfo {
    pub id: String,
    pub name: String,
    pub mime: String,
    pub size: u64,
    pub duration: i64,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct Tag {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
}

// --- 视频详情 (api/video/{id}) ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct VideoInfo {
    pub id: String,
    pub slug: Option<String>,
    pub title: String,
    pub body: Option<String>,
    pub rating: String,
    pub num_likes: i64,
    pub num_views: i64,
    pub file: Option<FileInfo>,
    pub user: UserInfo,
    pub tags: Vec<Tag>,
    pub created_at: Option<DateTime<Utc>>,
    pub file_url: Option<String>,
}

// --- 资源地址 (fileUrl 返回的清晰度列表) ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct SrcInfo {
    pub view: String,
    pub download: String,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct ResolutionInfo {
    pub id: String,
    pub name: String,
    pub src: SrcInfo,
    #[serde(rename = "type")]
    pub mime: String,
}

// --- 用户主页与视频列表 ---

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct UserProfile {
    pub body: Option<String>,
    pub user: UserInfo,
}

#[derive(Deserialize, Debug, Clone, Default)]
#[serde(default)]
pub struct VideoList {
    pub count: i64,
    pub limit: i64,
    pub page: i64,
    pub results: Vec<VideoInfo>,
}

// --- 认证 ---

#[derive(Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenResponse {
    pub access_token: String,
}

#[derive(Deserialize, Debug, Clone)]
pub struct LoginResponse {
    pub token: String,
}
