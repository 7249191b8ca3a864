// src/models/mod.rs

pub mod api;

use crate::error::AppError;
use crate::symbols;
use chrono::{DateTime, Utc};
use colored::{ColoredString, Colorize};
use serde::{Deserialize, Serialize};

/// 单个条目最终的处理结果，用于汇总报告中的分组
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum TransferStatus {
    MetadataFailed,
    NoSource,
    PathError,
    SidecarFailed,
    HttpError,
    NetworkError,
    TokenError,
    IoError,
    UnexpectedError,
}

impl TransferStatus {
    pub fn get_display_info(
        &self,
    ) -> (
        &'static ColoredString,
        fn(ColoredString) -> ColoredString,
        &'static str,
    ) {
        match self {
            TransferStatus::MetadataFailed => (&symbols::ERROR, |s| s.red(), "获取视频信息失败"),
            TransferStatus::NoSource => (&symbols::ERROR, |s| s.red(), "未找到可用的下载地址"),
            TransferStatus::PathError => (&symbols::ERROR, |s| s.red(), "无法生成保存路径"),
            TransferStatus::SidecarFailed => (&symbols::ERROR, |s| s.red(), "NFO 文件写入失败"),
            TransferStatus::HttpError => (&symbols::ERROR, |s| s.red(), "服务器返回错误"),
            TransferStatus::NetworkError => (&symbols::WARN, |s| s.yellow(), "网络请求失败"),
            TransferStatus::TokenError => (&symbols::ERROR, |s| s.red(), "认证失败 (Token无效)"),
            TransferStatus::IoError => (&symbols::ERROR, |s| s.red(), "本地文件读写错误"),
            TransferStatus::UnexpectedError => {
                (&symbols::ERROR, |s| s.red(), "发生未预期的程序错误")
            }
        }
    }
}

impl From<&AppError> for TransferStatus {
    fn from(err: &AppError) -> Self {
        match err {
            AppError::TokenInvalid => TransferStatus::TokenError,
            AppError::Network(e) if e.is_status() => TransferStatus::HttpError,
            AppError::Network(_) | AppError::NetworkMiddleware(_) => TransferStatus::NetworkError,
            AppError::Io(_) | AppError::TempFilePersist(_) => TransferStatus::IoError,
            AppError::Template(_) | AppError::EmptyPath(_) => TransferStatus::PathError,
            AppError::Catalog(_) | AppError::ApiParseFailed { .. } | AppError::Json(_) => {
                TransferStatus::MetadataFailed
            }
            _ => TransferStatus::UnexpectedError,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    /// 登录名，用于主页链接
    pub handle: String,
    /// 显示名称
    pub name: String,
}

impl Author {
    pub fn display_name(&self) -> &str {
        if self.name.trim().is_empty() { &self.handle } else { &self.name }
    }
}

/// 下载流程使用的视频元数据，与 API 原始结构解耦
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    pub id: String,
    pub title: String,
    pub body: String,
    pub author: Author,
    pub tags: Vec<String>,
    pub created_at: Option<DateTime<Utc>>,
    /// 资源文件 ID，计算 X-Version 时使用
    pub file_id: Option<String>,
    /// 清晰度列表的签名地址
    pub file_url: Option<String>,
}

impl From<api::VideoInfo> for ItemMetadata {
    fn from(info: api::VideoInfo) -> Self {
        Self {
            id: info.id,
            title: info.title,
            body: info.body.unwrap_or_default(),
            author: Author {
                handle: info.user.username,
                name: info.user.name,
            },
            tags: info.tags.into_iter().map(|t| t.id).collect(),
            created_at: info.created_at,
            file_id: info.file.map(|f| f.id).filter(|id| !id.is_empty()),
            file_url: info.file_url.filter(|u| !u.is_empty()),
        }
    }
}

/// 目录服务解析出的实际下载地址
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransferSource {
    pub url: String,
    /// 清晰度标签，例如 "Source"
    pub quality: String,
}
