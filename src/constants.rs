// src/constants.rs

use std::time::Duration;

pub const UI_WIDTH: usize = 88;
pub const FILENAME_TRUNCATE_LENGTH: usize = 48;
// 文件名上限 255 字节，需为 .mp4 / .nfo 以及临时文件留出余量
pub const MAX_STEM_BYTES: usize = 200;
pub const MAX_SUBDIR_BYTES: usize = 128;
pub const CONFIG_DIR_NAME: &str = concat!(".", clap::crate_name!());
pub const CONFIG_FILE_NAME: &str = "config.json";
pub const LOG_FILE_NAME: &str = concat!(clap::crate_name!(), ".log");
pub const LOG_FALLBACK_FILE_NAME: &str = "fallback.log";
pub const JOB_LIST_FILE_NAME: &str = "jobs.list";
pub const HISTORY_FILE_NAME: &str = "history.list";
pub const MEDIA_EXTENSION: &str = "mp4";
pub const SIDECAR_EXTENSION: &str = "nfo";

pub const DEFAULT_ROOT_DIR: &str = "downloads";
pub const DEFAULT_FILENAME_TEMPLATE: &str = "{{title}}-{{video_id}}";
pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d";
pub const DEFAULT_THREAD_NUM: usize = 3;
pub const DEFAULT_MAX_RETRY: usize = 3;
pub const DEFAULT_RETRY_INTERVAL_SECS: u64 = 30;
pub const DEFAULT_API_BASE: &str = "https://api.iwara.tv";
pub const DEFAULT_SITE_BASE: &str = "https://www.iwara.tv";
pub const DEFAULT_SITE_HOST: &str = "iwara.tv";
pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1";
pub const DEFAULT_PORT: u16 = 23456;

/// 批次协调器轮询传输结果的固定间隔
pub const POLL_TICK: Duration = Duration::from_millis(500);

/// genlist 翻页间隔，每第五页使用较长的间隔
pub const GENLIST_PAGE_PAUSE: Duration = Duration::from_secs(10);
pub const GENLIST_LONG_PAUSE: Duration = Duration::from_secs(60);

pub const API_TOKEN_ENV: &str = "IWARADL_API_TOKEN";
pub const AUTH_TOKEN_ENV: &str = "IWARADL_AUTH_TOKEN";

pub const USER_AGENT: &str = "Mozilla/5.0 (Windows 11 x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/133.0.6943.99 Safari/537.36";

pub mod api {
    /// 计算 X-Version 请求头时拼接在末尾的固定盐值
    pub const X_VERSION_SALT: &str = "5nFp9kmbNnHdAFhaqMvt";
    pub const SOURCE_RESOLUTION: &str = "Source";
    pub const USER_PAGE_SIZE: usize = 32;
    pub const VALID_SORTS: [&str; 5] = ["date", "trending", "popularity", "views", "likes"];
    pub const VALID_RATINGS: [&str; 3] = ["all", "general", "ecchi"];
}
