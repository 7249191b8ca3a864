// src/config.rs

pub mod token;

use self::token::{load_or_create_file_config, resolve_token};
use crate::{
    cli::{Cli, Command, ConfigOverrides},
    constants,
    error::AppResult,
};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct NetworkConfig {
    pub connect_timeout_secs: Option<u64>,
    pub timeout_secs: Option<u64>,
    pub max_retries: Option<u32>,
}

/// 配置文件 (`config.json`) 的反序列化形态，所有字段都可省略
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub use_sub_dir: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thread_num: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_retry: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_interval_secs: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_dir_template: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub site_hosts: Option<Vec<String>>,
    pub network: NetworkConfig,
}

impl FileConfig {
    /// 首次运行时写入磁盘的默认配置
    pub(crate) fn default_file_config() -> Self {
        Self {
            root_dir: Some(PathBuf::from(constants::DEFAULT_ROOT_DIR)),
            use_sub_dir: Some(true),
            thread_num: Some(constants::DEFAULT_THREAD_NUM),
            max_retry: Some(constants::DEFAULT_MAX_RETRY),
            retry_interval_secs: Some(constants::DEFAULT_RETRY_INTERVAL_SECS),
            filename_template: Some(constants::DEFAULT_FILENAME_TEMPLATE.to_string()),
            download_dir_template: Some(String::new()),
            api_base: Some(constants::DEFAULT_API_BASE.to_string()),
            site_base: Some(constants::DEFAULT_SITE_BASE.to_string()),
            site_hosts: Some(vec![constants::DEFAULT_SITE_HOST.to_string()]),
            network: NetworkConfig {
                connect_timeout_secs: Some(10),
                timeout_secs: Some(30),
                max_retries: Some(3),
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub root_dir: PathBuf,
    pub use_sub_dir: bool,
    pub authorization: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
    pub proxy_url: Option<String>,
    pub thread_num: usize,
    pub max_retry: usize,
    pub retry_interval: Duration,
    pub filename_template: String,
    pub download_dir_template: String,
    pub api_token: Option<String>,
    pub api_base: String,
    pub site_base: String,
    pub site_hosts: Vec<String>,
    pub user_agent: String,
    pub connect_timeout: Duration,
    pub timeout: Duration,
    pub max_retries: u32,
    /// 登录刷新后回写授权 Token 的配置文件位置
    pub config_path: Option<PathBuf>,
}

impl AppConfig {
    pub fn new(args: &Cli) -> AppResult<Self> {
        let (file_config, config_path) =
            load_or_create_file_config(args.overrides.config.as_deref())?;
        let cli_api_token = match &args.command {
            Some(Command::Serve(serve)) => serve.api_token.as_deref(),
            _ => None,
        };
        Ok(Self::from_parts(
            file_config,
            &args.overrides,
            cli_api_token,
            Some(config_path),
        ))
    }

    /// 按 命令行 > 环境变量 > 配置文件 > 内置默认值 的顺序合并配置
    pub fn from_parts(
        file: FileConfig,
        overrides: &ConfigOverrides,
        cli_api_token: Option<&str>,
        config_path: Option<PathBuf>,
    ) -> Self {
        let authorization = resolve_token(
            overrides.auth_token.as_deref(),
            constants::AUTH_TOKEN_ENV,
            file.authorization.as_deref(),
        );
        let api_token = resolve_token(
            cli_api_token,
            constants::API_TOKEN_ENV,
            file.api_token.as_deref(),
        );

        let site_hosts = file
            .site_hosts
            .filter(|hosts| !hosts.is_empty())
            .unwrap_or_else(|| vec![constants::DEFAULT_SITE_HOST.to_string()]);

        Self {
            root_dir: overrides
                .root_dir
                .clone()
                .or(file.root_dir)
                .unwrap_or_else(|| PathBuf::from(constants::DEFAULT_ROOT_DIR)),
            use_sub_dir: overrides.use_sub_dir || file.use_sub_dir.unwrap_or(true),
            authorization,
            email: non_empty(file.email),
            password: non_empty(file.password),
            proxy_url: non_empty(overrides.proxy_url.clone().or(file.proxy_url)),
            thread_num: overrides
                .thread_num
                .or(file.thread_num)
                .unwrap_or(constants::DEFAULT_THREAD_NUM)
                .max(1),
            max_retry: overrides
                .max_retry
                .or(file.max_retry)
                .unwrap_or(constants::DEFAULT_MAX_RETRY)
                .max(1),
            retry_interval: Duration::from_secs(
                file.retry_interval_secs
                    .unwrap_or(constants::DEFAULT_RETRY_INTERVAL_SECS),
            ),
            filename_template: overrides
                .filename_template
                .clone()
                .or(file.filename_template)
                .unwrap_or_default(),
            download_dir_template: overrides
                .download_dir
                .clone()
                .or(file.download_dir_template)
                .unwrap_or_default(),
            api_token,
            api_base: file
                .api_base
                .unwrap_or_else(|| constants::DEFAULT_API_BASE.to_string()),
            site_base: file
                .site_base
                .unwrap_or_else(|| constants::DEFAULT_SITE_BASE.to_string()),
            site_hosts,
            user_agent: constants::USER_AGENT.into(),
            connect_timeout: Duration::from_secs(file.network.connect_timeout_secs.unwrap_or(10)),
            timeout: Duration::from_secs(file.network.timeout_secs.unwrap_or(30)),
            max_retries: file.network.max_retries.unwrap_or(3),
            config_path,
        }
    }

    pub fn job_list_path(&self) -> PathBuf {
        self.root_dir.join(constants::JOB_LIST_FILE_NAME)
    }

    pub fn history_path(&self) -> PathBuf {
        self.root_dir.join(constants::HISTORY_FILE_NAME)
    }

    pub fn root(&self) -> &Path {
        &self.root_dir
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(any(test, feature = "testing"))]
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from(constants::DEFAULT_ROOT_DIR),
            use_sub_dir: true,
            authorization: None,
            email: None,
            password: None,
            proxy_url: None,
            thread_num: constants::DEFAULT_THREAD_NUM,
            max_retry: constants::DEFAULT_MAX_RETRY,
            retry_interval: Duration::from_secs(constants::DEFAULT_RETRY_INTERVAL_SECS),
            filename_template: String::new(),
            download_dir_template: String::new(),
            api_token: None,
            api_base: constants::DEFAULT_API_BASE.to_string(),
            site_base: constants::DEFAULT_SITE_BASE.to_string(),
            site_hosts: vec![constants::DEFAULT_SITE_HOST.to_string()],
            user_agent: "test-agent/1.0".to_string(),
            connect_timeout: Duration::from_secs(5),
            timeout: Duration::from_secs(15),
            max_retries: 3,
            config_path: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_overrides_file_values() {
        let file = FileConfig {
            root_dir: Some(PathBuf::from("from-file")),
            thread_num: Some(8),
            filename_template: Some("%#TITLE#%".into()),
            ..FileConfig::default_file_config()
        };
        let overrides = ConfigOverrides {
            root_dir: Some(PathBuf::from("from-cli")),
            thread_num: Some(2),
            ..Default::default()
        };
        let config = AppConfig::from_parts(file, &overrides, None, None);

        assert_eq!(config.root_dir, PathBuf::from("from-cli"));
        assert_eq!(config.thread_num, 2);
        assert_eq!(config.filename_template, "%#TITLE#%");
        assert!(config.use_sub_dir);
    }

    #[test]
    fn test_missing_fields_fall_back_to_defaults() {
        let config = AppConfig::from_parts(FileConfig::default(), &ConfigOverrides::default(), None, None);

        assert_eq!(config.root_dir, PathBuf::from(constants::DEFAULT_ROOT_DIR));
        assert_eq!(config.max_retry, constants::DEFAULT_MAX_RETRY);
        assert_eq!(config.retry_interval, Duration::from_secs(30));
        assert_eq!(config.site_hosts, vec!["iwara.tv".to_string()]);
        assert!(config.proxy_url.is_none());
    }

    #[test]
    fn test_zero_counts_are_clamped() {
        let overrides = ConfigOverrides {
            thread_num: Some(0),
            max_retry: Some(0),
            proxy_url: Some("   ".into()),
            ..Default::default()
        };
        let config = AppConfig::from_parts(FileConfig::default(), &overrides, None, None);
        assert_eq!(config.thread_num, 1);
        assert_eq!(config.max_retry, 1);
        assert!(config.proxy_url.is_none());
    }

    #[test]
    fn test_file_config_parses_partial_json() {
        let json = r#"{ "root_dir": "/data/iwara", "network": { "timeout_secs": 5 } }"#;
        let file: FileConfig = serde_json::from_str(json).unwrap();
        assert_eq!(file.root_dir, Some(PathBuf::from("/data/iwara")));
        assert_eq!(file.network.timeout_secs, Some(5));
        assert!(file.site_hosts.is_none());
    }
}
