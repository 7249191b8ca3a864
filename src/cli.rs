// src/cli.rs

use crate::constants;
use clap::{Args, Parser, Subcommand, ValueEnum, crate_version};
use std::path::PathBuf;

/// 定义日志输出级别
#[derive(ValueEnum, Copy, Clone, Debug, PartialEq, Eq)]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[command(
    version = crate_version!(),
    propagate_version = true,
    about,
    long_about = None,
    args_conflicts_with_subcommands = true,
    disable_help_flag = true,
    disable_version_flag = true,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    // --- 批量下载 (Download) ---
    /// 视频或用户主页链接，可以提供多个
    #[arg(value_name = "URL", help_heading = "Download")]
    pub urls: Vec<String>,
    /// 从文本文件读取链接 (每行一个)
    #[arg(short, long, value_name = "FILE", help_heading = "Download")]
    pub list_file: Option<PathBuf>,
    /// 继续上次未完成的任务 (读取根目录下的 jobs.list)
    #[arg(short, long, action = clap::ArgAction::SetTrue, help_heading = "Download")]
    pub resume: bool,

    #[command(flatten)]
    pub overrides: ConfigOverrides,

    // --- 通用选项 (General) ---
    /// 显示此帮助信息并退出
    #[arg(short = 'h', long, action = clap::ArgAction::Help, global = true, help_heading = "General")]
    _help: Option<bool>,
    /// 显示版本信息并退出
    #[arg(short = 'V', long, action = clap::ArgAction::Version, global = true, help_heading = "General")]
    _version: Option<bool>,
    /// 开启调试日志
    #[arg(long, action = clap::ArgAction::SetTrue, global = true, help_heading = "General")]
    pub debug: bool,
    /// (隐藏参数) 设置日志文件的输出级别，用于调试
    #[arg(long, value_enum, default_value_t = LogLevel::Off, global = true, hide = true)]
    pub log_level: LogLevel,
}

impl Cli {
    pub fn has_download_input(&self) -> bool {
        self.resume || self.list_file.is_some() || !self.urls.is_empty()
    }

    pub fn effective_log_level(&self) -> LogLevel {
        if self.debug && self.log_level.to_filter() < log::LevelFilter::Debug {
            LogLevel::Debug
        } else {
            self.log_level
        }
    }
}

/// 覆盖配置文件中对应字段的命令行参数，优先级高于配置文件
#[derive(Args, Debug, Clone, Default)]
pub struct ConfigOverrides {
    /// 配置文件路径 (默认: ~/.iwara-dl/config.json)
    #[arg(short, long, value_name = "FILE", global = true, help_heading = "Options")]
    pub config: Option<PathBuf>,
    /// 视频保存的根目录
    #[arg(long, value_name = "DIR", global = true, help_heading = "Options")]
    pub root_dir: Option<PathBuf>,
    /// 使用作者名作为子目录
    #[arg(long, action = clap::ArgAction::SetTrue, global = true, help_heading = "Options")]
    pub use_sub_dir: bool,
    /// 授权 Token (Authorization)
    #[arg(long, value_name = "TOKEN", global = true, help_heading = "Options")]
    pub auth_token: Option<String>,
    /// 代理地址 (http / https / socks5)
    #[arg(long, value_name = "URL", global = true, help_heading = "Options")]
    pub proxy_url: Option<String>,
    /// 并发下载数 (默认 3)
    #[arg(long, value_parser = clap::value_parser!(usize), global = true, help_heading = "Options")]
    pub thread_num: Option<usize>,
    /// 最大重试轮数 (默认 3)
    #[arg(long, value_parser = clap::value_parser!(usize), global = true, help_heading = "Options")]
    pub max_retry: Option<usize>,
    /// 文件名模板，例如 '{{title}}-{{video_id}}' 或 '%#TITLE#%-%#ID#%'
    #[arg(long, value_name = "TEMPLATE", global = true, help_heading = "Options")]
    pub filename_template: Option<String>,
    /// 下载目录模板，留空时使用 根目录/作者
    #[arg(long, value_name = "TEMPLATE", global = true, help_heading = "Options")]
    pub download_dir: Option<String>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// 启动下载守护进程 (HTTP API)
    Serve(ServeArgs),
    /// 按排序与过滤规则生成视频链接列表
    #[command(name = "genlist")]
    GenList(GenListArgs),
}

#[derive(Args, Debug, Clone)]
pub struct ServeArgs {
    /// 监听地址
    #[arg(long, default_value_t = constants::DEFAULT_BIND_ADDR.to_string())]
    pub bind: String,
    /// 监听端口
    #[arg(long, default_value_t = constants::DEFAULT_PORT)]
    pub port: u16,
    /// API 访问令牌，也可以通过 IWARADL_API_TOKEN 环境变量提供
    #[arg(long, value_name = "TOKEN")]
    pub api_token: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct GenListArgs {
    /// 排序方式: date, trending, popularity, views, likes
    #[arg(long, default_value = "trending")]
    pub sort: String,
    /// 拉取的列表页数 (必须大于 0)
    #[arg(long, default_value_t = 1)]
    pub page_limit: i64,
    /// 只保留最近 N 天内发布的视频 (必须大于 0)
    #[arg(long, default_value_t = 7)]
    pub date_limit: i64,
    /// 分级范围: all, general, ecchi
    #[arg(long, default_value = "ecchi")]
    pub rating: String,
    /// 基础点赞数门槛 (>= 0)
    #[arg(long = "filter-like0", default_value_t = 100)]
    pub filter_like0: i64,
    /// 发布后每天额外需要的点赞数 (>= 0)
    #[arg(long, default_value_t = 50)]
    pub filter_like_inc: i64,
    /// 最低播放数 (>= 0)
    #[arg(long, default_value_t = 0)]
    pub filter_views: i64,
    /// 最短时长，单位秒 (> 0)
    #[arg(long, default_value_t = 90)]
    pub filter_duration: i64,
    /// 输出文件路径
    #[arg(long, value_name = "FILE", default_value = "videolist.txt")]
    pub output: PathBuf,
}
