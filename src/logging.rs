// src/logging.rs

use crate::constants;
use log::{LevelFilter, warn};
use std::{env, path::PathBuf};

fn log_file_path() -> PathBuf {
    match dirs::home_dir() {
        Some(home) => home.join(constants::CONFIG_DIR_NAME).join(constants::LOG_FILE_NAME),
        None => {
            eprintln!("警告: 无法获取用户主目录，日志将写入临时目录。");
            env::temp_dir()
                .join(clap::crate_name!())
                .join(constants::LOG_FILE_NAME)
        }
    }
}

fn open_log_file() -> Option<std::fs::File> {
    let log_file_path = log_file_path();
    if let Some(dir) = log_file_path.parent()
        && let Err(e) = std::fs::create_dir_all(dir)
    {
        eprintln!("警告: 无法创建日志目录 {:?}: {}", dir, e);
    }

    match fern::log_file(&log_file_path) {
        Ok(file) => Some(file),
        Err(e) => {
            eprintln!(
                "警告: 无法打开主日志文件 {:?} : {}。将尝试使用备用日志文件。",
                log_file_path, e
            );
            let fallback_path = env::temp_dir().join(format!(
                "{}-{}",
                clap::crate_name!(),
                constants::LOG_FALLBACK_FILE_NAME
            ));
            match fern::log_file(&fallback_path) {
                Ok(file) => {
                    warn!("日志将写入备用文件: {:?}", fallback_path);
                    Some(file)
                }
                Err(e_fb) => {
                    eprintln!(
                        "错误: 无法创建主日志和备用日志文件 {:?}: {}。日志将不会被记录到文件。",
                        fallback_path, e_fb
                    );
                    None
                }
            }
        }
    }
}

/// 初始化文件日志。`echo_stderr` 为真时 (守护进程模式) 同时把 info 及以上的记录输出到 stderr。
pub fn setup_logging(level: LevelFilter, echo_stderr: bool) {
    if level == LevelFilter::Off && !echo_stderr {
        return;
    }

    let file_appender = if level == LevelFilter::Off { None } else { open_log_file() };

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "[{}] [{:<5}] [{}:{}] - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                record.line().unwrap_or(0),
                message
            ))
        })
        .level(level.max(if echo_stderr { LevelFilter::Info } else { LevelFilter::Off }))
        // 第三方库的调试输出太多
        .level_for("hyper_util", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn);

    if let Some(file) = file_appender {
        dispatch = dispatch.chain(fern::Dispatch::new().level(level).chain(file));
    }
    if echo_stderr {
        dispatch = dispatch.chain(
            fern::Dispatch::new()
                .level(LevelFilter::Info)
                .chain(std::io::stderr()),
        );
    }

    if let Err(e) = dispatch.apply() {
        eprintln!("警告: 日志系统初始化失败: {}", e);
    }
}
