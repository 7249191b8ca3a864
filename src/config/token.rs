// src/config/token.rs

use crate::{
    config::FileConfig,
    constants,
    error::{AppError, AppResult},
};
use anyhow::{Context, anyhow};
use log::{debug, info};
use std::{
    fs,
    path::{Path, PathBuf},
};

pub(super) fn get_config_path() -> AppResult<PathBuf> {
    let path = dirs::home_dir()
        .ok_or_else(|| AppError::Other(anyhow!("无法获取用户主目录")))?
        .join(constants::CONFIG_DIR_NAME)
        .join(constants::CONFIG_FILE_NAME);
    Ok(path)
}

/// 读取配置文件。未指定路径时使用 `~/.iwara-dl/config.json`，不存在则写入默认配置；
/// 显式指定的路径必须存在。
pub(crate) fn load_or_create_file_config(
    explicit: Option<&Path>,
) -> AppResult<(FileConfig, PathBuf)> {
    if let Some(path) = explicit {
        let config = read_file_config(path)?;
        return Ok((config, path.to_path_buf()));
    }

    let config_path = get_config_path()?;
    if config_path.is_file() {
        let config = read_file_config(&config_path)?;
        Ok((config, config_path))
    } else {
        info!("配置文件 {:?} 不存在，将创建默认配置。", config_path);
        let config = FileConfig::default_file_config();

        if let Some(dir) = config_path.parent() {
            fs::create_dir_all(dir)?;
        }

        let json_content = serde_json::to_string_pretty(&config)?;
        fs::write(&config_path, json_content)?;

        Ok((config, config_path))
    }
}

fn read_file_config(path: &Path) -> AppResult<FileConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("读取配置文件 '{}' 失败", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("解析配置文件 '{}' 失败", path.display()))
        .map_err(AppError::from)
}

/// 邮箱登录刷新授权 Token 后将其写回配置文件
pub fn save_authorization(config_path: &Path, token: &str) -> AppResult<()> {
    if token.is_empty() {
        return Ok(());
    }

    let mut config = read_file_config(config_path)?;
    config.authorization = Some(token.to_string());

    let json_content = serde_json::to_string_pretty(&config)?;
    fs::write(config_path, json_content)
        .with_context(|| format!("保存Token到 '{}' 失败", config_path.display()))?;

    info!("授权 Token 已更新至配置文件: {}", config_path.display());
    Ok(())
}

/// 按 命令行 > 环境变量 > 配置文件 的顺序选出第一个非空 Token
pub fn resolve_token(cli_token: Option<&str>, env_key: &str, file_token: Option<&str>) -> Option<String> {
    if let Some(token) = cli_token.map(str::trim) && !token.is_empty() {
        debug!("使用来自命令行参数的 Token ({})", env_key);
        return Some(token.to_string());
    }
    if let Ok(token) = std::env::var(env_key) && !token.trim().is_empty() {
        debug!("使用来自环境变量 {} 的 Token", env_key);
        return Some(token.trim().to_string());
    }
    if let Some(token) = file_token.map(str::trim) && !token.is_empty() {
        debug!("使用来自本地配置文件的 Token ({})", env_key);
        return Some(token.to_string());
    }
    debug!("未在任何位置找到 {} 对应的 Token", env_key);
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    const UNSET_ENV: &str = "IWARADL_TEST_TOKEN_NEVER_SET";

    #[test]
    fn test_resolve_token_precedence() {
        assert_eq!(
            resolve_token(Some("cli"), UNSET_ENV, Some("file")),
            Some("cli".to_string())
        );
        assert_eq!(
            resolve_token(Some("  "), UNSET_ENV, Some("file")),
            Some("file".to_string())
        );
        assert_eq!(resolve_token(None, UNSET_ENV, None), None);
    }

    #[test]
    fn test_explicit_config_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(load_or_create_file_config(Some(&missing)).is_err());
    }

    #[test]
    fn test_save_authorization_keeps_other_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "thread_num": 7 }"#).unwrap();

        save_authorization(&path, "fresh-token").unwrap();

        let (config, _) = load_or_create_file_config(Some(&path)).unwrap();
        assert_eq!(config.authorization.as_deref(), Some("fresh-token"));
        assert_eq!(config.thread_num, Some(7));
    }
}
