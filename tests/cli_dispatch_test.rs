// tests/cli_dispatch_test.rs

use assert_cmd::Command;
use predicates::prelude::*;
use std::{fs, path::PathBuf};
use tempfile::{TempDir, tempdir};

fn main_command() -> Command {
    let mut cmd = Command::cargo_bin(env!("CARGO_PKG_NAME")).unwrap();
    cmd.env_remove("IWARADL_API_TOKEN")
        .env_remove("IWARADL_AUTH_TOKEN");
    cmd
}

/// 写入一个空配置，避免测试读取或创建用户目录下的配置
fn empty_config() -> (TempDir, PathBuf) {
    let dir = tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{}").unwrap();
    (dir, path)
}

#[test]
fn test_help_flag() {
    main_command()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("显示此帮助信息并退出"))
        .stdout(predicate::str::contains("genlist"));
}

#[test]
fn test_no_input_prints_help() {
    main_command()
        .assert()
        .success()
        .stdout(predicate::str::contains("Usage:"));
}

#[test]
fn test_missing_explicit_config_fails() {
    let dir = tempdir().unwrap();
    main_command()
        .arg("--config")
        .arg(dir.path().join("nope.json"))
        .arg("https://www.iwara.tv/video/abc")
        .assert()
        .failure()
        .code(1)
        .stderr(predicate::str::contains("程序执行出错"));
}

#[test]
fn test_serve_requires_api_token() {
    let (_dir, config) = empty_config();
    main_command()
        .arg("serve")
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("API Token"));
}

#[test]
fn test_serve_rejects_port_zero() {
    let (_dir, config) = empty_config();
    main_command()
        .args(["serve", "--port", "0", "--api-token", "t"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("1-65535"));
}

#[test]
fn test_genlist_rejects_invalid_sort() {
    let (_dir, config) = empty_config();
    main_command()
        .args(["genlist", "--sort", "random"])
        .arg("--config")
        .arg(&config)
        .assert()
        .failure()
        .stderr(predicate::str::contains("无效的 --sort"));
}

#[test]
fn test_unsupported_url_is_reported_and_skipped() {
    let (dir, config) = empty_config();
    let root = dir.path().join("downloads");
    main_command()
        .arg("--config")
        .arg(&config)
        .arg("--root-dir")
        .arg(&root)
        .arg("https://example.com/video/zzz")
        .assert()
        .success()
        .stderr(predicate::str::contains("解析链接"))
        .stderr(predicate::str::contains("没有需要下载的视频"));

    // 任务列表已落盘且为空
    assert_eq!(fs::read_to_string(root.join("jobs.list")).unwrap(), "");
}
