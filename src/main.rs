// src/main.rs

use clap::{CommandFactory, FromArgMatches};
use colored::*;
use iwara_dl::{
    cli::{Cli, Command},
    logging::setup_logging,
    run_from_cli, ui,
};
use std::{env, sync::Arc, time::Duration};

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    {
        colored::control::set_virtual_terminal(true).ok();
    }
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            println!("\n{} 用户强制中断程序。", "[!]".yellow());
            tokio::time::sleep(Duration::from_millis(100)).await;
            std::process::exit(130);
        }
    });

    let bin_name = env::var("CARGO_BIN_NAME").unwrap_or_else(|_| "iwara-dl".to_string());
    let after_help = format!(
        "示例:\n  # 下载单个视频或某个用户的全部视频\n  {bin} https://www.iwara.tv/video/xxxx https://www.iwara.tv/profile/yyyy\n\n  # 从文件读取链接\n  {bin} -l links.txt\n\n  # 继续上次未完成的任务\n  {bin} --resume\n\n  # 启动下载守护进程\n  {bin} serve --port 23456 --api-token <TOKEN>\n\n  # 生成近期热门视频列表\n  {bin} genlist --sort date --page-limit 3 --output videolist.txt",
        bin = bin_name
    );

    let mut cmd = Cli::command().after_help(after_help);
    let matches = cmd.clone().get_matches();
    let args = match Cli::from_arg_matches(&matches) {
        Ok(args) => Arc::new(args),
        Err(e) => e.exit(),
    };

    if args.command.is_none() && !args.has_download_input() {
        let _ = cmd.print_help();
        return;
    }

    let is_serve = matches!(args.command, Some(Command::Serve(_)));
    setup_logging(args.effective_log_level().to_filter(), is_serve);

    if let Err(e) = run_from_cli(args).await {
        log::error!("程序执行出错: {}", e);
        eprintln!();
        ui::error(&format!("程序执行出错: {}", e));
        std::process::exit(1);
    }
}
