// src/workflows.rs

use crate::{
    DownloadJobContext,
    catalog::IwaraCatalog,
    cli::{Cli, GenListArgs, ServeArgs},
    config::AppConfig,
    constants::{self, api},
    downloader::{CliObserver, JobList, TransferOptions, resolve_inputs, run_with_retry},
    error::{AppError, AppResult},
    models::api::VideoInfo,
    server, symbols, ui, utils,
};
use anyhow::anyhow;
use chrono::{DateTime, Duration as ChronoDuration, Local, Utc};
use colored::*;
use log::{debug, info};
use std::{fs, io::Write, path::Path, sync::Arc};

/// 批量下载模式：恢复任务列表，解析输入链接，然后按轮次下载直到成功或用完重试次数
pub(crate) async fn run_download(context: DownloadJobContext, args: &Cli) -> AppResult<()> {
    let config = context.config.clone();
    fs::create_dir_all(config.root())?;

    let mut jobs = JobList::with_file(config.job_list_path());
    if args.resume {
        let restored = jobs.load()?;
        ui::info(&format!("从任务列表恢复了 {} 个未完成的视频", restored));
    }

    let mut inputs = args.urls.clone();
    if let Some(list_file) = &args.list_file {
        inputs.extend(read_list_file(list_file)?);
    }
    if !inputs.is_empty() {
        ui::info(&format!("正在解析 {} 个链接...", inputs.len()));
        let ids = resolve_inputs(&inputs, context.catalog.as_ref(), &config.site_hosts).await;
        jobs.extend(ids);
    }
    jobs.save()?;

    if jobs.is_empty() {
        ui::warn("没有需要下载的视频。");
        return Ok(());
    }

    ui::print_header(&format!(
        "开始下载 {} 个视频 (按 {} 可随时退出)",
        jobs.len(),
        *symbols::CTRL_C
    ));
    let options = TransferOptions::from_config(&config);
    let observer = CliObserver::new();
    let failed = run_with_retry(&context, &mut jobs, &options, &observer, config.max_retry).await?;

    if failed > 0 {
        Err(AppError::Other(anyhow!(
            "{} 个视频下载失败，可以使用 --resume 继续。",
            failed
        )))
    } else {
        Ok(())
    }
}

/// 列表文件每行一个链接，忽略空行与行尾的 `\r`
fn read_list_file(path: &Path) -> AppResult<Vec<String>> {
    let content = fs::read_to_string(path).map_err(|e| {
        log::error!("读取列表文件 '{}' 失败: {}", path.display(), e);
        AppError::from(e)
    })?;
    let lines: Vec<String> = content
        .lines()
        .map(|line| line.trim_end_matches('\r').trim().to_string())
        .filter(|line| !line.is_empty())
        .collect();
    debug!("列表文件 {:?} 中有 {} 行", path, lines.len());
    Ok(lines)
}

/// 守护进程模式
pub(crate) async fn run_serve(context: DownloadJobContext, args: &ServeArgs) -> AppResult<()> {
    let Some(token) = context.config.api_token.clone() else {
        return Err(AppError::InvalidRequest(format!(
            "启动守护进程需要 API Token，请使用 --api-token、环境变量 {} 或配置文件 api_token 提供。",
            constants::API_TOKEN_ENV
        )));
    };
    if args.port == 0 {
        return Err(AppError::InvalidRequest("端口必须在 1-65535 之间。".to_string()));
    }

    ui::print_header("下载守护进程");
    ui::info(&format!("监听地址: http://{}:{}", args.bind, args.port));
    ui::info(&format!("下载根目录: {}", context.config.root().display()));
    server::run_server(context, &args.bind, args.port, &token).await
}

/// genlist 的过滤条件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VideoFilter {
    pub like0: i64,
    pub like_inc: i64,
    pub min_views: i64,
    pub min_duration: i64,
    pub date_limit_days: i64,
}

impl From<&GenListArgs> for VideoFilter {
    fn from(args: &GenListArgs) -> Self {
        Self {
            like0: args.filter_like0,
            like_inc: args.filter_like_inc,
            min_views: args.filter_views,
            min_duration: args.filter_duration,
            date_limit_days: args.date_limit,
        }
    }
}

/// 点赞数门槛随发布天数线性增长: like0 + like_inc * 天数
pub fn is_accept_video(video: &VideoInfo, filter: &VideoFilter, now: DateTime<Utc>) -> bool {
    let Some(created_at) = video.created_at else {
        return false;
    };
    let age_days = (now - created_at).num_days();
    let like_threshold = filter.like0 + filter.like_inc * age_days;
    let duration = video.file.as_ref().map_or(0, |f| f.duration);
    let oldest = now - ChronoDuration::days(filter.date_limit_days);

    video.num_likes >= like_threshold
        && video.num_views >= filter.min_views
        && duration >= filter.min_duration
        && created_at > oldest
}

pub fn validate_genlist_args(args: &GenListArgs) -> AppResult<()> {
    let invalid = |msg: String| Err(AppError::InvalidRequest(msg));
    if !api::VALID_SORTS.contains(&args.sort.as_str()) {
        return invalid(format!(
            "无效的 --sort '{}'，可选值: {}",
            args.sort,
            api::VALID_SORTS.join(", ")
        ));
    }
    if !api::VALID_RATINGS.contains(&args.rating.as_str()) {
        return invalid(format!(
            "无效的 --rating '{}'，可选值: {}",
            args.rating,
            api::VALID_RATINGS.join(", ")
        ));
    }
    if args.page_limit <= 0 {
        return invalid(format!("无效的 --page-limit {}，必须大于 0", args.page_limit));
    }
    if args.date_limit <= 0 {
        return invalid(format!("无效的 --date-limit {}，必须大于 0", args.date_limit));
    }
    if args.filter_like0 < 0 {
        return invalid(format!("无效的 --filter-like0 {}，不能小于 0", args.filter_like0));
    }
    if args.filter_like_inc < 0 {
        return invalid(format!("无效的 --filter-like-inc {}，不能小于 0", args.filter_like_inc));
    }
    if args.filter_views < 0 {
        return invalid(format!("无效的 --filter-views {}，不能小于 0", args.filter_views));
    }
    if args.filter_duration <= 0 {
        return invalid(format!("无效的 --filter-duration {}，必须大于 0", args.filter_duration));
    }
    if args.output.as_os_str().to_string_lossy().trim().is_empty() {
        return invalid("无效的 --output，文件名不能为空".to_string());
    }
    Ok(())
}

/// 按排序拉取视频列表，过滤后把链接写入输出文件
pub(crate) async fn run_genlist(config: Arc<AppConfig>, args: &GenListArgs) -> AppResult<()> {
    validate_genlist_args(args)?;
    let catalog = IwaraCatalog::new(config.clone())?;
    let now = Utc::now();
    let oldest = now - ChronoDuration::days(args.date_limit);

    ui::print_header(&format!("生成视频列表 (sort={}, rating={})", args.sort, args.rating));
    let mut videos: Vec<VideoInfo> = Vec::new();
    for page in 0..args.page_limit as usize {
        if page > 0 {
            let pause = if (page + 1) % 5 == 0 {
                constants::GENLIST_LONG_PAUSE
            } else {
                constants::GENLIST_PAGE_PAUSE
            };
            debug!("等待 {:?} 后获取下一页", pause);
            tokio::time::sleep(pause).await;
        }

        let list = catalog.list_videos(&args.sort, page, &args.rating).await?;
        if list.results.is_empty() {
            ui::info(&format!("第 {} 页没有更多视频", page + 1));
            break;
        }
        ui::info(&format!("第 {} 页: 获取到 {} 个视频", page + 1, list.results.len()));
        let reached_limit = args.sort == "date"
            && list
                .results
                .last()
                .and_then(|v| v.created_at)
                .is_some_and(|t| t < oldest);
        videos.extend(list.results);
        if reached_limit {
            debug!("已超出日期范围，停止翻页");
            break;
        }
    }

    let filter = VideoFilter::from(args);
    let accepted: Vec<&VideoInfo> = videos
        .iter()
        .filter(|v| is_accept_video(v, &filter, now))
        .collect();
    print_video_table(&accepted);

    let mut file = fs::File::create(&args.output)?;
    for video in &accepted {
        writeln!(file, "{}/video/{}", config.site_base.trim_end_matches('/'), video.id)?;
    }
    info!("genlist 写入 {} 条链接到 {:?}", accepted.len(), args.output);
    println!(
        "\n{} 共 {} 个视频符合条件，已写入 {}",
        *symbols::OK,
        accepted.len(),
        args.output.display().to_string().green()
    );
    Ok(())
}

fn print_video_table(videos: &[&VideoInfo]) {
    ui::print_sub_header("符合条件的视频");
    println!("{:<16} {:>6}  {:<19}  {}", "ID", "Likes", "Date", "Title");
    for video in videos {
        let date = video
            .created_at
            .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default();
        println!(
            "{:<16} {:>6}  {:<19}  {}",
            video.id,
            video.num_likes,
            date,
            utils::truncate_text(&video.title, constants::FILENAME_TRUNCATE_LENGTH)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::api::FileInfo;
    use std::path::PathBuf;

    fn genlist_args() -> GenListArgs {
        GenListArgs {
            sort: "trending".into(),
            page_limit: 1,
            date_limit: 7,
            rating: "ecchi".into(),
            filter_like0: 100,
            filter_like_inc: 50,
            filter_views: 0,
            filter_duration: 90,
            output: PathBuf::from("videolist.txt"),
        }
    }

    fn video(likes: i64, views: i64, duration: i64, age_hours: i64, now: DateTime<Utc>) -> VideoInfo {
        VideoInfo {
            id: "v".into(),
            num_likes: likes,
            num_views: views,
            file: Some(FileInfo {
                duration,
                ..Default::default()
            }),
            created_at: Some(now - ChronoDuration::hours(age_hours)),
            ..Default::default()
        }
    }

    #[test]
    fn test_accept_threshold_grows_with_age() {
        let now = Utc::now();
        let filter = VideoFilter::from(&genlist_args());
        // 2 天前发布: 需要 100 + 50 * 2 = 200 个赞
        assert!(is_accept_video(&video(200, 0, 120, 50, now), &filter, now));
        assert!(!is_accept_video(&video(199, 0, 120, 50, now), &filter, now));
        // 当天发布只需要 100
        assert!(is_accept_video(&video(100, 0, 120, 3, now), &filter, now));
    }

    #[test]
    fn test_accept_rejects_short_old_or_undated() {
        let now = Utc::now();
        let filter = VideoFilter::from(&genlist_args());
        assert!(!is_accept_video(&video(10_000, 0, 60, 3, now), &filter, now));
        assert!(!is_accept_video(&video(10_000, 0, 120, 24 * 8, now), &filter, now));

        let mut undated = video(10_000, 0, 120, 3, now);
        undated.created_at = None;
        assert!(!is_accept_video(&undated, &filter, now));

        let mut no_file = video(10_000, 0, 120, 3, now);
        no_file.file = None;
        assert!(!is_accept_video(&no_file, &filter, now));
    }

    #[test]
    fn test_validate_genlist_args() {
        assert!(validate_genlist_args(&genlist_args()).is_ok());

        let mut args = genlist_args();
        args.sort = "random".into();
        assert!(validate_genlist_args(&args).is_err());

        let mut args = genlist_args();
        args.rating = "r18".into();
        assert!(validate_genlist_args(&args).is_err());

        let mut args = genlist_args();
        args.page_limit = 0;
        assert!(validate_genlist_args(&args).is_err());

        let mut args = genlist_args();
        args.filter_duration = 0;
        assert!(validate_genlist_args(&args).is_err());

        let mut args = genlist_args();
        args.output = PathBuf::from("  ");
        assert!(validate_genlist_args(&args).is_err());
    }

    #[test]
    fn test_read_list_file_trims_crlf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("links.txt");
        fs::write(&path, "https://www.iwara.tv/video/a\r\n\r\n  https://www.iwara.tv/video/b  \r\n").unwrap();
        assert_eq!(
            read_list_file(&path).unwrap(),
            vec![
                "https://www.iwara.tv/video/a".to_string(),
                "https://www.iwara.tv/video/b".to_string()
            ]
        );
    }
}
