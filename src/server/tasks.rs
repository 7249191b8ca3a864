// src/server/tasks.rs

use crate::{
    DownloadJobContext,
    config::AppConfig,
    constants,
    downloader::{
        BatchSummary, JobList, ProgressEvent, ProgressObserver, Template, TransferOptions,
        run_with_retry,
    },
    error::*,
};
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashMap,
    sync::{Arc, PoisonError, RwLock},
    time::Duration,
};
use tokio::sync::Notify;
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskState {
    Queued,
    Running,
    Completed,
    Failed,
}

/// 请求中携带的任务选项，所有字段均可省略
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TaskOptionsRequest {
    pub proxy_url: Option<String>,
    pub download_dir: Option<String>,
    pub cookie: Option<String>,
    pub max_retry: Option<i64>,
    pub filename_template: Option<String>,
}

/// 合并默认配置后的任务选项
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOptions {
    pub proxy_url: Option<String>,
    /// 下载目录模板，为空时使用 根目录/作者
    pub download_dir: String,
    pub cookie: Option<String>,
    pub max_retry: usize,
    pub filename_template: String,
}

impl TaskOptions {
    pub fn transfer_options(&self) -> TransferOptions {
        TransferOptions {
            proxy_url: self.proxy_url.clone(),
            cookie: self.cookie.clone(),
            dir_template: self.download_dir.clone(),
            filename_template: self.filename_template.clone(),
        }
    }
}

/// 对外展示的选项摘要，不包含 Cookie 本身
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TaskOptionsSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<String>,
    pub download_dir: String,
    pub cookie_set: bool,
    pub max_retry: usize,
    pub filename_template: String,
}

#[derive(Debug, Clone)]
pub struct Task {
    pub id: String,
    pub state: TaskState,
    pub progress: f32,
    pub created_at: DateTime<Utc>,
    pub options: TaskOptions,
}

impl Task {
    pub fn summary(&self) -> TaskOptionsSummary {
        TaskOptionsSummary {
            proxy_url: self.options.proxy_url.clone(),
            download_dir: self.options.download_dir.clone(),
            cookie_set: self.options.cookie.is_some(),
            max_retry: self.options.max_retry,
            filename_template: self.options.filename_template.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteResult {
    Deleted,
    NotFound,
    NotQueued,
}

/// 守护进程的任务表。所有读取都返回副本。
#[derive(Default)]
pub struct TaskStore {
    tasks: RwLock<HashMap<String, Task>>,
    wake: Notify,
}

impl TaskStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 为尚未存在的 ID 创建排队任务，已存在的 ID 直接跳过。返回新建的任务。
    pub fn insert_new(&self, ids: &[String], options: &TaskOptions) -> Vec<Task> {
        let created: Vec<Task> = {
            let mut tasks = self.tasks.write().unwrap_or_else(PoisonError::into_inner);
            ids.iter()
                .filter_map(|id| {
                    if tasks.contains_key(id) {
                        debug!("任务 {} 已存在，跳过", id);
                        return None;
                    }
                    let task = Task {
                        id: id.clone(),
                        state: TaskState::Queued,
                        progress: 0.0,
                        created_at: Utc::now(),
                        options: options.clone(),
                    };
                    tasks.insert(id.clone(), task.clone());
                    Some(task)
                })
                .collect()
        };
        if !created.is_empty() {
            info!("新增 {} 个下载任务", created.len());
            self.wake.notify_one();
        }
        created
    }

    pub fn get(&self, id: &str) -> Option<Task> {
        self.read().get(id).cloned()
    }

    /// 按创建时间排序的全部任务
    pub fn list(&self) -> Vec<Task> {
        let mut list: Vec<Task> = self.read().values().cloned().collect();
        list.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        list
    }

    /// 只有排队中的任务可以删除
    pub fn delete(&self, id: &str) -> DeleteResult {
        let mut tasks = self.write();
        match tasks.get(id) {
            None => DeleteResult::NotFound,
            Some(task) if task.state != TaskState::Queued => DeleteResult::NotQueued,
            Some(_) => {
                tasks.remove(id);
                info!("已删除任务 {}", id);
                DeleteResult::Deleted
            }
        }
    }

    /// 取出最早创建的排队任务并标记为运行中
    pub fn claim_next(&self) -> Option<Task> {
        let mut tasks = self.write();
        let task = tasks
            .values_mut()
            .filter(|t| t.state == TaskState::Queued)
            .min_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)))?;
        task.state = TaskState::Running;
        task.progress = 0.0;
        Some(task.clone())
    }

    /// 只推进运行中的任务。单轮失败不改变状态，最终是否失败由 `finish` 决定
    pub fn apply_progress(&self, event: &ProgressEvent) {
        let mut tasks = self.write();
        let Some(task) = tasks.get_mut(&event.id) else {
            return;
        };
        if task.state != TaskState::Running {
            return;
        }

        if event.done {
            if event.success {
                task.state = TaskState::Completed;
                task.progress = 1.0;
            }
            return;
        }
        if event.bytes_total > 0 {
            task.progress = event.fraction().clamp(0.0, 1.0);
        }
    }

    /// 任务离开运行状态：仍在运行中的按下载历史确定最终状态，并清除 Cookie
    pub fn finish(&self, id: &str, in_history: bool) {
        let mut tasks = self.write();
        let Some(task) = tasks.get_mut(id) else {
            return;
        };
        if in_history {
            task.state = TaskState::Completed;
            task.progress = 1.0;
        } else if task.state != TaskState::Completed {
            task.state = TaskState::Failed;
        }
        task.options.cookie = None;
    }

    async fn wait_for_work(&self) {
        self.wake.notified().await;
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, HashMap<String, Task>> {
        self.tasks.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, HashMap<String, Task>> {
        self.tasks.write().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 合并请求选项与配置默认值，并在入队前校验模板和代理地址
pub fn resolve_task_options(req: &TaskOptionsRequest, config: &AppConfig) -> AppResult<TaskOptions> {
    let mut opts = TaskOptions {
        proxy_url: config.proxy_url.clone(),
        download_dir: config.download_dir_template.trim().to_string(),
        cookie: None,
        max_retry: config.max_retry.max(1),
        filename_template: match config.filename_template.trim() {
            "" => constants::DEFAULT_FILENAME_TEMPLATE.to_string(),
            t => t.to_string(),
        },
    };

    if let Some(v) = trimmed(&req.proxy_url) {
        validate_proxy_url(v)?;
        opts.proxy_url = Some(v.to_string());
    }
    if let Some(v) = trimmed(&req.download_dir) {
        Template::compile(v)
            .map_err(|_| AppError::InvalidRequest("invalid download_dir template".into()))?;
        opts.download_dir = v.to_string();
    }
    if let Some(n) = req.max_retry.filter(|n| *n > 0) {
        opts.max_retry = n as usize;
    }
    if let Some(v) = trimmed(&req.cookie) {
        opts.cookie = Some(v.to_string());
    }
    if let Some(v) = trimmed(&req.filename_template) {
        Template::compile(v)
            .map_err(|_| AppError::InvalidRequest("invalid filename_template".into()))?;
        opts.filename_template = v.to_string();
    }
    Ok(opts)
}

fn trimmed(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

fn validate_proxy_url(raw: &str) -> AppResult<()> {
    let url = Url::parse(raw).map_err(|_| AppError::InvalidRequest("invalid proxy_url".into()))?;
    match url.scheme() {
        "http" | "https" | "socks5" => Ok(()),
        _ => Err(AppError::InvalidRequest(
            "proxy_url scheme must be http, https or socks5".into(),
        )),
    }
}

/// 把批次进度写回任务表
struct TaskProgressObserver {
    store: Arc<TaskStore>,
    id: String,
}

impl ProgressObserver for TaskProgressObserver {
    fn on_progress(&self, event: &ProgressEvent) {
        self.store.apply_progress(event);
    }

    fn on_batch_finished(&self, summary: &BatchSummary) {
        debug!(
            "任务 {} 本轮结束: 成功 {}, 失败 {}",
            self.id,
            summary.succeeded,
            summary.failed()
        );
    }

    fn on_retry_scheduled(&self, round: usize, _failed: usize, delay: Duration) {
        info!("任务 {} 第 {} 轮失败，{:?} 后重试", self.id, round, delay);
    }
}

/// 后台调度循环：被唤醒后逐个处理排队任务，一次只运行一个
pub async fn run_dispatcher(store: Arc<TaskStore>, context: DownloadJobContext) {
    info!("任务调度器已启动");
    loop {
        store.wait_for_work().await;
        while let Some(task) = store.claim_next() {
            run_task(&store, &context, task).await;
        }
    }
}

pub async fn run_task(store: &Arc<TaskStore>, context: &DownloadJobContext, task: Task) {
    info!("开始处理任务 {}", task.id);
    let mut jobs = JobList::in_memory([task.id.clone()]);
    let observer = TaskProgressObserver {
        store: store.clone(),
        id: task.id.clone(),
    };
    let options = task.options.transfer_options();

    if let Err(e) = run_with_retry(context, &mut jobs, &options, &observer, task.options.max_retry).await
    {
        error!("任务 {} 执行出错: {}", task.id, e);
    }

    let in_history = match context.ledger.has(&task.id) {
        Ok(found) => found,
        Err(e) => {
            warn!("读取下载历史失败，任务 {} 按失败处理: {}", task.id, e);
            false
        }
    };
    store.finish(&task.id, in_history);
    info!(
        "任务 {} 结束: {}",
        task.id,
        if in_history { "completed" } else { "failed" }
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> TaskOptions {
        TaskOptions {
            proxy_url: None,
            download_dir: String::new(),
            cookie: Some("session=1".into()),
            max_retry: 1,
            filename_template: constants::DEFAULT_FILENAME_TEMPLATE.into(),
        }
    }

    fn ids(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_insert_is_create_if_absent() {
        let store = TaskStore::new();
        assert_eq!(store.insert_new(&ids(&["a", "b"]), &options()).len(), 2);

        let mut other = options();
        other.max_retry = 9;
        let again = store.insert_new(&ids(&["a", "c"]), &other);
        assert_eq!(again.len(), 1);
        assert_eq!(again[0].id, "c");
        assert_eq!(store.get("a").unwrap().options.max_retry, 1);
        assert_eq!(store.list().len(), 3);
    }

    #[test]
    fn test_claim_oldest_and_delete_guard() {
        let store = TaskStore::new();
        store.insert_new(&ids(&["first"]), &options());
        store.insert_new(&ids(&["second"]), &options());

        let claimed = store.claim_next().unwrap();
        assert_eq!(claimed.id, "first");
        assert_eq!(claimed.state, TaskState::Running);

        assert_eq!(store.delete("first"), DeleteResult::NotQueued);
        assert_eq!(store.get("first").unwrap().state, TaskState::Running);
        assert_eq!(store.delete("missing"), DeleteResult::NotFound);
        assert_eq!(store.delete("second"), DeleteResult::Deleted);
        assert!(store.claim_next().is_none());
    }

    #[test]
    fn test_progress_and_finish_scrub_cookie() {
        let store = TaskStore::new();
        store.insert_new(&ids(&["v"]), &options());
        store.claim_next();

        store.apply_progress(&ProgressEvent {
            id: "v".into(),
            bytes_complete: 25,
            bytes_total: 100,
            done: false,
            success: false,
            path: None,
            error: None,
        });
        assert_eq!(store.get("v").unwrap().progress, 0.25);

        store.finish("v", false);
        let task = store.get("v").unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert_eq!(task.progress, 0.25);
        assert!(task.options.cookie.is_none());
        assert!(!task.summary().cookie_set);
    }

    #[test]
    fn test_failed_round_keeps_task_running_until_finish() {
        let store = TaskStore::new();
        store.insert_new(&ids(&["v"]), &options());
        store.claim_next();
        store.apply_progress(&ProgressEvent {
            id: "v".into(),
            bytes_complete: 0,
            bytes_total: 0,
            done: true,
            success: false,
            path: None,
            error: Some("boom".into()),
        });
        // 还有重试轮次时，任务保持运行中且 Cookie 仍可用
        let task = store.get("v").unwrap();
        assert_eq!(task.state, TaskState::Running);
        assert!(task.options.cookie.is_some());

        store.finish("v", false);
        let task = store.get("v").unwrap();
        assert_eq!(task.state, TaskState::Failed);
        assert!(task.options.cookie.is_none());

        // 终止状态不会再被进度事件改变
        store.apply_progress(&ProgressEvent {
            id: "v".into(),
            bytes_complete: 5,
            bytes_total: 10,
            done: false,
            success: false,
            path: None,
            error: None,
        });
        assert_eq!(store.get("v").unwrap().state, TaskState::Failed);
    }

    #[test]
    fn test_progress_ignored_for_queued_task() {
        let store = TaskStore::new();
        store.insert_new(&ids(&["q"]), &options());
        store.apply_progress(&ProgressEvent {
            id: "q".into(),
            bytes_complete: 5,
            bytes_total: 10,
            done: false,
            success: false,
            path: None,
            error: None,
        });
        let task = store.get("q").unwrap();
        assert_eq!(task.state, TaskState::Queued);
        assert_eq!(task.progress, 0.0);
    }

    #[test]
    fn test_resolve_options_defaults_and_overrides() {
        let config = AppConfig {
            max_retry: 4,
            ..Default::default()
        };
        let opts = resolve_task_options(&TaskOptionsRequest::default(), &config).unwrap();
        assert_eq!(opts.filename_template, constants::DEFAULT_FILENAME_TEMPLATE);
        assert_eq!(opts.max_retry, 4);
        assert!(opts.cookie.is_none());

        let req = TaskOptionsRequest {
            proxy_url: Some(" socks5://127.0.0.1:1080 ".into()),
            download_dir: Some("%#AUTHOR#%/%#UPLOADTIME:YYYY#%".into()),
            cookie: Some("  ".into()),
            max_retry: Some(0),
            filename_template: Some("{{video_id}}".into()),
        };
        let opts = resolve_task_options(&req, &config).unwrap();
        assert_eq!(opts.proxy_url.as_deref(), Some("socks5://127.0.0.1:1080"));
        assert_eq!(opts.download_dir, "%#AUTHOR#%/%#UPLOADTIME:YYYY#%");
        assert!(opts.cookie.is_none());
        assert_eq!(opts.max_retry, 4);
        assert_eq!(opts.filename_template, "{{video_id}}");
    }

    #[test]
    fn test_resolve_options_rejects_invalid() {
        let config = AppConfig::default();
        let bad_proxy = TaskOptionsRequest {
            proxy_url: Some("ftp://host".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_task_options(&bad_proxy, &config),
            Err(AppError::InvalidRequest(_))
        ));

        let bad_template = TaskOptionsRequest {
            filename_template: Some("{{title".into()),
            ..Default::default()
        };
        assert!(matches!(
            resolve_task_options(&bad_template, &config),
            Err(AppError::InvalidRequest(_))
        ));
    }
}
