// src/downloader/history.rs

use crate::error::*;
use log::{debug, error};
use std::{
    fs::{self, OpenOptions},
    io::Write,
    path::PathBuf,
    sync::{Mutex, PoisonError},
};

/// 已完成下载的记录 (`history.list`)，每行一个视频 ID，只追加不修改。
///
/// 查询时把文件内容读入内存并排序，之后用二分查找；缓存在 `record` 时同步更新，
/// 每个批次开始时调用 `refresh` 重新读取，外部对文件的修改在下一批次生效。
pub struct HistoryLedger {
    path: PathBuf,
    cache: Mutex<Option<Vec<String>>>,
}

impl HistoryLedger {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            cache: Mutex::new(None),
        }
    }

    /// 丢弃缓存，下次查询时重新读取文件
    pub fn refresh(&self) {
        *self.cache.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn has(&self, id: &str) -> AppResult<bool> {
        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if cache.is_none() {
            *cache = Some(self.load_sorted()?);
        }
        Ok(cache
            .as_ref()
            .is_some_and(|ids| ids.binary_search_by(|probe| probe.as_str().cmp(id)).is_ok()))
    }

    /// 追加一条完成记录。写入失败只记录日志，不向调用方报错。
    pub fn record(&self, id: &str) {
        if let Err(e) = self.append(id) {
            error!("写入下载历史 '{}' 失败 (ID: {}): {}", self.path.display(), id, e);
            return;
        }
        debug!("已记录下载历史: {}", id);

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(ids) = cache.as_mut()
            && let Err(pos) = ids.binary_search_by(|probe| probe.as_str().cmp(id))
        {
            ids.insert(pos, id.to_string());
        }
    }

    fn append(&self, id: &str) -> AppResult<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", id)?;
        Ok(())
    }

    fn load_sorted(&self) -> AppResult<Vec<String>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let content = fs::read_to_string(&self.path)?;
        let mut ids: Vec<String> = content
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();
        ids.sort_unstable();
        ids.dedup();
        debug!("已加载 {} 条下载历史", ids.len());
        Ok(ids)
    }
}
