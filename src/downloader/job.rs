// src/downloader/job.rs

use super::history::HistoryLedger;
use crate::error::*;
use itertools::Itertools;
use log::{debug, info};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

/// 本次运行待下载的视频 ID 列表。
///
/// 绑定文件 (`jobs.list`) 时，每次修改后都会原子地重写文件，中断后可以用 `--resume` 继续；
/// 守护进程使用不落盘的内存列表。
#[derive(Debug, Clone, Default)]
pub struct JobList {
    ids: Vec<String>,
    path: Option<PathBuf>,
}

impl JobList {
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            ids: Vec::new(),
            path: Some(path.into()),
        }
    }

    pub fn in_memory<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut list = Self::default();
        list.extend(ids);
        list
    }

    /// 读取上次中断时留下的列表，文件不存在时视为空
    pub fn load(&mut self) -> AppResult<usize> {
        let Some(path) = self.path.clone() else {
            return Ok(0);
        };
        if !path.exists() {
            debug!("未找到任务列表文件 {:?}", path);
            return Ok(0);
        }
        let content = fs::read_to_string(&path)?;
        let before = self.ids.len();
        self.extend(content.lines().map(str::to_string));
        let loaded = self.ids.len() - before;
        info!("从 {:?} 恢复了 {} 个未完成任务", path, loaded);
        Ok(loaded)
    }

    /// 追加 ID，忽略空行并保持首次出现的顺序去重
    pub fn extend<I, S>(&mut self, ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let merged = self
            .ids
            .drain(..)
            .chain(
                ids.into_iter()
                    .map(Into::into)
                    .map(|id: String| id.trim().to_string())
                    .filter(|id| !id.is_empty()),
            )
            .unique()
            .collect();
        self.ids = merged;
    }

    /// 移除已在下载历史中的 ID，返回移除的数量
    pub fn retain_pending(&mut self, ledger: &HistoryLedger) -> AppResult<usize> {
        let before = self.ids.len();
        let mut kept = Vec::with_capacity(before);
        for id in self.ids.drain(..) {
            if ledger.has(&id)? {
                debug!("视频 {} 已下载过，跳过", id);
            } else {
                kept.push(id);
            }
        }
        self.ids = kept;
        Ok(before - self.ids.len())
    }

    /// 原子地写回任务列表文件：先写入同目录下的临时文件，再重命名覆盖
    pub fn save(&self) -> AppResult<()> {
        let Some(path) = self.path.clone() else {
            return Ok(());
        };
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let mut tmp = NamedTempFile::new_in(&dir)?;
        for id in &self.ids {
            writeln!(tmp, "{}", id)?;
        }
        tmp.flush()?;
        tmp.persist(&path)?;
        debug!("任务列表已保存 ({} 项): {:?}", self.ids.len(), path);
        Ok(())
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
