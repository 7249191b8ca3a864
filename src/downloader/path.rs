// src/downloader/path.rs

use super::template::{Template, TemplateContext, convert_legacy};
use crate::{config::AppConfig, constants, error::*, models::ItemMetadata, utils};
use log::{debug, warn};
use std::{
    fs,
    path::{Path, PathBuf},
};

/// 解析后的保存位置，`file_path` 总是绝对路径
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPath {
    pub dir: PathBuf,
    pub file_path: PathBuf,
}

impl OutputPath {
    /// 与视频文件同名的 NFO 文件路径
    pub fn sidecar_path(&self) -> PathBuf {
        self.file_path.with_extension(constants::SIDECAR_EXTENSION)
    }
}

/// 根据目录模板和文件名模板计算视频的保存位置，并确保目录存在。
///
/// 目录模板为空时使用 `根目录/作者` (关闭子目录时直接使用根目录)；
/// 相对路径的渲染结果以配置的根目录为基准。
pub fn resolve_output_path(
    meta: &ItemMetadata,
    quality: &str,
    dir_template: &str,
    filename_template: &str,
    config: &AppConfig,
) -> AppResult<OutputPath> {
    let ctx = TemplateContext::for_item(meta, quality);
    let dir = resolve_dir(meta, dir_template, &ctx, config)?;
    let stem = render_stem(meta, filename_template, &ctx, config);
    let file_path = dir.join(format!("{}.{}", stem, constants::MEDIA_EXTENSION));
    debug!("视频 {} 的保存路径: {:?}", meta.id, file_path);
    Ok(OutputPath { dir, file_path })
}

fn resolve_dir(
    meta: &ItemMetadata,
    dir_template: &str,
    ctx: &TemplateContext,
    config: &AppConfig,
) -> AppResult<PathBuf> {
    let converted = convert_legacy(dir_template);
    let target = if converted.trim().is_empty() {
        default_dir(meta, config)
    } else {
        let rendered = Template::parse(&converted)?.render(ctx);
        let rendered = rendered.trim();
        if rendered.is_empty() {
            return Err(AppError::EmptyPath(dir_template.to_string()));
        }
        let candidate = PathBuf::from(rendered);
        if candidate.is_absolute() {
            candidate
        } else {
            config.root_dir.join(candidate)
        }
    };
    ensure_dir(&target)
}

fn default_dir(meta: &ItemMetadata, config: &AppConfig) -> PathBuf {
    if !config.use_sub_dir {
        return config.root_dir.clone();
    }
    let folder = utils::sanitize_filename(meta.author.display_name(), constants::MAX_SUBDIR_BYTES);
    if folder.is_empty() {
        config.root_dir.clone()
    } else {
        config.root_dir.join(folder)
    }
}

fn ensure_dir(dir: &Path) -> AppResult<PathBuf> {
    fs::create_dir_all(dir)?;
    Ok(dunce::canonicalize(dir)?)
}

/// 文件名模板依次回退: 传入的模板 -> 配置中的模板 -> 内置默认模板
fn render_stem(
    meta: &ItemMetadata,
    filename_template: &str,
    ctx: &TemplateContext,
    config: &AppConfig,
) -> String {
    let source = [filename_template, config.filename_template.as_str()]
        .into_iter()
        .map(convert_legacy)
        .find(|tpl| !tpl.trim().is_empty())
        .unwrap_or_else(|| constants::DEFAULT_FILENAME_TEMPLATE.to_string());

    let rendered = match Template::parse(&source) {
        Ok(tpl) => tpl.render(ctx),
        Err(e) => {
            warn!("文件名模板 '{}' 无效 ({}), 使用默认模板", source, e);
            Template::parse(constants::DEFAULT_FILENAME_TEMPLATE)
                .map(|tpl| tpl.render(ctx))
                .unwrap_or_default()
        }
    };

    let stem = utils::sanitize_filename(rendered.trim(), constants::MAX_STEM_BYTES);
    if stem.is_empty() { meta.id.clone() } else { stem }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;

    fn config_for(root: &Path) -> AppConfig {
        AppConfig {
            root_dir: root.to_path_buf(),
            ..Default::default()
        }
    }

    fn demo() -> ItemMetadata {
        ItemMetadata {
            id: "abc123".into(),
            title: "Demo".into(),
            author: Author { handle: "alice".into(), name: "alice".into() },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_layout_uses_author_subfolder() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let out = resolve_output_path(&demo(), "Source", "", "", &config).unwrap();

        let root = dunce::canonicalize(tmp.path()).unwrap();
        assert_eq!(out.dir, root.join("alice"));
        assert_eq!(out.file_path, root.join("alice").join("Demo-abc123.mp4"));
        assert_eq!(out.sidecar_path(), root.join("alice").join("Demo-abc123.nfo"));
        assert!(out.dir.is_dir());
    }

    #[test]
    fn test_sub_dir_disabled_uses_root() {
        let tmp = tempfile::tempdir().unwrap();
        let config = AppConfig { use_sub_dir: false, ..config_for(tmp.path()) };
        let out = resolve_output_path(&demo(), "", "", "", &config).unwrap();
        assert_eq!(out.dir, dunce::canonicalize(tmp.path()).unwrap());
    }

    #[test]
    fn test_relative_dir_template_is_joined_onto_root() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let out = resolve_output_path(&demo(), "Source", "by/%#AUTHOR#%/{{quality}}", "", &config)
            .unwrap();
        let root = dunce::canonicalize(tmp.path()).unwrap();
        assert_eq!(out.dir, root.join("by").join("alice").join("Source"));
    }

    #[test]
    fn test_dir_template_rendering_empty_is_error() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let err = resolve_output_path(&demo(), "", "  {{quality}}  ", "", &config).unwrap_err();
        assert!(matches!(err, AppError::EmptyPath(_)));
    }

    #[test]
    fn test_filename_fallback_chain() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config_for(tmp.path());
        config.filename_template = "%#ID#%_cfg".into();

        let supplied = resolve_output_path(&demo(), "", "", "{{video_id}}_req", &config).unwrap();
        assert!(supplied.file_path.ends_with("abc123_req.mp4"));

        let from_config = resolve_output_path(&demo(), "", "", "  ", &config).unwrap();
        assert!(from_config.file_path.ends_with("abc123_cfg.mp4"));

        config.filename_template.clear();
        let builtin = resolve_output_path(&demo(), "", "", "", &config).unwrap();
        assert!(builtin.file_path.ends_with("Demo-abc123.mp4"));
    }

    #[test]
    fn test_title_that_sanitizes_to_nothing_falls_back_to_id() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let meta = ItemMetadata { title: "???".into(), ..demo() };

        let default_tpl = resolve_output_path(&meta, "", "", "", &config).unwrap();
        assert!(default_tpl.file_path.ends_with("abc123.mp4"));

        let title_only = resolve_output_path(&meta, "", "", "{{title}}", &config).unwrap();
        assert!(title_only.file_path.ends_with("abc123.mp4"));
    }

    #[test]
    fn test_legacy_and_native_templates_resolve_identically() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let legacy = resolve_output_path(&demo(), "", "", "%#TITLE#%-%#ID#%", &config).unwrap();
        let native = resolve_output_path(&demo(), "", "", "{{title}}-{{video_id}}", &config).unwrap();
        assert_eq!(legacy, native);
    }

    #[test]
    fn test_long_cjk_title_stays_within_file_name_limit() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config_for(tmp.path());
        let meta = ItemMetadata { title: "東方".repeat(50), ..demo() };

        let out = resolve_output_path(&meta, "", "", "", &config).unwrap();
        let media_name = out.file_path.file_name().unwrap().to_str().unwrap().to_string();
        let sidecar_name = out.sidecar_path().file_name().unwrap().to_str().unwrap().to_string();
        assert!(media_name.len() <= 255);
        assert!(sidecar_name.len() <= 255);
        assert!(media_name.starts_with("東方"));

        // 两个文件都能真正写入磁盘
        fs::write(&out.file_path, b"x").unwrap();
        fs::write(out.sidecar_path(), b"x").unwrap();
    }
}
