// src/downloader/template.rs

//! 路径与文件名模板。
//!
//! 原生写法为 `{{var}}` 或 `{{var:FORMAT}}`，FORMAT 使用 strftime 语法，仅对时间变量生效。
//! 兼容第三方脚本的 `%#VAR:FORMAT#%` 写法，渲染前先转换为原生写法。

use crate::{constants, error::*, models::ItemMetadata};
use chrono::{DateTime, Local, Utc, format::Item, format::StrftimeItems};
use regex::{Captures, Regex};
use std::sync::LazyLock;

static LEGACY_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"%#([A-Za-z]+)(?::([^#%]*))?#%").unwrap());
static LEGACY_LAYOUT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"YYYY|MM|DD|HH|mm|ss").unwrap());
static VAR_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap());

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Var { name: String, format: Option<String> },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    segments: Vec<Segment>,
}

impl Template {
    /// 解析原生写法的模板
    pub fn parse(source: &str) -> AppResult<Self> {
        let mut segments = Vec::new();
        let mut rest = source;

        while let Some(start) = rest.find("{{") {
            if start > 0 {
                segments.push(Segment::Literal(rest[..start].to_string()));
            }
            let after_open = &rest[start + 2..];
            let end = after_open
                .find("}}")
                .ok_or_else(|| AppError::Template(format!("未闭合的 '{{{{': {}", source)))?;
            segments.push(parse_placeholder(&after_open[..end])?);
            rest = &after_open[end + 2..];
        }
        if !rest.is_empty() {
            segments.push(Segment::Literal(rest.to_string()));
        }
        Ok(Self { segments })
    }

    /// 先把旧写法转换为原生写法再解析
    pub fn compile(source: &str) -> AppResult<Self> {
        Self::parse(&convert_legacy(source))
    }

    pub fn render(&self, ctx: &TemplateContext) -> String {
        self.segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(text) => text.clone(),
                Segment::Var { name, format } => ctx.lookup(name, format.as_deref()),
            })
            .collect()
    }
}

fn parse_placeholder(inner: &str) -> AppResult<Segment> {
    let (name, format) = match inner.split_once(':') {
        Some((name, format)) => (name.trim(), Some(format)),
        None => (inner.trim(), None),
    };
    if !VAR_NAME_RE.is_match(name) {
        return Err(AppError::Template(format!("无效的变量名: '{}'", inner)));
    }
    let format = format.filter(|f| !f.trim().is_empty()).map(str::to_string);
    if let Some(f) = &format {
        validate_time_format(f)?;
    }
    Ok(Segment::Var { name: name.to_string(), format })
}

fn validate_time_format(format: &str) -> AppResult<()> {
    if StrftimeItems::new(format).any(|item| matches!(item, Item::Error)) {
        return Err(AppError::Template(format!("无效的时间格式: '{}'", format)));
    }
    Ok(())
}

/// 把 `%#VAR:FORMAT#%` 占位符改写为原生写法，无法识别的占位符保持原样
pub fn convert_legacy(source: &str) -> String {
    if source.trim().is_empty() {
        return source.to_string();
    }
    LEGACY_VAR_RE
        .replace_all(source, |caps: &Captures| {
            let format = caps.get(2).map(|m| m.as_str().trim()).unwrap_or_default();
            let time_var = |name: &str| {
                if format.is_empty() {
                    format!("{{{{{}}}}}", name)
                } else {
                    format!("{{{{{}:{}}}}}", name, convert_layout(format))
                }
            };
            match caps[1].to_uppercase().as_str() {
                "NOWTIME" => time_var("now"),
                "UPLOADTIME" => time_var("publish_time"),
                "TITLE" => "{{title}}".to_string(),
                "ID" => "{{video_id}}".to_string(),
                "AUTHOR" => "{{author}}".to_string(),
                "ALIAS" => "{{author_nickname}}".to_string(),
                "QUALITY" => "{{quality}}".to_string(),
                _ => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// `YYYY-MM-DD HH:mm:ss` 风格的布局转换为 strftime，单次从左到右替换
fn convert_layout(layout: &str) -> String {
    LEGACY_LAYOUT_RE
        .replace_all(layout, |caps: &Captures| match &caps[0] {
            "YYYY" => "%Y",
            "MM" => "%m",
            "DD" => "%d",
            "HH" => "%H",
            "mm" => "%M",
            _ => "%S",
        })
        .into_owned()
}

/// 模板渲染可用的变量集合
#[derive(Debug, Clone, Default)]
pub struct TemplateContext {
    pub now: Option<DateTime<Local>>,
    pub publish_time: Option<DateTime<Utc>>,
    pub title: String,
    pub video_id: String,
    pub author: String,
    pub author_nickname: String,
    pub quality: String,
}

impl TemplateContext {
    pub fn for_item(meta: &ItemMetadata, quality: &str) -> Self {
        Self {
            now: Some(Local::now()),
            publish_time: meta.created_at,
            title: meta.title.clone(),
            video_id: meta.id.clone(),
            author: meta.author.handle.clone(),
            author_nickname: meta.author.name.clone(),
            quality: quality.to_string(),
        }
    }

    fn lookup(&self, name: &str, format: Option<&str>) -> String {
        let layout = format.unwrap_or(constants::DEFAULT_TIME_FORMAT);
        match name {
            "now" => self.now.map(|t| t.format(layout).to_string()).unwrap_or_default(),
            "publish_time" => self
                .publish_time
                .map(|t| t.format(layout).to_string())
                .unwrap_or_default(),
            "title" => self.title.clone(),
            "video_id" => self.video_id.clone(),
            "author" => self.author.clone(),
            "author_nickname" => self.author_nickname.clone(),
            "quality" => self.quality.clone(),
            _ => String::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use chrono::TimeZone;

    fn sample_meta() -> ItemMetadata {
        ItemMetadata {
            id: "abc123".into(),
            title: "Demo".into(),
            author: Author { handle: "alice".into(), name: "Alice A".into() },
            created_at: Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 30, 15).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_render_basic_variables() {
        let ctx = TemplateContext::for_item(&sample_meta(), "Source");
        let tpl = Template::parse("[{{author_nickname}}] {{title}}-{{video_id}} ({{quality}})").unwrap();
        assert_eq!(tpl.render(&ctx), "[Alice A] Demo-abc123 (Source)");
    }

    #[test]
    fn test_time_variables_and_formats() {
        let ctx = TemplateContext::for_item(&sample_meta(), "");
        assert_eq!(Template::parse("{{publish_time}}").unwrap().render(&ctx), "2024-05-01");
        assert_eq!(
            Template::parse("{{ publish_time:%Y%m%d_%H%M%S}}").unwrap().render(&ctx),
            "20240501_083015"
        );
    }

    #[test]
    fn test_unknown_variable_renders_empty() {
        let ctx = TemplateContext::for_item(&sample_meta(), "");
        let tpl = Template::parse("{{title}}{{nope}}-{{video_id}}").unwrap();
        assert_eq!(tpl.render(&ctx), "Demo-abc123");

        // 空上下文下所有变量都为空
        assert_eq!(tpl.render(&TemplateContext::default()), "-");
    }

    #[test]
    fn test_parse_errors() {
        assert!(Template::parse("{{title").is_err());
        assert!(Template::parse("{{}}").is_err());
        assert!(Template::parse("{{bad name}}").is_err());
        assert!(Template::parse("{{now:%Q}}").is_err());
        // 单独的右括号只是普通文本
        assert!(Template::parse("a}}b").is_ok());
    }

    #[test]
    fn test_legacy_dialect_equivalence() {
        let ctx = TemplateContext::for_item(&sample_meta(), "Source");
        let legacy = Template::compile("%#TITLE#%-%#ID#%").unwrap();
        let native = Template::compile("{{title}}-{{video_id}}").unwrap();
        assert_eq!(legacy.render(&ctx), native.render(&ctx));
        assert_eq!(legacy, native);
    }

    #[test]
    fn test_convert_legacy() {
        assert_eq!(
            convert_legacy("%#AUTHOR#%/%#UploadTime:YYYY-MM-DD HH.mm.ss#% %#ALIAS#%"),
            "{{author}}/{{publish_time:%Y-%m-%d %H.%M.%S}} {{author_nickname}}"
        );
        assert_eq!(convert_legacy("%#NowTime#%"), "{{now}}");
        assert_eq!(convert_legacy("%#UNKNOWN#%"), "%#UNKNOWN#%");
        assert_eq!(convert_legacy("   "), "   ");
    }

    #[test]
    fn test_layout_conversion_is_single_pass() {
        // "MM" 转换出的 "%m" 不能再被 "mm" 规则处理
        assert_eq!(convert_layout("MMmm"), "%m%M");
        assert_eq!(convert_layout("YYYYMMDD"), "%Y%m%d");
    }
}
