// src/sidecar.rs

use crate::{error::*, models::ItemMetadata};
use chrono::Local;
use log::debug;
use std::{fmt::Write as _, fs, path::Path};

/// 在视频旁写入描述文件
pub trait SidecarWriter: Send + Sync {
    fn write(&self, meta: &ItemMetadata, target: &Path) -> AppResult<()>;
}

/// Jellyfin / Kodi 可识别的 `musicvideo` NFO
pub struct NfoWriter;

impl NfoWriter {
    pub fn render(meta: &ItemMetadata) -> String {
        let release = meta
            .created_at
            .map(|t| t.format("%Y-%m-%d").to_string())
            .unwrap_or_default();
        let year = meta
            .created_at
            .map(|t| t.format("%Y").to_string())
            .unwrap_or_default();
        let plot = escape_xml(&meta.body).replace('\n', "<br/>\n");

        let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n<musicvideo>\n");
        let _ = writeln!(xml, "  <director>{}</director>", escape_xml(meta.author.display_name()));
        let _ = writeln!(xml, "  <title>{}</title>", escape_xml(&meta.title));
        let _ = writeln!(xml, "  <plot>{}</plot>", plot);
        let _ = writeln!(xml, "  <releasedate>{}</releasedate>", release);
        let _ = writeln!(xml, "  <premiered>{}</premiered>", release);
        let _ = writeln!(xml, "  <year>{}</year>", year);
        let _ = writeln!(
            xml,
            "  <dateadded>{}</dateadded>",
            Local::now().format("%Y-%m-%d %H:%M:%S")
        );
        for tag in &meta.tags {
            let _ = writeln!(xml, "  <genre>{}</genre>", escape_xml(tag));
        }
        xml.push_str("</musicvideo>\n");
        xml
    }
}

impl SidecarWriter for NfoWriter {
    fn write(&self, meta: &ItemMetadata, target: &Path) -> AppResult<()> {
        debug!("写入 NFO 文件: {:?}", target);
        fs::write(target, Self::render(meta))?;
        Ok(())
    }
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}
