// src/utils.rs

use regex::Regex;
use std::sync::LazyLock;

static UNSAFE_CHARS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"[\\/:*?"<>|\x00-\x1F\x7F]+"#).unwrap());
static UNDERSCORE_RUN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"_{2,}").unwrap());
static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

const WINDOWS_RESERVED: [&str; 22] = [
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9",
];

/// 把任意字符串清理成可以安全用作文件名 (不含扩展名) 的形式。
///
/// 非法字符与控制字符替换为 `_` 并合并，首尾的空白、`.`、`-`、`_` 会被去掉，
/// 结果最多保留 `max_bytes` 个字节 (在 UTF-8 字符边界处截断)。返回空字符串时由调用方决定回退值。
pub fn sanitize_filename(name: &str, max_bytes: usize) -> String {
    let spaced = WHITESPACE_RE.replace_all(name, " ");
    let replaced = UNSAFE_CHARS_RE.replace_all(&spaced, "_");
    let collapsed = UNDERSCORE_RUN_RE.replace_all(&replaced, "_");

    let trim_set = |c: char| c.is_whitespace() || matches!(c, '.' | '-' | '_');
    let trimmed = safe_truncate_utf8(collapsed.trim_matches(trim_set), max_bytes);
    // 截断可能重新暴露尾部的分隔符
    let mut cleaned = trimmed.trim_end_matches(trim_set).to_string();

    if WINDOWS_RESERVED.contains(&cleaned.to_uppercase().as_str()) {
        cleaned.push('_');
    }
    cleaned
}

fn safe_truncate_utf8(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut i = max_bytes;
    while i > 0 && !s.is_char_boundary(i) {
        i -= 1;
    }
    &s[..i]
}

pub fn truncate_text(text: &str, max_width: usize) -> String {
    let mut width = 0;
    let mut end_pos = 0;
    for (i, c) in text.char_indices() {
        width += if c.is_ascii() { 1 } else { 2 };
        if width > max_width.saturating_sub(3) {
            end_pos = i;
            break;
        }
    }
    if end_pos == 0 { text.to_string() } else { format!("{}...", &text[..end_pos]) }
}

/// 百分比进度，`total` 为 0 时视为未知
pub fn ratio(complete: u64, total: u64) -> f32 {
    if total == 0 {
        return 0.0;
    }
    (complete as f64 / total as f64).clamp(0.0, 1.0) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_filename() {
        // 非法字符替换为下划线并合并
        assert_eq!(sanitize_filename("a\\b/c:d*e?f\"g<h>i|j", 128), "a_b_c_d_e_f_g_h_i_j");
        assert_eq!(sanitize_filename("what?? <really>", 128), "what_ _really");

        // 首尾空格、点、连字符、下划线
        assert_eq!(sanitize_filename(" . my file. ", 128), "my file");
        assert_eq!(sanitize_filename("--Demo--", 128), "Demo");

        // 连续空白
        assert_eq!(sanitize_filename("a  b \t c", 128), "a b c");

        // 控制字符
        assert_eq!(sanitize_filename("bell\u{7}ring", 128), "bell_ring");
        assert_eq!(sanitize_filename("line\nbreak", 128), "line break");

        // Windows 保留字
        assert_eq!(sanitize_filename("con", 128), "con_");

        // 全部被清理掉的输入
        assert_eq!(sanitize_filename("", 128), "");
        assert_eq!(sanitize_filename("<>|", 128), "");
        assert_eq!(sanitize_filename(" ... ", 128), "");
    }

    #[test]
    fn test_sanitize_filename_caps_bytes_on_char_boundary() {
        let long = "这是一个非常长的文件名".repeat(20);
        let cleaned = sanitize_filename(&long, 200);
        // 每个汉字 3 字节，200 字节内最多容纳 66 个
        assert_eq!(cleaned.len(), 198);
        assert_eq!(cleaned.chars().count(), 66);
        assert!(long.starts_with(&cleaned));

        // 截断点落在多字节字符中间时回退到字符边界
        assert_eq!(sanitize_filename("ab東方", 4), "ab");

        assert_eq!(sanitize_filename("abc - def", 5), "abc");
    }

    #[test]
    fn test_truncate_text() {
        assert_eq!(truncate_text("short", 20), "short");
        assert_eq!(truncate_text("a very long title indeed", 10), "a very ...");
    }

    #[test]
    fn test_ratio() {
        assert_eq!(ratio(5, 0), 0.0);
        assert_eq!(ratio(50, 100), 0.5);
        assert_eq!(ratio(200, 100), 1.0);
    }
}
