//! 目录列表
//!
//! 只列出直接子项，排序规则：目录在前，其余按名称不区分大小写排序。
//! 同一份数据既用于 `/api/tree`，也用于服务端渲染的 HTML 页面。

use chrono::{DateTime, Local};
use percent_encoding::{AsciiSet, CONTROLS, utf8_percent_encode};
use serde::Serialize;
use std::io;
use std::path::Path;
use std::time::SystemTime;
use walkdir::WalkDir;

const SIZE_UNITS: [&str; 6] = ["B", "KB", "MB", "GB", "TB", "PB"];

/// href 中需要转义的字符（保留 `/`）
const HREF_ENCODE: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'`')
    .add(b'{')
    .add(b'}')
    .add(b'\'');

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Directory,
    File,
}

/// 目录中的一项
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DirectoryEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub size: u64,
    pub modified: String,
}

impl DirectoryEntry {
    pub fn is_dir(&self) -> bool {
        self.kind == EntryKind::Directory
    }
}

/// `/api/tree` 的响应体
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryTree {
    pub path: String,
    pub items: Vec<DirectoryEntry>,
}

/// 整棵目录树的统计
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirectoryStats {
    pub total_files: u64,
    pub total_dirs: u64,
    pub total_size: u64,
}

/// 列出目录的直接子项
///
/// 无法读取元数据的条目直接跳过。
pub async fn list_directory(dir: &Path) -> io::Result<Vec<DirectoryEntry>> {
    let mut reader = tokio::fs::read_dir(dir).await?;
    let mut items = Vec::new();

    while let Some(entry) = reader.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        // 符号链接按目标类型展示
        let metadata = match tokio::fs::metadata(entry.path()).await {
            Ok(m) => m,
            Err(e) => {
                log::debug!("Skipping {:?}: {}", entry.path(), e);
                continue;
            }
        };

        let kind = if metadata.is_dir() {
            EntryKind::Directory
        } else {
            EntryKind::File
        };
        items.push(DirectoryEntry {
            name,
            kind,
            size: if kind == EntryKind::File { metadata.len() } else { 0 },
            modified: metadata.modified().map(format_iso).unwrap_or_default(),
        });
    }

    sort_entries(&mut items);
    Ok(items)
}

pub fn sort_entries(items: &mut [DirectoryEntry]) {
    items.sort_by_cached_key(|item| (!item.is_dir(), item.name.to_lowercase()));
}

/// 递归统计文件数、目录数与总大小
pub fn directory_stats(root: &Path) -> DirectoryStats {
    let mut stats = DirectoryStats::default();
    for entry in WalkDir::new(root).min_depth(1).into_iter().filter_map(Result::ok) {
        let file_type = entry.file_type();
        if file_type.is_dir() {
            stats.total_dirs += 1;
        } else if file_type.is_file() {
            stats.total_files += 1;
            if let Ok(metadata) = entry.metadata() {
                stats.total_size += metadata.len();
            }
        }
    }
    stats
}

/// 人类可读的文件大小，例如 `512 B`、`1.5 KB`
pub fn format_file_size(size: u64) -> String {
    if size < 1024 {
        return format!("{} {}", size, SIZE_UNITS[0]);
    }

    let mut value = size as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < SIZE_UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.1} {}", value, SIZE_UNITS[unit])
}

fn format_iso(time: SystemTime) -> String {
    DateTime::<Local>::from(time)
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string()
}

fn format_short(modified: &str) -> String {
    // ISO 字符串的前 16 位即 `YYYY-MM-DDTHH:MM`
    modified.get(..16).unwrap_or(modified).replace('T', " ")
}

pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

fn href(path: &str) -> String {
    utf8_percent_encode(path, HREF_ENCODE).to_string()
}

fn parent_of(relative: &str) -> String {
    match relative.trim_end_matches('/').rsplit_once('/') {
        Some(("", _)) | None => "/".to_string(),
        Some((parent, _)) => format!("{parent}/"),
    }
}

/// 服务端渲染的目录页面
pub fn render_listing_html(share_name: &str, relative: &str, items: &[DirectoryEntry]) -> String {
    let is_root = relative == "/";
    let base = if is_root {
        String::from("/")
    } else {
        format!("{}/", relative.trim_end_matches('/'))
    };

    let mut html = String::new();
    html.push_str(concat!(
        "<!DOCTYPE html>\n",
        "<html lang=\"en\">\n",
        "<head>\n",
        "    <meta charset=\"UTF-8\">\n",
        "    <meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\">\n",
        "    <title>Quick Share - Directory Listing</title>\n",
        "    <style>\n",
        "        body { font-family: Arial, sans-serif; margin: 20px; background: #f5f5f5; }\n",
        "        .container { max-width: 1200px; margin: 0 auto; background: white; padding: 20px; border-radius: 8px; }\n",
        "        h1 { color: #333; border-bottom: 2px solid #007bff; padding-bottom: 10px; }\n",
        "        .btn { padding: 10px 20px; background: #007bff; color: white; text-decoration: none; border-radius: 4px; margin-right: 10px; }\n",
        "        table { width: 100%; border-collapse: collapse; margin-top: 20px; }\n",
        "        th, td { text-align: left; padding: 12px; border-bottom: 1px solid #ddd; }\n",
        "        .dir { color: #007bff; font-weight: bold; }\n",
        "    </style>\n",
        "</head>\n",
        "<body>\n",
        "    <div class=\"container\">\n",
    ));
    html.push_str(&format!(
        "        <h1>Quick Share - {}</h1>\n",
        escape_html(share_name)
    ));
    html.push_str(&format!(
        "        <div>Current Path: {}</div>\n",
        escape_html(relative)
    ));
    html.push_str("        <div>\n");
    html.push_str("            <a href=\"/?download=zip\" class=\"btn\">Download All as Zip</a>\n");
    if !is_root {
        html.push_str(&format!(
            "            <a href=\"{}?download=zip\" class=\"btn\">Download This Folder</a>\n",
            escape_html(&href(&base))
        ));
        html.push_str(&format!(
            "            <a href=\"{}\" class=\"btn\">Go Up</a>\n",
            escape_html(&href(&parent_of(relative)))
        ));
    }
    html.push_str("        </div>\n");
    html.push_str("        <table>\n");
    html.push_str("            <thead>\n");
    html.push_str("                <tr><th>Name</th><th>Size</th><th>Modified</th></tr>\n");
    html.push_str("            </thead>\n");
    html.push_str("            <tbody>\n");

    if items.is_empty() {
        html.push_str("                <tr><td colspan=\"3\">No files or directories</td></tr>\n");
    }
    for item in items {
        let (icon, class, size) = if item.is_dir() {
            ("📁", "dir", "-".to_string())
        } else {
            ("📄", "file", format_file_size(item.size))
        };
        let mut link = format!("{}{}", base, item.name);
        if item.is_dir() {
            link.push('/');
        }
        html.push_str(&format!(
            "                <tr><td class=\"{}\"><a href=\"{}\">{} {}</a></td><td>{}</td><td>{}</td></tr>\n",
            class,
            escape_html(&href(&link)),
            icon,
            escape_html(&item.name),
            size,
            escape_html(&format_short(&item.modified)),
        ));
    }

    html.push_str(concat!(
        "            </tbody>\n",
        "        </table>\n",
        "    </div>\n",
        "</body>\n",
        "</html>\n",
    ));
    html
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn entry(name: &str, kind: EntryKind) -> DirectoryEntry {
        DirectoryEntry {
            name: name.to_string(),
            kind,
            size: 10,
            modified: "2024-05-01T12:30:00".to_string(),
        }
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(0), "0 B");
        assert_eq!(format_file_size(500), "500 B");
        assert_eq!(format_file_size(1536), "1.5 KB");
        assert_eq!(format_file_size(1024 * 1024), "1.0 MB");
        assert_eq!(format_file_size(1024 * 1024 * 1024), "1.0 GB");
    }

    #[test]
    fn test_sort_dirs_first_case_insensitive() {
        let mut items = vec![
            entry("b.txt", EntryKind::File),
            entry("Zeta", EntryKind::Directory),
            entry("A.txt", EntryKind::File),
            entry("alpha", EntryKind::Directory),
        ];
        sort_entries(&mut items);
        let names: Vec<_> = items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["alpha", "Zeta", "A.txt", "b.txt"]);
    }

    #[tokio::test]
    async fn test_list_directory_immediate_children_only() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file1.txt"), "content").unwrap();
        fs::create_dir_all(tmp.path().join("subdir").join("deep")).unwrap();
        fs::write(tmp.path().join("subdir").join("nested.txt"), "x").unwrap();

        let items = list_directory(tmp.path()).await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].name, "subdir");
        assert_eq!(items[0].kind, EntryKind::Directory);
        assert_eq!(items[0].size, 0);
        assert_eq!(items[1].name, "file1.txt");
        assert_eq!(items[1].size, 7);
        assert_eq!(items[1].modified.len(), 19);
    }

    #[test]
    fn test_entry_serialization() {
        let json = serde_json::to_value(entry("docs", EntryKind::Directory)).unwrap();
        assert_eq!(json["type"], "directory");
        assert_eq!(json["name"], "docs");
        assert!(json.get("kind").is_none());
    }

    #[test]
    fn test_directory_stats() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("file1.txt"), "a".repeat(100)).unwrap();
        fs::write(tmp.path().join("file2.txt"), "b".repeat(200)).unwrap();
        fs::create_dir(tmp.path().join("subdir")).unwrap();
        fs::write(tmp.path().join("subdir").join("file3.txt"), "c".repeat(150)).unwrap();

        let stats = directory_stats(tmp.path());
        assert_eq!(
            stats,
            DirectoryStats {
                total_files: 3,
                total_dirs: 1,
                total_size: 450
            }
        );
    }

    #[test]
    fn test_render_root_listing() {
        let html = render_listing_html(
            "shared",
            "/",
            &[entry("subdir", EntryKind::Directory), entry("file1.txt", EntryKind::File)],
        );
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("Quick Share - shared"));
        assert!(html.contains("Download All as Zip"));
        assert!(html.contains("href=\"/subdir/\""));
        assert!(html.contains("href=\"/file1.txt\""));
        assert!(!html.contains("Go Up"));
    }

    #[test]
    fn test_render_subdirectory_listing() {
        let html = render_listing_html("shared", "/a/b", &[entry("nested.txt", EntryKind::File)]);
        assert!(html.contains("Current Path: /a/b"));
        assert!(html.contains("href=\"/a/\" class=\"btn\">Go Up"));
        assert!(html.contains("href=\"/a/b/nested.txt\""));
        assert!(html.contains("href=\"/a/b/?download=zip\""));
    }

    #[test]
    fn test_render_escapes_names() {
        let html = render_listing_html(
            "shared",
            "/",
            &[entry("<script>.txt", EntryKind::File), entry("file with spaces.txt", EntryKind::File)],
        );
        assert!(html.contains("&lt;script&gt;.txt"));
        assert!(!html.contains("<script>.txt"));
        assert!(html.contains("file with spaces.txt"));
        assert!(html.contains("href=\"/file%20with%20spaces.txt\""));
    }

    #[test]
    fn test_render_empty() {
        let html = render_listing_html("empty", "/", &[]);
        assert!(html.contains("No files or directories"));
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of("/a"), "/");
        assert_eq!(parent_of("/a/b"), "/a/");
        assert_eq!(parent_of("/a/b/"), "/a/");
    }
}
