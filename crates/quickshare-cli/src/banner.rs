//! 启动信息

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use quickshare_core::ShareMode;
use quickshare_core::listing::{DirectoryStats, format_file_size};
use std::net::IpAddr;
use std::time::Duration;

/// URL 路径段中保留原样的字符之外全部转义
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// 共享内容的摘要
pub enum ShareSummary {
    File { size: u64 },
    Directory(DirectoryStats),
}

pub struct Banner<'a> {
    pub ip: IpAddr,
    pub port: u16,
    pub name: &'a str,
    pub summary: ShareSummary,
    pub max_downloads: usize,
    pub timeout: Option<Duration>,
}

impl Banner<'_> {
    pub fn mode(&self) -> ShareMode {
        match self.summary {
            ShareSummary::File { .. } => ShareMode::File,
            ShareSummary::Directory(_) => ShareMode::Directory,
        }
    }

    fn base_url(&self) -> String {
        match self.ip {
            IpAddr::V6(v6) => format!("http://[{}]:{}", v6, self.port),
            IpAddr::V4(v4) => format!("http://{}:{}", v4, self.port),
        }
    }
}

pub fn format_startup_message(banner: &Banner<'_>) -> String {
    let base = banner.base_url();
    let encoded = utf8_percent_encode(banner.name, SEGMENT).to_string();
    let timeout = match banner.timeout {
        Some(t) => format!("{} seconds", t.as_secs()),
        None => "disabled".to_string(),
    };

    let mut lines = vec!["🚀 Share started!".to_string()];
    let download_url = match &banner.summary {
        ShareSummary::File { size } => {
            let url = format!("{}/{}", base, encoded);
            lines.push(format!("📄 File: {} ({})", banner.name, format_file_size(*size)));
            lines.push(format!("🔗 URL: {}", url));
            url
        }
        ShareSummary::Directory(stats) => {
            let url = format!("{}/download/{}.zip", base, encoded);
            lines.push(format!(
                "📁 Directory: {} ({} files, {} folders, {})",
                banner.name,
                stats.total_files,
                stats.total_dirs,
                format_file_size(stats.total_size)
            ));
            lines.push(format!("🔗 Browse: {}/", base));
            lines.push(format!("📦 Zip URL: {}", url));
            url
        }
    };

    lines.push(format!("👥 Max downloads: {}", banner.max_downloads));
    lines.push(format!("⏰ Timeout: {}", timeout));
    lines.push(String::new());
    lines.push("Download commands:".to_string());
    lines.push(format!("  wget {}", download_url));
    lines.push(format!("  curl -O {}", download_url));
    lines.push(String::new());
    lines.push("Press Ctrl+C to stop".to_string());

    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn banner(name: &str, summary: ShareSummary) -> Banner<'_> {
        Banner {
            ip: IpAddr::V4(Ipv4Addr::new(192, 168, 1, 10)),
            port: 8000,
            name,
            summary,
            max_downloads: 5,
            timeout: Some(Duration::from_secs(300)),
        }
    }

    #[test]
    fn test_file_banner() {
        let msg = format_startup_message(&banner("report.pdf", ShareSummary::File { size: 1536 }));
        assert!(msg.contains("File: report.pdf (1.5 KB)"));
        assert!(msg.contains("URL: http://192.168.1.10:8000/report.pdf"));
        assert!(msg.contains("wget http://192.168.1.10:8000/report.pdf"));
        assert!(msg.contains("curl -O http://192.168.1.10:8000/report.pdf"));
        assert!(msg.contains("Max downloads: 5"));
        assert!(msg.contains("Timeout: 300 seconds"));
        assert!(!msg.contains("Zip URL"));
    }

    #[test]
    fn test_directory_banner() {
        let stats = DirectoryStats {
            total_files: 3,
            total_dirs: 1,
            total_size: 450,
        };
        let b = banner("my docs", ShareSummary::Directory(stats));
        assert_eq!(b.mode(), ShareMode::Directory);

        let msg = format_startup_message(&b);
        assert!(msg.contains("Directory: my docs (3 files, 1 folders, 450 B)"));
        assert!(msg.contains("Browse: http://192.168.1.10:8000/"));
        assert!(msg.contains("Zip URL: http://192.168.1.10:8000/download/my%20docs.zip"));
    }

    #[test]
    fn test_timeout_disabled() {
        let mut b = banner("a.txt", ShareSummary::File { size: 1 });
        b.timeout = None;
        assert!(format_startup_message(&b).contains("Timeout: disabled"));
    }
}
