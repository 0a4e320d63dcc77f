//! 共享配置与持久化默认值
//!
//! [`ShareConfig`] 在服务器构造前一次性生成并校验，之后只读；
//! [`ShareSettings`] 保存在配置目录中，为命令行参数提供默认值。

use crate::error::ShareError;
use crate::session::DEFAULT_COOKIE_NAME;
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_MAX_DOWNLOADS: usize = 10;
pub const DEFAULT_TIMEOUT: &str = "5m";

/// 共享模式，由共享路径的类型决定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareMode {
    File,
    Directory,
}

/// 服务器配置
#[derive(Debug, Clone)]
pub struct ShareConfig {
    /// 共享的文件或目录
    pub path: PathBuf,
    /// 指定端口；`None` 时在 8000-8099 中自动选择
    pub port: Option<u16>,
    /// 自动关闭时间；`None` 表示不自动关闭
    pub timeout: Option<Duration>,
    /// 最多允许的不同客户端数
    pub max_sessions: usize,
    /// 使用服务端渲染的目录页面
    pub legacy: bool,
    pub bind_addr: IpAddr,
    pub cookie_name: String,
}

impl ShareConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            port: None,
            timeout: parse_duration(DEFAULT_TIMEOUT).ok(),
            max_sessions: DEFAULT_MAX_DOWNLOADS,
            legacy: false,
            bind_addr: IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            cookie_name: DEFAULT_COOKIE_NAME.to_string(),
        }
    }

    /// 校验配置并返回共享模式
    pub fn validate(&self) -> Result<ShareMode, ShareError> {
        if self.max_sessions == 0 {
            return Err(ShareError::InvalidConfig(
                "max_downloads must be a positive integer".to_string(),
            ));
        }
        if self.cookie_name.is_empty()
            || !self
                .cookie_name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
        {
            return Err(ShareError::InvalidConfig(format!(
                "invalid cookie name: {:?}",
                self.cookie_name
            )));
        }

        let metadata = fs::metadata(&self.path).map_err(|e| {
            ShareError::InvalidConfig(format!("cannot access {}: {}", self.path.display(), e))
        })?;

        if metadata.is_dir() {
            Ok(ShareMode::Directory)
        } else if metadata.is_file() {
            Ok(ShareMode::File)
        } else {
            Err(ShareError::InvalidConfig(format!(
                "{} is neither a file nor a directory",
                self.path.display()
            )))
        }
    }
}

/// 持久化的默认设置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShareSettings {
    /// 默认端口
    pub port: Option<u16>,
    /// 默认最大下载（会话）数
    pub max_downloads: usize,
    /// 默认超时，格式同 `--timeout`
    pub timeout: String,
    /// 默认使用旧版目录页面
    pub legacy: bool,
}

impl Default for ShareSettings {
    fn default() -> Self {
        Self {
            port: None,
            max_downloads: DEFAULT_MAX_DOWNLOADS,
            timeout: DEFAULT_TIMEOUT.to_string(),
            legacy: false,
        }
    }
}

impl ShareSettings {
    /// 获取配置文件路径
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("quickshare");
        config_dir.join("settings.toml")
    }

    /// 加载设置（如果文件不存在则使用默认值）
    pub fn load() -> Self {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &std::path::Path) -> Self {
        if path.exists() {
            match fs::read_to_string(path) {
                Ok(content) => match toml::from_str(&content) {
                    Ok(settings) => {
                        debug!("Loaded settings from {:?}", path);
                        return settings;
                    }
                    Err(e) => {
                        log::warn!("Failed to parse settings: {}, using defaults", e);
                    }
                },
                Err(e) => {
                    log::warn!("Failed to read settings file: {}, using defaults", e);
                }
            }
        }
        Self::default()
    }

    /// 保存设置
    pub fn save(&self) -> anyhow::Result<PathBuf> {
        let path = Self::config_path();
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &std::path::Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        debug!("Saved settings to {:?}", path);
        Ok(())
    }
}

/// 解析时长字符串：`30s`、`5m`、`1h`、`1d` 或 `0`
pub fn parse_duration(input: &str) -> Result<Duration, ShareError> {
    let clean = input.trim();
    if clean.is_empty() {
        return Err(invalid_duration("duration string cannot be empty"));
    }
    if clean == "0" {
        return Ok(Duration::ZERO);
    }
    if clean.starts_with('-') {
        return Err(invalid_duration("duration cannot be negative"));
    }

    // 单位按字符切分，多字节结尾不会落在字符中间
    let Some((split, unit)) = clean.char_indices().last() else {
        return Err(invalid_duration("duration string cannot be empty"));
    };
    let value = &clean[..split];
    if value.is_empty() || !value.chars().all(|c| c.is_ascii_digit()) {
        return Err(invalid_duration(
            "timeout must be in format <number><unit> (e.g., 30s, 5m, 1h)",
        ));
    }

    let multiplier = match unit.to_ascii_lowercase() {
        's' => 1,
        'm' => 60,
        'h' => 3600,
        'd' => 86_400,
        _ => return Err(invalid_duration("timeout unit must be 's', 'm', 'h' or 'd'")),
    };

    let value: u64 = value
        .parse()
        .map_err(|_| invalid_duration("timeout value is too large"))?;
    value
        .checked_mul(multiplier)
        .map(Duration::from_secs)
        .ok_or_else(|| invalid_duration("timeout value is too large"))
}

fn invalid_duration(msg: &str) -> ShareError {
    ShareError::InvalidConfig(msg.to_string())
}
