//! Quickshare Core Library
//!
//! 局域网文件/目录共享服务的核心实现
//!
//! # 模块
//!
//! - **sandbox**: 请求路径解析与根目录约束
//! - **session**: 基于 Cookie 的客户端准入
//! - **archive**: 流式 ZIP 打包
//! - **listing**: 目录列表与旧版 HTML 页面
//! - **server**: HTTP 分发与服务生命周期
//!
//! # 使用示例
//!
//! ```ignore
//! use quickshare_core::{ShareConfig, ShareServer};
//!
//! let mut config = ShareConfig::new("/srv/files");
//! config.max_sessions = 3;
//!
//! let server = ShareServer::bind(config)?;
//! println!("listening on {}", server.port());
//! let handle = server.start();
//!
//! // ... Ctrl+C
//! handle.stop().await;
//! ```

pub mod archive;
pub mod config;
pub mod error;
pub mod listing;
pub mod progress;
pub mod sandbox;
pub mod server;
pub mod session;
pub mod templates;

/// 文件与 ZIP 流的读写块大小
pub const CHUNK_SIZE: usize = 8 * 1024;

/// `/api/content` 可预览的最大文件大小（含）
pub const PREVIEW_LIMIT: u64 = 1024 * 1024;

pub use archive::{ArchiveEntry, ArchiveOutcome, collect_entries, stream_zip};
pub use config::{ShareConfig, ShareMode, ShareSettings, parse_duration};
pub use error::{AccessDenied, ApiError, ShareError};
pub use listing::{DirectoryEntry, DirectoryStats, DirectoryTree, EntryKind, directory_stats};
pub use progress::{DownloadProgress, LogObserver, TransferEvent, TransferObserver};
pub use sandbox::{PathSandbox, ResolvedPath};
pub use server::{ServerHandle, ShareServer};
pub use session::{Admission, SessionRegistry};
