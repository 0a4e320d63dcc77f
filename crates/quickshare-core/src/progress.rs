//! 下载进度事件
//!
//! 每个连接独立计数，只用于观测，从不影响响应内容。

use crate::listing::format_file_size;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// 每多少个块发出一次进度事件（8 KiB 块时约 80 KiB）
pub const PROGRESS_EVERY_CHUNKS: u64 = 10;

/// 传输事件
#[derive(Debug, Clone, PartialEq)]
pub enum TransferEvent {
    Started {
        at: SystemTime,
        client_ip: String,
        name: String,
        total: Option<u64>,
    },
    Progress {
        at: SystemTime,
        client_ip: String,
        name: String,
        transferred: u64,
        total: Option<u64>,
    },
    Completed {
        at: SystemTime,
        client_ip: String,
        name: String,
        transferred: u64,
        elapsed: Duration,
    },
    /// 客户端中途断开
    Interrupted {
        at: SystemTime,
        client_ip: String,
        name: String,
        transferred: u64,
    },
    Failed {
        at: SystemTime,
        client_ip: String,
        name: String,
        transferred: u64,
        message: String,
    },
}

/// 传输事件接收方
pub trait TransferObserver: Send + Sync {
    fn on_event(&self, event: &TransferEvent);
}

/// 把事件写入日志的默认实现
#[derive(Debug, Default, Clone, Copy)]
pub struct LogObserver;

impl TransferObserver for LogObserver {
    fn on_event(&self, event: &TransferEvent) {
        match event {
            TransferEvent::Started {
                client_ip,
                name,
                total,
                ..
            } => match total {
                Some(total) => log::info!(
                    "⬇️  {} started downloading {} ({})",
                    client_ip,
                    name,
                    format_file_size(*total)
                ),
                None => log::info!("⬇️  {} started downloading {}", client_ip, name),
            },
            TransferEvent::Progress {
                client_ip,
                name,
                transferred,
                total,
                ..
            } => match total {
                Some(total) if *total > 0 => log::debug!(
                    "   {} {}: {} / {} ({:.0}%)",
                    client_ip,
                    name,
                    format_file_size(*transferred),
                    format_file_size(*total),
                    *transferred as f64 * 100.0 / *total as f64
                ),
                _ => log::debug!(
                    "   {} {}: {}",
                    client_ip,
                    name,
                    format_file_size(*transferred)
                ),
            },
            TransferEvent::Completed {
                client_ip,
                name,
                transferred,
                elapsed,
                ..
            } => log::info!(
                "✅ {} completed {} ({}) in {:.1}s",
                client_ip,
                name,
                format_file_size(*transferred),
                elapsed.as_secs_f64()
            ),
            TransferEvent::Interrupted {
                client_ip,
                name,
                transferred,
                ..
            } => log::warn!(
                "⚠️  {} interrupted {} after {}",
                client_ip,
                name,
                format_file_size(*transferred)
            ),
            TransferEvent::Failed {
                client_ip,
                name,
                transferred,
                message,
                ..
            } => log::error!(
                "❌ {} failed {} after {}: {}",
                client_ip,
                name,
                format_file_size(*transferred),
                message
            ),
        }
    }
}

/// 单次传输的进度
///
/// 未显式结束就被丢弃时视为中断。
pub struct DownloadProgress {
    observer: Arc<dyn TransferObserver>,
    client_ip: String,
    name: String,
    total: Option<u64>,
    transferred: u64,
    chunks: u64,
    started: Instant,
    finished: bool,
}

impl DownloadProgress {
    /// 创建并立即发出 `Started`
    pub fn start(
        observer: Arc<dyn TransferObserver>,
        client_ip: impl Into<String>,
        name: impl Into<String>,
        total: Option<u64>,
    ) -> Self {
        let progress = Self {
            observer,
            client_ip: client_ip.into(),
            name: name.into(),
            total,
            transferred: 0,
            chunks: 0,
            started: Instant::now(),
            finished: false,
        };
        progress.observer.on_event(&TransferEvent::Started {
            at: SystemTime::now(),
            client_ip: progress.client_ip.clone(),
            name: progress.name.clone(),
            total,
        });
        progress
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    pub fn total(&self) -> Option<u64> {
        self.total
    }

    /// 记录一个已写出的块
    pub fn record(&mut self, bytes: usize) {
        self.transferred += bytes as u64;
        self.chunks += 1;
        if self.chunks % PROGRESS_EVERY_CHUNKS == 0 {
            self.observer.on_event(&TransferEvent::Progress {
                at: SystemTime::now(),
                client_ip: self.client_ip.clone(),
                name: self.name.clone(),
                transferred: self.transferred,
                total: self.total,
            });
        }
    }

    pub fn complete(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.observer.on_event(&TransferEvent::Completed {
            at: SystemTime::now(),
            client_ip: self.client_ip.clone(),
            name: self.name.clone(),
            transferred: self.transferred,
            elapsed: self.started.elapsed(),
        });
    }

    pub fn interrupt(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.observer.on_event(&TransferEvent::Interrupted {
            at: SystemTime::now(),
            client_ip: self.client_ip.clone(),
            name: self.name.clone(),
            transferred: self.transferred,
        });
    }

    pub fn fail(&mut self, message: impl Into<String>) {
        if self.finished {
            return;
        }
        self.finished = true;
        self.observer.on_event(&TransferEvent::Failed {
            at: SystemTime::now(),
            client_ip: self.client_ip.clone(),
            name: self.name.clone(),
            transferred: self.transferred,
            message: message.into(),
        });
    }
}

impl Drop for DownloadProgress {
    fn drop(&mut self) {
        self.interrupt();
    }
}

/// 记录所有事件，测试用
#[cfg(test)]
#[derive(Default)]
pub(crate) struct RecordingObserver {
    events: std::sync::Mutex<Vec<TransferEvent>>,
}

#[cfg(test)]
impl RecordingObserver {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<TransferEvent> {
        self.events
            .lock()
            .map(|events| events.clone())
            .unwrap_or_default()
    }
}

#[cfg(test)]
impl TransferObserver for RecordingObserver {
    fn on_event(&self, event: &TransferEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
