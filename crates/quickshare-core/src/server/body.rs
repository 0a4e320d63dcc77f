//! 流式响应体
//!
//! 文件下载用 [`ProgressStream`] 包装 `ReaderStream`；ZIP 在阻塞线程中写入
//! [`ChannelWriter`]，再由 `ReceiverStream` 交给 HTTP 层。

use crate::CHUNK_SIZE;
use crate::archive::{ArchiveOutcome, stream_zip};
use crate::progress::DownloadProgress;
use axum::body::Bytes;
use futures_util::Stream;
use std::io::{self, Write};
use std::mem;
use std::path::PathBuf;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// ZIP 通道中最多排队的块数
const ZIP_CHANNEL_CAPACITY: usize = 16;

/// 统计已发出字节数的流
///
/// 流被提前丢弃（客户端断开）时由 [`DownloadProgress`] 记为中断。
pub struct ProgressStream<S> {
    inner: S,
    progress: DownloadProgress,
}

impl<S> ProgressStream<S> {
    pub fn new(inner: S, mut progress: DownloadProgress) -> Self {
        // 空文件可能不会被轮询
        if progress.total() == Some(0) {
            progress.complete();
        }
        Self { inner, progress }
    }
}

impl<S> Stream for ProgressStream<S>
where
    S: Stream<Item = io::Result<Bytes>> + Unpin,
{
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        match Pin::new(&mut this.inner).poll_next(cx) {
            Poll::Ready(Some(Ok(chunk))) => {
                this.progress.record(chunk.len());
                // 达到 Content-Length 后 HTTP 层不一定再轮询到结尾
                if let Some(total) = this.progress.total()
                    && this.progress.transferred() >= total
                {
                    this.progress.complete();
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(Some(Err(e))) => {
                this.progress.fail(e.to_string());
                Poll::Ready(Some(Err(e)))
            }
            Poll::Ready(None) => {
                this.progress.complete();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

/// 把同步写入转为通道中的块
///
/// 接收端被丢弃后写入返回 `BrokenPipe`。
pub struct ChannelWriter {
    tx: mpsc::Sender<io::Result<Bytes>>,
    buf: Vec<u8>,
    progress: DownloadProgress,
}

impl ChannelWriter {
    pub fn new(tx: mpsc::Sender<io::Result<Bytes>>, progress: DownloadProgress) -> Self {
        Self {
            tx,
            buf: Vec::with_capacity(CHUNK_SIZE),
            progress,
        }
    }

    fn send_buffered(&mut self) -> io::Result<()> {
        let chunk = mem::replace(&mut self.buf, Vec::with_capacity(CHUNK_SIZE));
        let len = chunk.len();
        self.tx
            .blocking_send(Ok(Bytes::from(chunk)))
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "response body dropped"))?;
        self.progress.record(len);
        Ok(())
    }

    /// 写出完整归档并结束进度
    fn write_archive(mut self, shared_root: PathBuf, subtree: PathBuf) {
        let result = stream_zip(&mut self, &shared_root, &subtree);
        let result = result.and_then(|outcome| match outcome {
            ArchiveOutcome::Completed { .. } => self.flush().map(|_| outcome),
            ArchiveOutcome::Interrupted => Ok(outcome),
        });

        match result {
            Ok(ArchiveOutcome::Completed { entries, skipped }) => {
                log::debug!("Archive finished: {} entries, {} skipped", entries, skipped);
                self.progress.complete();
            }
            Ok(ArchiveOutcome::Interrupted) => self.progress.interrupt(),
            Err(e) if crate::error::is_client_disconnect(&e) => self.progress.interrupt(),
            Err(e) => {
                self.progress.fail(e.to_string());
                // 响应头已发出，只能让连接以错误结束
                let _ = self.tx.blocking_send(Err(e));
            }
        }
    }
}

impl Write for ChannelWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.extend_from_slice(data);
        if self.buf.len() >= CHUNK_SIZE {
            self.send_buffered()?;
        }
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.send_buffered()?;
        }
        Ok(())
    }
}

/// 在阻塞线程中生成 ZIP，返回响应体流
pub fn spawn_zip_stream(
    shared_root: PathBuf,
    subtree: PathBuf,
    progress: DownloadProgress,
) -> ReceiverStream<io::Result<Bytes>> {
    let (tx, rx) = mpsc::channel(ZIP_CHANNEL_CAPACITY);
    tokio::task::spawn_blocking(move || {
        ChannelWriter::new(tx, progress).write_archive(shared_root, subtree);
    });
    ReceiverStream::new(rx)
}
