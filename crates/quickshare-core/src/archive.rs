//! 流式 ZIP 打包
//!
//! 遍历子树并把每个普通文件写入 ZIP 流，整个归档不会在内存或磁盘上完整生成。
//! 条目名称总是相对共享根目录，因此无论从哪个子目录发起打包，目录结构都保持一致。
//!
//! 单个文件打不开或读取失败只跳过该文件；输出端断开则立即停止并返回
//! [`ArchiveOutcome::Interrupted`]，不作为错误向上传播。

use crate::CHUNK_SIZE;
use crate::error::is_client_disconnect;
use std::fs::File;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

/// 超过该大小的条目启用 ZIP64
const ZIP64_THRESHOLD: u64 = u32::MAX as u64;

/// 归档条目：源文件与归档内名称
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub source: PathBuf,
    pub name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveOutcome {
    Completed { entries: usize, skipped: usize },
    /// 输出端已断开
    Interrupted,
}

/// 收集子树下的所有普通文件
///
/// 符号链接只有在目标是根目录内的普通文件时才收录；不进入符号链接目录。
pub fn collect_entries(shared_root: &Path, subtree: &Path) -> io::Result<Vec<ArchiveEntry>> {
    let root = shared_root.canonicalize()?;
    let subtree = subtree.canonicalize()?;

    let mut entries = Vec::new();
    for entry in WalkDir::new(&subtree).follow_links(false).sort_by_file_name() {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                log::debug!("Skipping unreadable entry: {}", e);
                continue;
            }
        };

        let file_type = entry.file_type();
        let source = if file_type.is_file() {
            entry.path().to_path_buf()
        } else if file_type.is_symlink() {
            match entry.path().canonicalize() {
                Ok(target) if target.starts_with(&root) && target.is_file() => target,
                _ => {
                    log::debug!("Skipping symlink {:?}", entry.path());
                    continue;
                }
            }
        } else {
            continue;
        };

        let Ok(relative) = entry.path().strip_prefix(&root) else {
            continue;
        };
        let name = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        entries.push(ArchiveEntry { source, name });
    }

    Ok(entries)
}

/// 把子树写为 ZIP 流
///
/// `output` 只需实现 `Write`；调用方负责在返回后刷新它。
pub fn stream_zip<W: Write>(
    output: &mut W,
    shared_root: &Path,
    subtree: &Path,
) -> io::Result<ArchiveOutcome> {
    let entries = collect_entries(shared_root, subtree)?;
    let mut zip = ZipWriter::new_stream(output);
    let mut added = 0;
    let mut skipped = 0;

    for entry in entries {
        let mut file = match File::open(&entry.source) {
            Ok(f) => f,
            Err(e) => {
                log::debug!("Skipping {:?}: {}", entry.source, e);
                skipped += 1;
                continue;
            }
        };
        let len = file.metadata().map(|m| m.len()).unwrap_or(0);

        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(len >= ZIP64_THRESHOLD);

        if let Err(e) = zip.start_file(entry.name.as_str(), options) {
            return write_failure(zip_to_io(e));
        }

        match copy_entry(&mut file, &mut zip) {
            Ok(()) => added += 1,
            Err(CopyError::Read(e)) => {
                // 条目已开始写入，只能截断后继续下一个文件
                log::warn!("Read failed for {:?}, entry truncated: {}", entry.source, e);
                skipped += 1;
            }
            Err(CopyError::Write(e)) => return write_failure(e),
        }
    }

    if let Err(e) = zip.finish() {
        return write_failure(zip_to_io(e));
    }

    Ok(ArchiveOutcome::Completed {
        entries: added,
        skipped,
    })
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

fn copy_entry<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<(), CopyError> {
    let mut buf = vec![0u8; CHUNK_SIZE];
    loop {
        let n = match reader.read(&mut buf) {
            Ok(0) => return Ok(()),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(CopyError::Read(e)),
        };
        writer.write_all(&buf[..n]).map_err(CopyError::Write)?;
    }
}

fn write_failure(err: io::Error) -> io::Result<ArchiveOutcome> {
    if is_client_disconnect(&err) {
        Ok(ArchiveOutcome::Interrupted)
    } else {
        Err(err)
    }
}

fn zip_to_io(err: zip::result::ZipError) -> io::Error {
    match err {
        zip::result::ZipError::Io(e) => e,
        other => io::Error::other(other),
    }
}
