//! 请求处理器
//!
//! 所有路径都先经过沙箱解析再访问文件系统；响应头一旦发出，后续错误只能
//! 通过中断连接体现。

use super::SharedState;
use super::admission::ClientIp;
use super::body::{ProgressStream, spawn_zip_stream};
use super::route::{ApiEndpoint, Route, ZipTarget};
use crate::config::ShareMode;
use crate::error::{ApiError, ShareError};
use crate::listing::{DirectoryTree, list_directory, render_listing_html};
use crate::progress::DownloadProgress;
use crate::sandbox::ResolvedPath;
use crate::templates::render_shell;
use crate::{CHUNK_SIZE, PREVIEW_LIMIT};
use axum::Json;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::header::{ALLOW, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE};
use axum::http::{HeaderValue, Method, StatusCode, Uri};
use axum::response::{Html, IntoResponse, Response};
use percent_encoding::{NON_ALPHANUMERIC, utf8_percent_encode};
use serde::Serialize;
use tokio::fs::File;
use tokio::io::AsyncReadExt;
use tokio_util::io::ReaderStream;

/// `/api/content` 的响应体
#[derive(Debug, Serialize)]
pub struct FileContent {
    pub path: String,
    pub content: String,
    pub size: u64,
    pub encoding: &'static str,
    #[serde(rename = "type")]
    pub mime_type: String,
}

/// 所有请求的入口
pub async fn dispatch(State(state): State<SharedState>, req: Request) -> Response {
    if req.method() != Method::GET {
        return (
            StatusCode::METHOD_NOT_ALLOWED,
            [(ALLOW, "GET")],
            "405 Method not allowed",
        )
            .into_response();
    }

    let client_ip = req
        .extensions()
        .get::<ClientIp>()
        .map(|ip| ip.0.clone())
        .unwrap_or_else(|| "unknown".to_string());
    let uri = req.uri().clone();

    // 单文件共享只有下载这一种路由
    if state.mode == ShareMode::File {
        return serve_path(&state, &client_ip, uri.path()).await;
    }

    match Route::classify(uri.path(), uri.query()) {
        Route::Api(ApiEndpoint::Tree) => api_tree(&state, &uri).await.into_response(),
        Route::Api(ApiEndpoint::Content) => api_content(&state, &uri).await.into_response(),
        Route::Api(ApiEndpoint::Unknown) => ApiError::not_found_endpoint(),
        Route::Zip(target) => serve_zip(&state, &client_ip, target, uri.path()).await,
        Route::Path => serve_path(&state, &client_ip, uri.path()).await,
    }
}

async fn serve_path(state: &SharedState, client_ip: &str, path: &str) -> Response {
    let resolved = match state.sandbox.resolve(path) {
        Ok(resolved) => resolved,
        Err(_) if state.sandbox.is_missing_allowed_file(path) => {
            log::debug!("Shared file {} is gone", path);
            return ShareError::NotFound.into_response();
        }
        Err(denied) => {
            log::debug!("Denied {} for {}", path, client_ip);
            return ShareError::from(denied).into_response();
        }
    };

    let metadata = match tokio::fs::metadata(resolved.as_path()).await {
        Ok(m) => m,
        Err(e) => return ShareError::Io(e).into_response(),
    };

    if metadata.is_file() {
        serve_file(state, client_ip, resolved, metadata.len()).await
    } else if metadata.is_dir() && state.mode == ShareMode::Directory {
        serve_directory(state, &resolved).await
    } else {
        ShareError::AccessDenied.into_response()
    }
}

async fn serve_file(
    state: &SharedState,
    client_ip: &str,
    resolved: ResolvedPath,
    len: u64,
) -> Response {
    let name = resolved.file_name();
    let file = match File::open(resolved.as_path()).await {
        Ok(f) => f,
        Err(e) => return ShareError::Io(e).into_response(),
    };

    let progress = DownloadProgress::start(state.observer.clone(), client_ip, name.as_str(), Some(len));
    let stream = ProgressStream::new(ReaderStream::with_capacity(file, CHUNK_SIZE), progress);

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/octet-stream")),
            (CONTENT_DISPOSITION, content_disposition(&name)),
            (CONTENT_LENGTH, HeaderValue::from(len)),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

async fn serve_directory(state: &SharedState, resolved: &ResolvedPath) -> Response {
    if !state.legacy {
        return Html(render_shell(&state.share_name)).into_response();
    }

    match list_directory(resolved.as_path()).await {
        Ok(items) => Html(render_listing_html(
            &state.share_name,
            &resolved.relative_display(),
            &items,
        ))
        .into_response(),
        Err(e) => ShareError::Io(e).into_response(),
    }
}

async fn serve_zip(state: &SharedState, client_ip: &str, target: ZipTarget, path: &str) -> Response {
    let request_path = match target {
        ZipTarget::ShareRoot => "/",
        ZipTarget::RequestPath => path,
    };
    // 先完成沙箱判断，拒绝时不发出任何 ZIP 响应头
    let resolved = match state.sandbox.resolve_directory_request(request_path) {
        Ok(resolved) => resolved,
        Err(denied) => return ShareError::from(denied).into_response(),
    };

    let archive_name = format!("{}.zip", state.share_name);
    let shared_root = resolved.root().to_path_buf();
    let subtree = resolved.into_path_buf();

    let progress = DownloadProgress::start(state.observer.clone(), client_ip, archive_name.as_str(), None);
    let stream = spawn_zip_stream(shared_root, subtree, progress);

    (
        [
            (CONTENT_TYPE, HeaderValue::from_static("application/zip")),
            (CONTENT_DISPOSITION, content_disposition(&archive_name)),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

/// 取出原始的 `path=` 参数值
///
/// 不在这里解码：解码只由沙箱完成，否则文件名中的 `%XX` 会被多解一轮。
fn api_path(uri: &Uri) -> Result<&str, ShareError> {
    uri.query()
        .unwrap_or_default()
        .split('&')
        .find_map(|pair| pair.strip_prefix("path="))
        .filter(|p| !p.is_empty())
        .ok_or(ShareError::BadRequest("Missing path parameter"))
}

async fn api_tree(state: &SharedState, uri: &Uri) -> Result<Json<DirectoryTree>, ApiError> {
    let path = api_path(uri)?;
    let resolved = state.sandbox.resolve_directory_request(path)?;

    let metadata = tokio::fs::metadata(resolved.as_path()).await?;
    if !metadata.is_dir() {
        return Err(ShareError::BadRequest("Path is not a directory").into());
    }

    let items = list_directory(resolved.as_path()).await?;
    Ok(Json(DirectoryTree {
        path: resolved.relative_display(),
        items,
    }))
}

async fn api_content(state: &SharedState, uri: &Uri) -> Result<Json<FileContent>, ApiError> {
    let path = api_path(uri)?;
    let resolved = state.sandbox.resolve_directory_request(path)?;

    let metadata = tokio::fs::metadata(resolved.as_path()).await?;
    if !metadata.is_file() {
        return Err(ShareError::BadRequest("Path is not a file").into());
    }
    if metadata.len() > PREVIEW_LIMIT {
        return Err(ShareError::PreviewTooLarge {
            size: metadata.len(),
            limit: PREVIEW_LIMIT,
        }
        .into());
    }

    // 最多多读一个字节，足以发现检查之后被追加的文件
    let mut bytes = Vec::with_capacity(metadata.len() as usize);
    File::open(resolved.as_path())
        .await?
        .take(PREVIEW_LIMIT + 1)
        .read_to_end(&mut bytes)
        .await?;
    let size = bytes.len() as u64;
    if size > PREVIEW_LIMIT {
        return Err(ShareError::PreviewTooLarge {
            size,
            limit: PREVIEW_LIMIT,
        }
        .into());
    }
    let content = String::from_utf8(bytes).map_err(|_| ShareError::BinaryContent)?;

    let mime_type = mime_guess::from_path(resolved.as_path())
        .first_raw()
        .unwrap_or("text/plain")
        .to_string();

    Ok(Json(FileContent {
        path: resolved.relative_display(),
        content,
        size,
        encoding: "utf-8",
        mime_type,
    }))
}

/// `attachment; filename="..."`，非 ASCII 文件名追加 RFC 5987 `filename*`
pub fn content_disposition(name: &str) -> HeaderValue {
    let fallback: String = name
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii() && !c.is_ascii_control() => c,
            _ => '_',
        })
        .collect();

    let value = if name.is_ascii() && fallback == name {
        format!("attachment; filename=\"{}\"", fallback)
    } else {
        format!(
            "attachment; filename=\"{}\"; filename*=UTF-8''{}",
            fallback,
            utf8_percent_encode(name, NON_ALPHANUMERIC)
        )
    };

    HeaderValue::from_str(&value).unwrap_or_else(|_| HeaderValue::from_static("attachment"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_disposition_ascii() {
        assert_eq!(
            content_disposition("report.pdf"),
            "attachment; filename=\"report.pdf\""
        );
    }

    #[test]
    fn test_content_disposition_non_ascii() {
        let value = content_disposition("报告.txt");
        let value = value.to_str().unwrap();
        assert!(value.starts_with("attachment; filename=\"__.txt\"; filename*=UTF-8''"));
        assert!(value.ends_with("%E6%8A%A5%E5%91%8A%2Etxt"));
    }

    #[test]
    fn test_content_disposition_quotes_replaced() {
        let value = content_disposition("a\"b.txt");
        assert!(value.to_str().unwrap().starts_with("attachment; filename=\"a_b.txt\""));
    }
}
