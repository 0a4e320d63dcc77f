//! 错误类型
//!
//! 所有对外暴露的失败都归入 [`ShareError`]，每个变体对应一个固定的 HTTP 状态码
//! 和不泄露内部细节的公开消息。原始 I/O 错误文本只写入日志。

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::io;

/// 沙箱拒绝访问
///
/// 不携带任何信息：穿越、越界、不存在都是同一个结果。
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("access denied")]
pub struct AccessDenied;

/// 共享服务错误
#[derive(Debug, thiserror::Error)]
pub enum ShareError {
    #[error("Access denied")]
    AccessDenied,

    #[error("Not found")]
    NotFound,

    #[error("Bad request: {0}")]
    BadRequest(&'static str),

    #[error("File too large for preview: {size} > {limit} bytes")]
    PreviewTooLarge { size: u64, limit: u64 },

    #[error("Binary file cannot be previewed")]
    BinaryContent,

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Port {0} is not available")]
    PortUnavailable(u16),

    #[error("No available ports found in range {start}-{end}")]
    NoAvailablePort { start: u16, end: u16 },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl From<AccessDenied> for ShareError {
    fn from(_: AccessDenied) -> Self {
        ShareError::AccessDenied
    }
}

impl ShareError {
    /// 对应的 HTTP 状态码
    pub fn status(&self) -> StatusCode {
        match self {
            ShareError::AccessDenied => StatusCode::FORBIDDEN,
            ShareError::NotFound => StatusCode::NOT_FOUND,
            ShareError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ShareError::PreviewTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ShareError::BinaryContent => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ShareError::Io(e) if e.kind() == io::ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ShareError::Io(_)
            | ShareError::PortUnavailable(_)
            | ShareError::NoAvailablePort { .. }
            | ShareError::InvalidConfig(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 返回给客户端的消息
    ///
    /// 与 `Display` 不同，这里永远不包含路径、大小或底层错误文本。
    pub fn public_message(&self) -> &'static str {
        match self {
            ShareError::AccessDenied => "Access denied",
            ShareError::NotFound => "Not found",
            ShareError::BadRequest(msg) => *msg,
            ShareError::PreviewTooLarge { .. } => "File too large for preview",
            ShareError::BinaryContent => "Binary file cannot be previewed",
            ShareError::Io(e) if e.kind() == io::ErrorKind::NotFound => "Not found",
            _ => "Internal server error",
        }
    }

    fn log_if_internal(&self) {
        if self.status().is_server_error() {
            log::error!("Request failed: {}", self);
        }
    }
}

impl IntoResponse for ShareError {
    fn into_response(self) -> Response {
        self.log_if_internal();
        let status = self.status();
        let body = format!("{} {}", status.as_u16(), self.public_message());
        (status, body).into_response()
    }
}

/// JSON API 错误
///
/// 响应体统一为 `{"error": <message>, "status": <code>}`，状态码与状态行一致。
#[derive(Debug)]
pub struct ApiError(pub ShareError);

impl From<ShareError> for ApiError {
    fn from(err: ShareError) -> Self {
        ApiError(err)
    }
}

impl From<AccessDenied> for ApiError {
    fn from(_: AccessDenied) -> Self {
        ApiError(ShareError::AccessDenied)
    }
}

impl From<io::Error> for ApiError {
    fn from(err: io::Error) -> Self {
        ApiError(ShareError::Io(err))
    }
}

impl ApiError {
    pub fn not_found_endpoint() -> Response {
        api_error_body(StatusCode::NOT_FOUND, "API Endpoint Not Found")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        self.0.log_if_internal();
        api_error_body(self.0.status(), self.0.public_message())
    }
}

fn api_error_body(status: StatusCode, message: &str) -> Response {
    let body = serde_json::json!({
        "error": message,
        "status": status.as_u16(),
    });
    (status, axum::Json(body)).into_response()
}

/// 是否为客户端断开（写入端 broken pipe / reset）
///
/// 这是长时间下载的常态，不应按错误处理。
pub fn is_client_disconnect(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::BrokenPipe
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ShareError::AccessDenied.status(), StatusCode::FORBIDDEN);
        assert_eq!(
            ShareError::PreviewTooLarge { size: 2, limit: 1 }.status(),
            StatusCode::PAYLOAD_TOO_LARGE
        );
        assert_eq!(
            ShareError::BinaryContent.status(),
            StatusCode::UNSUPPORTED_MEDIA_TYPE
        );
        assert_eq!(
            ShareError::Io(io::Error::new(io::ErrorKind::NotFound, "gone")).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ShareError::Io(io::Error::other("disk on fire")).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_public_message_hides_details() {
        let err = ShareError::Io(io::Error::other("/secret/path exploded"));
        assert_eq!(err.public_message(), "Internal server error");

        let err = ShareError::PreviewTooLarge {
            size: 5_000_000,
            limit: 1_048_576,
        };
        assert!(!err.public_message().contains("5000000"));
    }

    #[test]
    fn test_client_disconnect_kinds() {
        assert!(is_client_disconnect(&io::Error::new(io::ErrorKind::BrokenPipe, "x")));
        assert!(is_client_disconnect(&io::Error::new(io::ErrorKind::ConnectionReset, "x")));
        assert!(!is_client_disconnect(&io::Error::other("x")));
    }

    #[test]
    fn test_access_denied_conversion() {
        let err: ShareError = AccessDenied.into();
        assert!(matches!(err, ShareError::AccessDenied));
    }
}
