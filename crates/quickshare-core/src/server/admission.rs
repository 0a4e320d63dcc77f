//! 会话准入中间件
//!
//! 在任何路径解析或文件读取之前执行；被拒绝的请求直接返回 403。

use super::SharedState;
use crate::error::ShareError;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::HeaderValue;
use axum::http::header::{COOKIE, SET_COOKIE, USER_AGENT};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::net::SocketAddr;

/// 请求方 IP，由准入中间件写入请求扩展
#[derive(Debug, Clone)]
pub struct ClientIp(pub String);

pub async fn admit(State(state): State<SharedState>, mut req: Request, next: Next) -> Response {
    let client_ip = req
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "unknown".to_string());

    let cookies = req
        .headers()
        .get_all(COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .collect::<Vec<_>>()
        .join("; ");
    let user_agent = req
        .headers()
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    let admission = state
        .sessions
        .admit(Some(cookies.as_str()), &client_ip, user_agent);
    if !admission.is_allowed() {
        return ShareError::AccessDenied.into_response();
    }

    req.extensions_mut().insert(ClientIp(client_ip));
    let mut response = next.run(req).await;

    if let Some(token) = admission.new_token() {
        match HeaderValue::from_str(&state.sessions.set_cookie_value(token)) {
            Ok(value) => {
                response.headers_mut().append(SET_COOKIE, value);
            }
            Err(e) => log::error!("Invalid session cookie: {}", e),
        }
    }

    response
}
