//! 端口选择
//!
//! 探测成功的套接字直接交给服务器使用，探测与监听之间不会被别的进程抢占。

use crate::error::ShareError;
use std::net::{IpAddr, SocketAddr, TcpListener};
use std::ops::RangeInclusive;

/// 未指定端口时的探测范围
pub const PORT_RANGE: RangeInclusive<u16> = 8000..=8099;

/// 绑定监听端口
///
/// - `Some(0)`：由系统分配
/// - `Some(port)`：只尝试该端口，不可用时立即失败
/// - `None`：按升序探测 [`PORT_RANGE`]
pub fn bind_listener(addr: IpAddr, port: Option<u16>) -> Result<TcpListener, ShareError> {
    match port {
        Some(port) => TcpListener::bind(SocketAddr::new(addr, port)).map_err(|e| {
            log::debug!("Bind {}:{} failed: {}", addr, port, e);
            ShareError::PortUnavailable(port)
        }),
        None => bind_in_range(addr, PORT_RANGE),
    }
}

/// 在范围内绑定第一个可用端口
pub fn bind_in_range(addr: IpAddr, range: RangeInclusive<u16>) -> Result<TcpListener, ShareError> {
    let (start, end) = (*range.start(), *range.end());
    for port in range {
        match TcpListener::bind(SocketAddr::new(addr, port)) {
            Ok(listener) => return Ok(listener),
            Err(e) => log::debug!("Port {} unavailable: {}", port, e),
        }
    }
    Err(ShareError::NoAvailablePort { start, end })
}
