//! 局域网地址发现
//!
//! 仅用于启动信息中展示的 URL，与请求处理无关。

use std::io;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};

/// 是否为可用的局域网地址：私有地址，且不是回环或链路本地地址
pub fn is_valid_lan_ip(ip: IpAddr) -> bool {
    match ip {
        IpAddr::V4(v4) => v4.is_private() && !v4.is_loopback() && !v4.is_link_local(),
        IpAddr::V6(v6) => v6.is_unique_local(),
    }
}

/// 通过 UDP connect 获取出站路由使用的本机地址（不会真正发包）
pub fn local_ip() -> io::Result<IpAddr> {
    let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))?;
    socket.connect((Ipv4Addr::new(8, 8, 8, 8), 80))?;
    let ip = socket.local_addr()?.ip();

    if is_valid_lan_ip(ip) {
        Ok(ip)
    } else {
        Err(io::Error::other(format!("{} is not a valid LAN address", ip)))
    }
}

/// 启动信息中展示的地址
///
/// 监听具体地址时直接使用它；监听 0.0.0.0 时探测局域网地址，失败则回退到 127.0.0.1。
pub fn advertised_ip(bind_addr: IpAddr) -> IpAddr {
    if !bind_addr.is_unspecified() {
        return bind_addr;
    }

    match local_ip() {
        Ok(ip) => ip,
        Err(e) => {
            tracing::warn!("Could not determine LAN IP ({}), falling back to 127.0.0.1", e);
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ip(s: &str) -> IpAddr {
        s.parse().unwrap()
    }

    #[test]
    fn test_private_ranges_accepted() {
        for addr in ["192.168.1.100", "10.0.0.5", "172.16.0.1", "172.31.255.254", "fd00::1"] {
            assert!(is_valid_lan_ip(ip(addr)), "{addr}");
        }
    }

    #[test]
    fn test_rejected_addresses() {
        for addr in ["127.0.0.1", "169.254.1.1", "8.8.8.8", "172.32.0.1", "::1", "fe80::1"] {
            assert!(!is_valid_lan_ip(ip(addr)), "{addr}");
        }
    }

    #[test]
    fn test_explicit_bind_is_advertised() {
        assert_eq!(advertised_ip(ip("192.168.0.7")), ip("192.168.0.7"));
    }

    #[test]
    fn test_unspecified_bind_yields_usable_address() {
        let addr = advertised_ip(ip("0.0.0.0"));
        assert!(addr.is_loopback() || is_valid_lan_ip(addr));
    }
}
