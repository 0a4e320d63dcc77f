//! 会话登记
//!
//! 通过 Cookie 识别客户端，并限制同时存在的不同客户端数量。
//! 已登记的令牌永远放行；只有新令牌的准入受上限约束。
//! 会话不会过期，总数随进程生命周期单调增长直到上限。

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};
use std::time::SystemTime;

/// 默认 Cookie 名称
pub const DEFAULT_COOKIE_NAME: &str = "quickshare_session";

/// 已准入的客户端
#[derive(Debug, Clone)]
pub struct Session {
    pub client_ip: String,
    pub created_at: SystemTime,
    pub user_agent: String,
}

/// 准入结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    /// 已有会话，令牌沿用
    Existing(String),
    /// 新建会话，调用方需要下发 Set-Cookie
    Created(String),
    /// 已达上限
    Denied,
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        !matches!(self, Admission::Denied)
    }

    pub fn token(&self) -> Option<&str> {
        match self {
            Admission::Existing(t) | Admission::Created(t) => Some(t),
            Admission::Denied => None,
        }
    }

    /// 仅在新建会话时返回令牌
    pub fn new_token(&self) -> Option<&str> {
        match self {
            Admission::Created(t) => Some(t),
            _ => None,
        }
    }
}

/// 会话表
pub struct SessionRegistry {
    cookie_name: String,
    max_sessions: usize,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionRegistry {
    pub fn new(cookie_name: impl Into<String>, max_sessions: usize) -> Self {
        Self {
            cookie_name: cookie_name.into(),
            max_sessions,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    pub fn cookie_name(&self) -> &str {
        &self.cookie_name
    }

    pub fn max_sessions(&self) -> usize {
        self.max_sessions
    }

    pub fn len(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 准入判断
    ///
    /// 查找、计数、插入在同一把锁内完成，两个并发的新客户端不会同时看到
    /// 有空位而一起插入。
    pub fn admit(&self, cookie_header: Option<&str>, client_ip: &str, user_agent: &str) -> Admission {
        let presented = cookie_header.and_then(|h| parse_cookie(h, &self.cookie_name));

        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(token) = presented
            && sessions.contains_key(token)
        {
            return Admission::Existing(token.to_string());
        }

        if sessions.len() >= self.max_sessions {
            log::warn!(
                "Session limit reached ({}/{}), rejecting {}",
                sessions.len(),
                self.max_sessions,
                client_ip
            );
            return Admission::Denied;
        }

        let token = uuid::Uuid::new_v4().simple().to_string();
        sessions.insert(
            token.clone(),
            Session {
                client_ip: client_ip.to_string(),
                created_at: SystemTime::now(),
                user_agent: user_agent.to_string(),
            },
        );
        log::info!(
            "New session for {} ({}/{})",
            client_ip,
            sessions.len(),
            self.max_sessions
        );

        Admission::Created(token)
    }

    /// 新令牌对应的 Set-Cookie 值
    pub fn set_cookie_value(&self, token: &str) -> String {
        format!("{}={}; Path=/; HttpOnly", self.cookie_name, token)
    }
}

/// 从 Cookie 头中取出指定名称的值
pub fn parse_cookie<'a>(header: &'a str, name: &str) -> Option<&'a str> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| key.trim() == name)
        .map(|(_, value)| value.trim().trim_matches('"'))
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn cookie(registry: &SessionRegistry, token: &str) -> String {
        format!("other=1; {}={}", registry.cookie_name(), token)
    }

    #[test]
    fn test_parse_cookie() {
        assert_eq!(parse_cookie("a=1; sid=abc; b=2", "sid"), Some("abc"));
        assert_eq!(parse_cookie("sid=\"abc\"", "sid"), Some("abc"));
        assert_eq!(parse_cookie("sidx=abc", "sid"), None);
        assert_eq!(parse_cookie("sid=", "sid"), None);
        assert_eq!(parse_cookie("", "sid"), None);
    }

    #[test]
    fn test_new_client_gets_token() {
        let registry = SessionRegistry::new(DEFAULT_COOKIE_NAME, 2);
        let admission = registry.admit(None, "10.0.0.2", "curl/8");
        assert!(admission.is_allowed());
        assert!(admission.new_token().is_some());
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_existing_token_is_idempotent() {
        let registry = SessionRegistry::new(DEFAULT_COOKIE_NAME, 1);
        let token = registry
            .admit(None, "10.0.0.2", "curl/8")
            .token()
            .unwrap()
            .to_string();
        let header = cookie(&registry, &token);

        for _ in 0..10 {
            let admission = registry.admit(Some(&header), "10.0.0.2", "curl/8");
            assert_eq!(admission, Admission::Existing(token.clone()));
        }
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_cap_enforced_and_existing_grandfathered() {
        let registry = SessionRegistry::new(DEFAULT_COOKIE_NAME, 2);
        let a = registry.admit(None, "10.0.0.2", "a").token().unwrap().to_string();
        let b = registry.admit(None, "10.0.0.3", "b").token().unwrap().to_string();

        assert_eq!(registry.admit(None, "10.0.0.4", "c"), Admission::Denied);
        // 未知令牌同样算新客户端
        assert_eq!(
            registry.admit(Some(&cookie(&registry, "forged")), "10.0.0.4", "c"),
            Admission::Denied
        );

        assert!(registry.admit(Some(&cookie(&registry, &a)), "10.0.0.2", "a").is_allowed());
        assert!(registry.admit(Some(&cookie(&registry, &b)), "10.0.0.3", "b").is_allowed());
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_concurrent_admission_never_exceeds_cap() {
        let registry = Arc::new(SessionRegistry::new(DEFAULT_COOKIE_NAME, 4));

        let handles: Vec<_> = (0..32)
            .map(|i| {
                let registry = registry.clone();
                thread::spawn(move || registry.admit(None, &format!("10.0.0.{i}"), "t").is_allowed())
            })
            .collect();

        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|allowed| *allowed)
            .count();

        assert_eq!(admitted, 4);
        assert_eq!(registry.len(), 4);
    }

    #[test]
    fn test_set_cookie_value() {
        let registry = SessionRegistry::new("sid", 1);
        assert_eq!(registry.set_cookie_value("abc"), "sid=abc; Path=/; HttpOnly");
    }
}
