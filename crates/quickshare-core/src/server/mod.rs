//! HTTP 共享服务器
//!
//! 包含:
//! - 端口选择与监听
//! - 会话准入中间件
//! - 请求分类与各类处理器
//! - 自动关闭计时与手动停止

pub mod admission;
mod body;
pub mod handlers;
pub mod port;
pub mod route;

use crate::config::{ShareConfig, ShareMode};
use crate::error::ShareError;
use crate::progress::{LogObserver, TransferObserver};
use crate::sandbox::PathSandbox;
use crate::session::SessionRegistry;
use axum::{Router, middleware};
use log::{error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 停止时等待进行中连接的最长时间
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// 所有连接共享的只读上下文（会话表除外）
pub struct AppState {
    pub sandbox: PathSandbox,
    pub sessions: SessionRegistry,
    pub observer: Arc<dyn TransferObserver>,
    pub legacy: bool,
    /// 共享根目录名（单文件模式下为文件名）
    pub share_name: String,
    pub mode: ShareMode,
}

pub type SharedState = Arc<AppState>;

impl AppState {
    pub fn from_config(
        config: &ShareConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<Self, ShareError> {
        let mode = config.validate()?;
        let path = config.path.canonicalize()?;

        let sandbox = match mode {
            ShareMode::Directory => PathSandbox::for_directory(&path),
            ShareMode::File => PathSandbox::for_file(&path).map_err(|_| {
                ShareError::InvalidConfig(format!("cannot share {}", path.display()))
            })?,
        };
        let share_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "share".to_string());

        Ok(Self {
            sandbox,
            sessions: SessionRegistry::new(config.cookie_name.clone(), config.max_sessions),
            observer,
            legacy: config.legacy,
            share_name,
            mode,
        })
    }
}

/// 构建路由
///
/// 只有一个兜底处理器，分类在 [`route::Route::classify`] 中完成；
/// 准入中间件包在最外层。
pub fn build_router(state: SharedState) -> Router {
    Router::new()
        .fallback(handlers::dispatch)
        .layer(middleware::from_fn_with_state(state.clone(), admission::admit))
        .with_state(state)
}

/// 已绑定端口、尚未开始服务的服务器
pub struct ShareServer {
    listener: std::net::TcpListener,
    port: u16,
    state: SharedState,
    timeout: Option<Duration>,
}

impl ShareServer {
    /// 校验配置并绑定端口，传输事件写入日志
    pub fn bind(config: ShareConfig) -> Result<Self, ShareError> {
        Self::bind_with_observer(config, Arc::new(LogObserver))
    }

    pub fn bind_with_observer(
        config: ShareConfig,
        observer: Arc<dyn TransferObserver>,
    ) -> Result<Self, ShareError> {
        let state = AppState::from_config(&config, observer)?;
        let listener = port::bind_listener(config.bind_addr, config.port)?;
        let port = listener.local_addr()?.port();

        info!(
            "Sharing {:?} ({:?} mode) on port {}",
            config.path, state.mode, port
        );

        Ok(Self {
            listener,
            port,
            state: Arc::new(state),
            timeout: config.timeout.filter(|t| !t.is_zero()),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn mode(&self) -> ShareMode {
        self.state.mode
    }

    pub fn share_name(&self) -> &str {
        &self.state.share_name
    }

    /// 开始服务
    ///
    /// 必须在 tokio 运行时中调用。每个连接由独立任务处理。
    pub fn start(self) -> Result<ServerHandle, ShareError> {
        self.listener.set_nonblocking(true)?;
        let listener = tokio::net::TcpListener::from_std(self.listener)?;
        let app = build_router(self.state);
        let token = CancellationToken::new();

        let shutdown = token.clone();
        let server = tokio::spawn(async move {
            let result = axum::serve(
                listener,
                app.into_make_service_with_connect_info::<SocketAddr>(),
            )
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await;

            if let Err(e) = result {
                error!("Server error: {}", e);
            }
            info!("Server stopped");
        });

        let timer = self.timeout.map(|timeout| {
            let token = token.clone();
            tokio::spawn(async move {
                tokio::select! {
                    _ = tokio::time::sleep(timeout) => {
                        info!("⏰ Timeout reached after {}s, shutting down", timeout.as_secs());
                        token.cancel();
                    }
                    _ = token.cancelled() => {}
                }
            })
        });

        Ok(ServerHandle {
            port: self.port,
            token,
            server: Some(server),
            timer,
        })
    }
}

/// 运行中的服务器
pub struct ServerHandle {
    port: u16,
    token: CancellationToken,
    server: Option<JoinHandle<()>>,
    timer: Option<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn port(&self) -> u16 {
        self.port
    }

    /// 取消该令牌即停止服务（超时计时器也通过它触发）
    pub fn shutdown_token(&self) -> CancellationToken {
        self.token.clone()
    }

    pub fn is_stopped(&self) -> bool {
        self.token.is_cancelled()
    }

    /// 等待服务结束（超时、`stop` 或服务出错）
    pub async fn wait(&mut self) {
        if let Some(server) = self.server.as_mut() {
            let _ = server.await;
            self.server = None;
        }
        self.cancel();
    }

    /// 停止服务，可重复调用
    ///
    /// 先取消计时器，再关闭监听；进行中的连接最多等待 5 秒。
    pub async fn stop(&mut self) {
        self.cancel();
        if let Some(mut server) = self.server.take()
            && tokio::time::timeout(SHUTDOWN_GRACE, &mut server).await.is_err()
        {
            warn!("Connections still open after {:?}, aborting", SHUTDOWN_GRACE);
            server.abort();
        }
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.token.cancel();
    }
}

impl Drop for ServerHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}
