//! Quick Share CLI
//!
//! 在局域网内临时共享一个文件或目录，超时或 Ctrl+C 后自动停止

mod banner;
mod network;

use anyhow::{Result, bail};
use banner::{Banner, ShareSummary, format_startup_message};
use clap::Parser;
use quickshare_core::{ShareConfig, ShareMode, ShareServer, ShareSettings, directory_stats, parse_duration};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "quickshare", version, about = "Quick Share - 局域网文件/目录共享")]
struct Cli {
    /// 要共享的文件或目录
    path: PathBuf,

    /// 监听端口 (1024-65535，默认在 8000-8099 中自动选择)
    #[arg(short, long)]
    port: Option<u16>,

    /// 最多允许的不同客户端数 (默认: 10)
    #[arg(short = 'n', long)]
    max_downloads: Option<usize>,

    /// 自动关闭时间，例如 30s、5m、1h、1d，0 表示不自动关闭 (默认: 5m)
    #[arg(short, long)]
    timeout: Option<String>,

    /// 使用服务端渲染的目录页面
    #[arg(long)]
    legacy: bool,

    /// 监听地址
    #[arg(long, default_value_t = IpAddr::V4(Ipv4Addr::UNSPECIFIED))]
    bind: IpAddr,

    /// 输出调试日志
    #[arg(short, long)]
    verbose: bool,

    /// 把本次的端口、下载数、超时和页面模式保存为默认值
    #[arg(long)]
    save_defaults: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    // 桥接 log crate（quickshare-core 使用）到 tracing
    let _ = tracing_log::LogTracer::init();

    let default_filter = if verbose {
        "info,quickshare_core=debug"
    } else {
        "info,quickshare_core=info"
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .try_init();
}

async fn run(cli: Cli) -> Result<()> {
    let settings = ShareSettings::load();
    let (config, effective) = build_config(&cli, &settings)?;

    if cli.save_defaults {
        let path = effective.save()?;
        println!("💾 Saved defaults to {}", path.display());
    }

    let server = ShareServer::bind(config.clone())?;
    let summary = match server.mode() {
        ShareMode::File => ShareSummary::File {
            size: std::fs::metadata(&config.path)?.len(),
        },
        ShareMode::Directory => ShareSummary::Directory(directory_stats(&config.path)),
    };

    let banner = Banner {
        ip: network::advertised_ip(config.bind_addr),
        port: server.port(),
        name: server.share_name(),
        summary,
        max_downloads: config.max_sessions,
        timeout: config.timeout.filter(|t| !t.is_zero()),
    };
    println!("{}", format_startup_message(&banner));

    let mut handle = server.start()?;
    let token = handle.shutdown_token();

    tokio::select! {
        res = tokio::signal::ctrl_c() => {
            if let Err(e) = res {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
            println!("\n⏹️  Stopping server...");
        }
        _ = token.cancelled() => {}
    }

    handle.stop().await;
    println!("👋 Share stopped");
    Ok(())
}

/// 合并命令行与持久化默认值，返回服务器配置和可保存的设置
fn build_config(cli: &Cli, settings: &ShareSettings) -> Result<(ShareConfig, ShareSettings)> {
    let port = cli.port.or(settings.port);
    if let Some(port) = port
        && port < 1024
    {
        bail!("Port must be between 1024 and 65535");
    }

    let max_downloads = cli.max_downloads.unwrap_or(settings.max_downloads);
    if max_downloads == 0 {
        bail!("max_downloads must be a positive integer");
    }

    let timeout_str = cli.timeout.clone().unwrap_or_else(|| settings.timeout.clone());
    let timeout = parse_duration(&timeout_str)?;
    let legacy = cli.legacy || settings.legacy;

    let path = cli.path.canonicalize().map_err(|e| {
        anyhow::anyhow!("cannot access {}: {}", cli.path.display(), e)
    })?;

    let mut config = ShareConfig::new(path);
    config.port = port;
    config.timeout = (!timeout.is_zero()).then_some(timeout);
    config.max_sessions = max_downloads;
    config.legacy = legacy;
    config.bind_addr = cli.bind;
    config.validate()?;

    let effective = ShareSettings {
        port,
        max_downloads,
        timeout: timeout_str,
        legacy,
    };
    Ok((config, effective))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("quickshare").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn test_defaults_from_settings() {
        let tmp = TempDir::new().unwrap();
        let cli = parse(&[tmp.path().to_str().unwrap()]);
        let settings = ShareSettings {
            port: Some(9000),
            max_downloads: 3,
            timeout: "1h".to_string(),
            legacy: true,
        };

        let (config, effective) = build_config(&cli, &settings).unwrap();
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.max_sessions, 3);
        assert_eq!(config.timeout, Some(Duration::from_secs(3600)));
        assert!(config.legacy);
        assert_eq!(effective, settings);
    }

    #[test]
    fn test_cli_overrides_settings() {
        let tmp = TempDir::new().unwrap();
        let cli = parse(&[tmp.path().to_str().unwrap(), "-p", "8080", "-n", "2", "-t", "0"]);

        let (config, effective) = build_config(&cli, &ShareSettings::default()).unwrap();
        assert_eq!(config.port, Some(8080));
        assert_eq!(config.max_sessions, 2);
        assert_eq!(config.timeout, None);
        assert_eq!(effective.timeout, "0");
    }

    #[test]
    fn test_validation_errors() {
        let tmp = TempDir::new().unwrap();
        let dir = tmp.path().to_str().unwrap();
        let settings = ShareSettings::default();

        for args in [
            vec![dir, "-p", "80"],
            vec![dir, "-n", "0"],
            vec![dir, "-t", "5"],
            vec![dir, "-t", "5x"],
            vec![dir, "-t", "5分"],
        ] {
            assert!(build_config(&parse(&args), &settings).is_err(), "{:?}", args);
        }

        let missing = tmp.path().join("missing");
        let cli = parse(&[missing.to_str().unwrap()]);
        assert!(build_config(&cli, &settings).is_err());
    }

    #[test]
    fn test_bind_flag() {
        let tmp = TempDir::new().unwrap();
        let cli = parse(&[tmp.path().to_str().unwrap(), "--bind", "127.0.0.1", "--legacy"]);
        let (config, _) = build_config(&cli, &ShareSettings::default()).unwrap();
        assert_eq!(config.bind_addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert!(config.legacy);
    }
}
