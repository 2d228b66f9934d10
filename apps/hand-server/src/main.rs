//! 手部追踪服务端主入口
//!
//! 独占一台手部采集设备（设备 B），以请求-应答方式向远端客户端提供最新采样。
//! 物理设备 SDK 不在本仓库范围内，这里使用合成采集源。

use anyhow::Context;
use clap::Parser;
use handlink::capture::SyntheticHandCapture;
use handlink::server::{DEFAULT_PORT, HandTrackingServer, ServerConfig};
use std::path::PathBuf;
use std::process;
use tracing::{error, info};

/// 手部追踪服务端
#[derive(Parser, Debug)]
#[command(name = "hand_tracking_server")]
#[command(about = "Serve hand tracking samples over TCP", long_about = None)]
#[command(version)]
struct Args {
    /// 监听地址
    #[arg(long, default_value = "0.0.0.0")]
    host: String,

    /// 监听端口
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// 设备租约锁文件路径
    ///
    /// 默认: XDG_RUNTIME_DIR 或系统临时目录下按设备 ID 命名
    #[arg(long)]
    lock_file: Option<PathBuf>,

    /// 采集设备标识
    #[arg(long, default_value = "hand-tracker-b")]
    device_id: String,

    /// 每 N 次采集模拟一次追踪丢失（0 表示不模拟）
    #[arg(long, default_value = "0")]
    simulate_failure_every: u64,
}

fn main() {
    if let Err(e) = handlink::init_logging("info") {
        eprintln!("Failed to initialize logging: {}", e);
    }

    let args = Args::parse();
    if let Err(e) = run(args) {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}

fn run(args: Args) -> anyhow::Result<()> {
    let config = ServerConfig {
        bind_host: args.host.clone(),
        port: args.port,
        ..ServerConfig::default()
    };

    let source =
        SyntheticHandCapture::new(&args.device_id).with_fail_every(args.simulate_failure_every);

    let mut server = HandTrackingServer::open(config, source, args.lock_file.as_deref())
        .with_context(|| {
            format!(
                "Failed to start hand tracking server on {}:{}",
                args.host, args.port
            )
        })?;

    let shutdown = server.shutdown_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        shutdown.shutdown();
    })
    .context("Failed to set signal handler")?;

    info!(
        "Hand tracking server started on {} (device {}). Press Ctrl+C to stop.",
        server.local_addr(),
        args.device_id
    );
    server.serve_forever().context("Hand tracking server failed")?;

    let stats = server.metrics().snapshot();
    info!(
        "Served {} requests ({} invalid) over {} connections",
        stats.requests_served, stats.invalid_replies, stats.connections_accepted
    );
    Ok(())
}
