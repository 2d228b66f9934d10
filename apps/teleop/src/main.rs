//! 遥操作融合主入口
//!
//! 本地身体采集（设备 A，这里为合成数据）与远端手部追踪服务端（设备 B）融合，
//! 以固定频率生成指令帧，并由一个零阶保持的演示控制循环消费。

mod config;
mod session;

use anyhow::{Context, Result};
use clap::Parser;
use config::TeleopFile;
use session::{Session, SessionReport};
use std::path::PathBuf;
use std::process;
use std::thread;
use std::time::Duration;
use tracing::{error, info, warn};

/// 遥操作融合
#[derive(Parser, Debug)]
#[command(name = "teleop_fusion")]
#[command(about = "Fuse local body tracking with a remote hand tracking server", long_about = None)]
#[command(version)]
struct Args {
    /// 配置文件路径
    ///
    /// 默认: <config_dir>/handlink/teleop.toml（不存在则使用内置默认值）
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// 手部追踪服务端地址（host:port）
    #[arg(short, long)]
    endpoint: Option<String>,

    /// 融合频率（Hz）
    #[arg(long)]
    frequency: Option<f64>,

    /// 每次手部获取的超时上限（毫秒）
    #[arg(long)]
    hand_timeout_ms: Option<u64>,

    /// 控制循环频率（Hz）
    #[arg(long)]
    control_frequency: Option<f64>,

    /// 运行时长（秒），不指定则运行到 Ctrl+C
    #[arg(long)]
    duration_secs: Option<u64>,
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

fn run(args: Args) -> Result<()> {
    let file = TeleopFile::load(args.config.as_deref())?;
    let mut config = file.resolve()?;

    if let Some(endpoint) = args.endpoint {
        config.client.endpoint = endpoint;
    }
    if let Some(hz) = args.frequency {
        config.fusion.teleop_frequency_hz = hz;
    }
    if let Some(ms) = args.hand_timeout_ms {
        config.fusion.hand_timeout = Duration::from_millis(ms);
    }
    if let Some(hz) = args.control_frequency {
        config.control.frequency_hz = hz;
    }
    let session = Session::start(config.clone())?;

    let stop = session.stop_handle();
    ctrlc::set_handler(move || {
        eprintln!("\nReceived interrupt signal. Shutting down...");
        stop.stop();
    })
    .context("Failed to set signal handler")?;

    if let Some(secs) = args.duration_secs {
        let stop = session.stop_handle();
        thread::spawn(move || {
            thread::sleep(Duration::from_secs(secs));
            stop.stop();
        });
    }

    info!(
        "Teleop fusion started: hand server {}, fusion {} Hz, control {} Hz. Press Ctrl+C to stop.",
        config.client.endpoint, config.fusion.teleop_frequency_hz, config.control.frequency_hz
    );

    let report = session.run()?;
    log_report(&report);
    Ok(())
}

fn log_report(report: &SessionReport) {
    let fusion = &report.fusion;
    if fusion.hand_degraded_frames > 0 {
        warn!(
            "{} of {} frames used degraded hand data ({:.1}%)",
            fusion.hand_degraded_frames,
            report.frames_produced,
            fusion.degraded_percent()
        );
    }
    info!(
        "Fusion loop produced {} frames ({} late ticks, {} mailbox overwrites)",
        report.frames_produced, fusion.late_ticks, fusion.mailbox_overwrites
    );
    let control = &report.control;
    info!(
        "Control loop: {} ticks, {} fresh, {} held, {} waiting",
        control.ticks, control.fresh_frames, control.held_ticks, control.waiting_ticks
    );
}
