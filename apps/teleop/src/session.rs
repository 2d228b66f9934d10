//! 遥操作会话：后台融合线程 + 前台零阶保持控制循环

use crate::config::TeleopConfig;
use anyhow::{Context, Result};
use handlink::capture::SyntheticBodyCapture;
use handlink::fusion::{
    ControlLoopStats, FrameReceiver, FusionHandle, FusionMetricsSnapshot, StopHandle,
    frame_mailbox, run_control_loop,
};
use handlink::protocol::HandSide;
use handlink::{CommandFrame, FusionLoop, HandTrackingClient};
use tracing::{debug, info};

/// 食指指尖下标（OpenXR 手部关节顺序：0 掌心，1 手腕，6..=10 食指）
const FINGER_TIP_INDEX: usize = 10;

/// 会话结束时的汇总
#[derive(Debug, Clone, Copy)]
pub struct SessionReport {
    pub control: ControlLoopStats,
    pub frames_produced: u64,
    pub fusion: FusionMetricsSnapshot,
}

/// 已启动的会话
pub struct Session {
    config: TeleopConfig,
    handle: FusionHandle,
    receiver: FrameReceiver,
}

impl Session {
    /// 连接配置并启动融合线程
    pub fn start(config: TeleopConfig) -> Result<Self> {
        config.validate().context("Invalid configuration")?;

        let client = HandTrackingClient::new(config.client.clone()).with_context(|| {
            format!("Failed to set up hand client for {}", config.client.endpoint)
        })?;

        let (tx, receiver) = frame_mailbox();
        let fusion = FusionLoop::new(
            config.fusion.clone(),
            SyntheticBodyCapture::new("body-a"),
            client,
            tx,
        )?;
        let handle = fusion.spawn()?;

        Ok(Self {
            config,
            handle,
            receiver,
        })
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.handle.stop_handle()
    }

    /// 在当前线程运行控制循环
    ///
    /// 控制循环在邮箱关闭或达到 `max_iterations` 时返回；随后停止并等待融合线程。
    pub fn run(self) -> Result<SessionReport> {
        let Self {
            config,
            handle,
            receiver,
        } = self;

        let report_every = config.control.frequency_hz.max(1.0) as u64;
        let mut fresh_count = 0u64;
        let control = run_control_loop(
            receiver,
            |frame: &CommandFrame, fresh: bool| {
                if !fresh {
                    return;
                }
                fresh_count += 1;
                debug!(
                    "Frame #{} (degraded={})",
                    frame.sequence(),
                    frame.hand_degraded()
                );
                if fresh_count.is_multiple_of(report_every) {
                    log_finger_tip(frame);
                }
            },
            &config.control,
        );

        // 控制循环可能先于融合循环结束（迭代上限），必须显式停止融合线程
        let metrics = handle.metrics();
        let produced = handle.stop_and_join().context("Fusion loop failed")?;
        let control = control?;

        Ok(SessionReport {
            control,
            frames_produced: produced,
            fusion: metrics.snapshot(),
        })
    }
}

fn log_finger_tip(frame: &CommandFrame) {
    let targets = frame.finger_targets();
    let tip = &targets.get(HandSide::Right)[FINGER_TIP_INDEX];
    info!(
        "Frame #{}: right index tip at ({:.3}, {:.3}, {:.3}){}",
        frame.sequence(),
        tip[(0, 3)],
        tip[(1, 3)],
        tip[(2, 3)],
        if frame.hand_degraded() { " [hand degraded]" } else { "" }
    );
}
