//! 控制循环侧：零阶保持消费者
//!
//! 真实的控制循环（驱动执行器）在本仓库之外，这里只提供它需要满足的契约的参考实现：
//! 以自己的固定频率读取邮箱中的"最新可用帧"，没有新帧时保持上一帧，不阻塞、不报错。

use crate::{CommandFrame, ControlLoopConfig, FrameReceiver, FusionError};
use spin_sleep::SpinSleeper;
use std::time::Instant;
use tracing::{debug, info};

/// 一次轮询的结果
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum HoldOutput<'a> {
    /// 自上次轮询后到达的新帧
    Fresh(&'a CommandFrame),

    /// 没有新帧，保持上一帧；`ticks` 为连续保持次数
    Held { frame: &'a CommandFrame, ticks: u64 },

    /// 尚未收到任何帧
    Waiting,

    /// 生产端已关闭且无剩余帧
    Closed,
}

/// 零阶保持器
pub struct ZeroOrderHold {
    receiver: FrameReceiver,
    held: Option<CommandFrame>,
    held_ticks: u64,
}

impl ZeroOrderHold {
    pub fn new(receiver: FrameReceiver) -> Self {
        Self {
            receiver,
            held: None,
            held_ticks: 0,
        }
    }

    /// 读取最新帧（非阻塞）
    pub fn poll(&mut self) -> HoldOutput<'_> {
        match self.receiver.take_latest() {
            Ok(Some(frame)) => {
                self.held_ticks = 0;
                HoldOutput::Fresh(self.held.insert(frame))
            },
            Ok(None) => match &self.held {
                Some(frame) => {
                    self.held_ticks += 1;
                    HoldOutput::Held {
                        frame,
                        ticks: self.held_ticks,
                    }
                },
                None => HoldOutput::Waiting,
            },
            Err(_) => HoldOutput::Closed,
        }
    }

    /// 当前保持的帧
    pub fn current(&self) -> Option<&CommandFrame> {
        self.held.as_ref()
    }
}

/// 帧消费者
///
/// `fresh == false` 表示本周期没有新帧，`frame` 为保持的上一帧。
pub trait FrameConsumer {
    fn on_frame(&mut self, frame: &CommandFrame, fresh: bool);
}

impl<F: FnMut(&CommandFrame, bool)> FrameConsumer for F {
    fn on_frame(&mut self, frame: &CommandFrame, fresh: bool) {
        self(frame, fresh)
    }
}

/// 控制循环统计
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ControlLoopStats {
    pub ticks: u64,
    pub fresh_frames: u64,
    pub held_ticks: u64,
    pub waiting_ticks: u64,
}

/// 以固定频率运行零阶保持消费循环
///
/// 直到邮箱关闭或达到 `max_iterations` 时返回。
pub fn run_control_loop<C: FrameConsumer>(
    receiver: FrameReceiver,
    mut consumer: C,
    config: &ControlLoopConfig,
) -> Result<ControlLoopStats, FusionError> {
    config.validate()?;

    let period = config.period();
    let sleeper = SpinSleeper::default();
    let mut hold = ZeroOrderHold::new(receiver);
    let mut stats = ControlLoopStats::default();

    info!("Control loop running at {} Hz", config.frequency_hz);

    loop {
        if let Some(max) = config.max_iterations
            && stats.ticks >= max
        {
            break;
        }

        let tick_start = Instant::now();
        match hold.poll() {
            HoldOutput::Fresh(frame) => {
                stats.fresh_frames += 1;
                consumer.on_frame(frame, true);
            },
            HoldOutput::Held { frame, .. } => {
                stats.held_ticks += 1;
                consumer.on_frame(frame, false);
            },
            HoldOutput::Waiting => stats.waiting_ticks += 1,
            HoldOutput::Closed => {
                debug!("Frame mailbox closed, control loop exiting");
                break;
            },
        }
        stats.ticks += 1;

        let elapsed = tick_start.elapsed();
        if elapsed < period {
            sleeper.sleep(period - elapsed);
        }
    }

    info!(
        "Control loop stopped: {} ticks, {} fresh frames, {} held",
        stats.ticks, stats.fresh_frames, stats.held_ticks
    );
    Ok(stats)
}
