//! 融合循环统计

use std::sync::atomic::{AtomicU64, Ordering};

/// 融合循环实时统计（原子计数器，任意线程可读）
#[derive(Debug, Default)]
pub struct FusionMetrics {
    /// 已产生的帧数
    pub frames_produced: AtomicU64,

    /// `hand_degraded = true` 的帧数
    pub hand_degraded_frames: AtomicU64,

    /// 手部超时被 tick 截止时间截短的次数
    pub hand_timeout_clipped: AtomicU64,

    /// 饥饿 tick 数（超时被截短且获取因超时降级）
    pub starved_ticks: AtomicU64,

    /// 未能在截止时间前完成的 tick 数
    pub late_ticks: AtomicU64,

    /// 身体采集失败次数
    pub body_capture_failures: AtomicU64,

    /// 覆盖了未消费帧的发布次数
    pub mailbox_overwrites: AtomicU64,
}

impl FusionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> FusionMetricsSnapshot {
        FusionMetricsSnapshot {
            frames_produced: self.frames_produced.load(Ordering::Relaxed),
            hand_degraded_frames: self.hand_degraded_frames.load(Ordering::Relaxed),
            hand_timeout_clipped: self.hand_timeout_clipped.load(Ordering::Relaxed),
            starved_ticks: self.starved_ticks.load(Ordering::Relaxed),
            late_ticks: self.late_ticks.load(Ordering::Relaxed),
            body_capture_failures: self.body_capture_failures.load(Ordering::Relaxed),
            mailbox_overwrites: self.mailbox_overwrites.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FusionMetricsSnapshot {
    pub frames_produced: u64,
    pub hand_degraded_frames: u64,
    pub hand_timeout_clipped: u64,
    pub starved_ticks: u64,
    pub late_ticks: u64,
    pub body_capture_failures: u64,
    pub mailbox_overwrites: u64,
}

impl FusionMetricsSnapshot {
    /// 降级帧占比，单位为百分比（0.0..=100.0）；没有帧时返回 0.0
    pub fn degraded_percent(&self) -> f64 {
        if self.frames_produced == 0 {
            return 0.0;
        }
        (self.hand_degraded_frames as f64 / self.frames_produced as f64) * 100.0
    }
}
