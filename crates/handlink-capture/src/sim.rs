//! 仿真采集源
//!
//! 物理设备 SDK 不在本仓库范围内，这里提供几类无硬件采集源：
//!
//! - [`StaticCapture`]：每次返回同一采样，可通过 [`FailureSwitch`] 在运行中注入故障
//! - [`ScriptedCapture`]：按脚本依次返回结果，脚本耗尽后重复最后一项
//! - [`SyntheticHandCapture`]：生成随时间缓慢开合的合成手部数据（演示用）
//! - [`SyntheticBodyCapture`]：生成缓慢摆臂的合成身体数据（演示用）

use crate::{CaptureError, CaptureSource};
use handlink_protocol::{
    BodyPoseSample, BodyRegion, HAND_JOINT_COUNT, HandPoseSample, HandSide, JointPose,
    monotonic_micros,
};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

/// 故障开关
///
/// 可跨线程克隆，用于在会话中途模拟"设备断开"。
#[derive(Debug, Clone, Default)]
pub struct FailureSwitch {
    failing: Arc<AtomicBool>,
}

impl FailureSwitch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Release);
    }

    pub fn is_failing(&self) -> bool {
        self.failing.load(Ordering::Acquire)
    }
}

/// 静态采集源
///
/// 设备输出不变时，每次采集返回逐位相同的采样（包括时间戳）。
pub struct StaticCapture<T> {
    device_id: String,
    sample: T,
    switch: FailureSwitch,
    captures: Arc<AtomicU64>,
}

impl<T: Clone + Send> StaticCapture<T> {
    pub fn new(device_id: impl Into<String>, sample: T) -> Self {
        Self {
            device_id: device_id.into(),
            sample,
            switch: FailureSwitch::new(),
            captures: Arc::new(AtomicU64::new(0)),
        }
    }

    /// 获取故障开关（打开后 `capture` 返回 `Disconnected`）
    pub fn failure_switch(&self) -> FailureSwitch {
        self.switch.clone()
    }

    /// 采集调用次数计数器（含失败调用）
    pub fn capture_counter(&self) -> Arc<AtomicU64> {
        Arc::clone(&self.captures)
    }
}

impl<T: Clone + Send> CaptureSource for StaticCapture<T> {
    type Sample = T;

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capture(&mut self) -> Result<T, CaptureError> {
        self.captures.fetch_add(1, Ordering::Relaxed);
        if self.switch.is_failing() {
            return Err(CaptureError::Disconnected);
        }
        Ok(self.sample.clone())
    }
}

/// 脚本采集源
///
/// 依次返回预设结果；脚本耗尽后重复最后一项。脚本为空时返回 `NotInitialized`。
/// 可通过 [`ScriptedCapture::handle`] 在其他线程追加脚本。
pub struct ScriptedCapture<T> {
    device_id: String,
    script: Arc<Mutex<VecDeque<Result<T, CaptureError>>>>,
    last: Option<Result<T, CaptureError>>,
}

impl<T: Clone + Send> ScriptedCapture<T> {
    pub fn new(
        device_id: impl Into<String>,
        script: impl IntoIterator<Item = Result<T, CaptureError>>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            last: None,
        }
    }

    /// 共享脚本句柄（用于运行中追加结果）
    pub fn handle(&self) -> Arc<Mutex<VecDeque<Result<T, CaptureError>>>> {
        Arc::clone(&self.script)
    }
}

impl<T: Clone + Send> CaptureSource for ScriptedCapture<T> {
    type Sample = T;

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capture(&mut self) -> Result<T, CaptureError> {
        if let Some(next) = self.script.lock().pop_front() {
            self.last = Some(next);
        }
        self.last.clone().unwrap_or(Err(CaptureError::NotInitialized))
    }
}

/// 合成手部采集源
///
/// 生成两只手 26 个关节的合成数据：手指沿 x 方向周期性开合，头显位于 1.6m 高度。
/// `fail_every` 非零时，每第 N 次采集返回 `Unavailable`，用于演示降级路径。
pub struct SyntheticHandCapture {
    device_id: String,
    fail_every: u64,
    count: u64,
}

impl SyntheticHandCapture {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            fail_every: 0,
            count: 0,
        }
    }

    pub fn with_fail_every(mut self, fail_every: u64) -> Self {
        self.fail_every = fail_every;
        self
    }

    fn synthesize(&self, timestamp_us: u64) -> HandPoseSample {
        let mut sample = HandPoseSample::new(timestamp_us);
        sample.set_headset(JointPose::new([0.0, 1.6, 0.0], [0.0, 0.0, 0.0, 1.0]));

        // 2 秒一个开合周期
        let phase = (timestamp_us as f64 / 2_000_000.0) * std::f64::consts::TAU;
        let curl = 0.02 * phase.sin();

        for side in HandSide::BOTH {
            let lateral = match side {
                HandSide::Left => -0.2,
                HandSide::Right => 0.2,
            };
            sample.set_tracked(side, true);
            for index in 0..HAND_JOINT_COUNT {
                let reach = 0.01 * index as f64 + curl;
                let pose = JointPose::new([lateral, 1.2, -0.3 - reach], [0.0, 0.0, 0.0, 1.0]);
                // 索引在范围内且采样有效，不会失败
                let _ = sample.insert_joint(side, index, pose);
            }
        }
        sample
    }
}

impl CaptureSource for SyntheticHandCapture {
    type Sample = HandPoseSample;

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capture(&mut self) -> Result<HandPoseSample, CaptureError> {
        self.count += 1;
        if self.fail_every > 0 && self.count.is_multiple_of(self.fail_every) {
            return Err(CaptureError::Unavailable("synthetic tracking dropout".to_string()));
        }
        Ok(self.synthesize(monotonic_micros()))
    }
}

/// 合成身体采集源
///
/// 两臂腕部沿竖直方向做正弦摆动，躯干与底座固定。
pub struct SyntheticBodyCapture {
    device_id: String,
}

impl SyntheticBodyCapture {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
        }
    }
}

impl CaptureSource for SyntheticBodyCapture {
    type Sample = BodyPoseSample;

    fn device_id(&self) -> &str {
        &self.device_id
    }

    fn capture(&mut self) -> Result<BodyPoseSample, CaptureError> {
        let timestamp_us = monotonic_micros();
        let swing = 0.1 * (timestamp_us as f64 / 1_000_000.0 * std::f64::consts::PI).sin();

        let joints = [
            (BodyRegion::Base, "root", [0.0, 0.0, 0.0]),
            (BodyRegion::Torso, "pelvis", [0.0, 0.0, 0.8]),
            (BodyRegion::LeftArm, "wrist", [0.3, 0.2, 1.0 + swing]),
            (BodyRegion::RightArm, "wrist", [0.3, -0.2, 1.0 - swing]),
        ];

        let mut sample = BodyPoseSample::new(timestamp_us);
        for (region, name, position) in joints {
            sample
                .insert_joint(region, name, JointPose::new(position, [0.0, 0.0, 0.0, 1.0]))
                .map_err(|e| CaptureError::Device(e.to_string()))?;
        }
        Ok(sample)
    }
}
