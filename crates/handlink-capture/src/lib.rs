//! # Handlink Capture
//!
//! 位姿采集设备抽象层
//!
//! 物理追踪设备的 SDK 属于外部协作方，本 crate 只定义其能力边界：
//! "产生一个位姿采样，或者失败"。
//!
//! ## 模块
//!
//! - `lease`: 设备独占租约（同一物理设备只允许一个进程持有）
//! - `sim`: 仿真采集源（静态 / 脚本 / 合成数据），用于演示与测试

pub mod lease;
pub mod sim;

pub use lease::{DeviceLease, LeaseError, Leased, default_lock_path};
pub use sim::{
    FailureSwitch, ScriptedCapture, StaticCapture, SyntheticBodyCapture, SyntheticHandCapture,
};

use thiserror::Error;

/// 采集错误
///
/// 设备存在但当前拿不到采样。服务端把它编码为 `valid = false` 的应答，
/// 融合循环把它转换为无效的身体采样，均不会向上传播。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CaptureError {
    /// 设备已断开
    #[error("Capture device disconnected")]
    Disconnected,

    /// SDK 未初始化
    #[error("Capture SDK not initialized")]
    NotInitialized,

    /// 当前没有可用采样（如追踪丢失）
    #[error("Sample unavailable: {0}")]
    Unavailable(String),

    /// 其他设备错误
    #[error("Device error: {0}")]
    Device(String),
}

/// 采集源 Trait
///
/// 对物理追踪设备的最小抽象。实现方负责与设备 SDK 交互，
/// 调用方（服务端 / 融合循环）只关心"拿到采样或失败"。
///
/// # 线程模型
///
/// 采集源由单一线程独占使用（`&mut self`），因此只要求 `Send`。
pub trait CaptureSource: Send {
    /// 采样类型（手部或身体）
    type Sample;

    /// 设备标识（用于独占租约与日志）
    fn device_id(&self) -> &str;

    /// 采集一帧当前位姿
    fn capture(&mut self) -> Result<Self::Sample, CaptureError>;

    /// 释放设备资源（关闭 SDK 会话等）
    ///
    /// 默认为空操作。`Leased` 在释放租约之前调用。
    fn release(&mut self) {}
}

impl<S: CaptureSource + ?Sized> CaptureSource for Box<S> {
    type Sample = S::Sample;

    fn device_id(&self) -> &str {
        (**self).device_id()
    }

    fn capture(&mut self) -> Result<Self::Sample, CaptureError> {
        (**self).capture()
    }

    fn release(&mut self) {
        (**self).release()
    }
}
