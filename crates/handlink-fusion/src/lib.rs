//! # Handlink Fusion
//!
//! 把本地身体采样（设备 A）与远程手部采样（设备 B，经客户端代理）
//! 按固定遥操作频率融合为 [`CommandFrame`]，通过单槽邮箱交给控制循环。
//!
//! ## 三个独立时钟
//!
//! 服务端采集频率、遥操作频率、控制频率互不相关，循环之间只通过
//! "单槽、覆盖最新"的缓冲连接，不存在积压队列。
//!
//! ## 模块
//!
//! - `config`: 融合 / 控制循环配置与饥饿策略
//! - `fusion`: `FusionLoop` 状态机
//! - `mailbox`: 单槽邮箱
//! - `control`: 零阶保持消费者（控制循环契约的参考实现）
//! - `frame`: 命令帧
//! - `retarget`: 头显补偿后的手指目标变换
//! - `metrics`: 原子计数器统计

pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod fusion;
pub mod mailbox;
pub mod metrics;
pub mod retarget;

pub use config::{ControlLoopConfig, FusionConfig, MIN_FREQUENCY_HZ, StarvationPolicy};
pub use control::{ControlLoopStats, FrameConsumer, HoldOutput, ZeroOrderHold, run_control_loop};
pub use error::FusionError;
pub use frame::{CommandFrame, FingerTargets};
pub use fusion::{FusionHandle, FusionLoop, FusionState, StopHandle, TickReport};
pub use mailbox::{FrameReceiver, FrameSender, MailboxClosed, frame_mailbox};
pub use metrics::{FusionMetrics, FusionMetricsSnapshot};
pub use retarget::{FINGER_JOINTS, FingerTransforms, finger_transforms};
