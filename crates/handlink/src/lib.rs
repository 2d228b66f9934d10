//! # Handlink
//!
//! 双足机器人遥操作的远程手部追踪链路：
//!
//! ```text
//! CaptureSource(B) → HandTrackingServer → TCP → HandTrackingClient ─┐
//!                                                                   ├→ FusionLoop → 单槽邮箱 → 控制循环
//!                                          CaptureSource(A) ────────┘
//! ```
//!
//! - **协议层** (`protocol`): 位姿数据模型与线协议
//! - **采集层** (`capture`): 采集设备抽象与独占租约
//! - **服务端** (`server`): 请求-应答手部追踪服务
//! - **客户端** (`client`): 永不失败的容错代理
//! - **融合层** (`fusion`): 固定频率融合循环与零阶保持消费者
//!
//! 设计目标是"服务端不可用 → 零数据，不崩溃"：网络类故障全部在客户端降级，
//! 不会传播到控制循环。
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use handlink::prelude::*;
//!
//! let client = HandTrackingClient::new(ClientConfig::new("192.168.1.20:5557"))?;
//! let (tx, rx) = frame_mailbox();
//! let fusion = FusionLoop::new(
//!     FusionConfig::default(),
//!     SyntheticBodyCapture::new("body-a"),
//!     client,
//!     tx,
//! )?;
//! let handle = fusion.spawn()?;
//! run_control_loop(rx, |frame: &CommandFrame, _fresh: bool| {
//!     let _targets = frame.finger_targets();
//! }, &ControlLoopConfig::default())?;
//! handle.join()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub use handlink_capture as capture;
pub use handlink_client as client;
pub use handlink_fusion as fusion;
pub use handlink_protocol as protocol;
pub use handlink_server as server;

pub mod logging;
pub mod prelude;

pub use logging::{LoggingError, init_logging};

// 常用类型
pub use handlink_capture::{CaptureError, CaptureSource, DeviceLease, LeaseError, Leased};
pub use handlink_client::{
    ClientConfig, ClientError, FetchFailure, HandFetch, HandSource, HandTrackingClient,
};
pub use handlink_fusion::{
    CommandFrame, ControlLoopConfig, FusionConfig, FusionError, FusionLoop, StarvationPolicy,
};
pub use handlink_protocol::{BodyPoseSample, HandPoseSample, JointPose, ProtocolError};
pub use handlink_server::{HandTrackingServer, ServerConfig, ServerError};
