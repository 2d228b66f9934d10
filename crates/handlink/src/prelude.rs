//! Prelude - 常用类型的便捷导入
//!
//! ```rust
//! use handlink::prelude::*;
//! ```

// 数据模型
pub use handlink_protocol::{
    BodyPoseSample, BodyRegion, HandPoseSample, HandSide, JointPose, PoseSample,
};

// 采集
pub use handlink_capture::{
    CaptureError, CaptureSource, Leased, SyntheticBodyCapture, SyntheticHandCapture,
};

// 服务端 / 客户端
pub use handlink_client::{ClientConfig, HandFetch, HandSource, HandTrackingClient};
pub use handlink_server::{HandTrackingServer, ServerConfig};

// 融合
pub use handlink_fusion::{
    CommandFrame, ControlLoopConfig, FrameReceiver, FrameSender, FusionConfig, FusionLoop,
    StarvationPolicy, ZeroOrderHold, frame_mailbox, run_control_loop,
};

// 错误类型
pub use handlink_client::ClientError;
pub use handlink_fusion::FusionError;
pub use handlink_server::ServerError;
