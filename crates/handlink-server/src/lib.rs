//! # Handlink Server
//!
//! 手部追踪服务端：独占一台手部追踪设备（设备 B），通过请求-应答通道提供当前手部位姿。
//!
//! ## 模块
//!
//! - `config`: 监听地址与轮询参数
//! - `error`: 服务端错误类型（均为启动期致命错误）
//! - `metrics`: 原子计数器统计
//! - `server`: `HandTrackingServer` 主循环
//!
//! ## 使用示例
//!
//! ```rust,no_run
//! use handlink_capture::SyntheticHandCapture;
//! use handlink_server::{HandTrackingServer, ServerConfig};
//!
//! let source = SyntheticHandCapture::new("pico-b");
//! let mut server = HandTrackingServer::open(ServerConfig::default(), source, None)?;
//! server.serve_forever()?;
//! # Ok::<(), handlink_server::ServerError>(())
//! ```

pub mod config;
pub mod error;
pub mod metrics;
pub mod server;

pub use config::{DEFAULT_PORT, ServerConfig};
pub use error::ServerError;
pub use metrics::{ServerMetrics, ServerMetricsSnapshot};
pub use server::{HandTrackingServer, ShutdownHandle};
