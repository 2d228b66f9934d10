//! # Handlink Protocol
//!
//! 远程手部追踪的数据模型与线协议定义（无网络、无硬件依赖）
//!
//! ## 模块
//!
//! - `pose`: 关节位姿、位姿采样（手部 / 身体）
//! - `timestamp`: 单调时间戳（微秒）
//! - `wire`: 请求-应答线协议编码/解码
//!
//! ## 字节序
//!
//! 线协议统一使用小端字节序（Little Endian）。

pub mod pose;
pub mod timestamp;
pub mod wire;

pub use pose::{
    BodyPoseSample, BodyRegion, HAND_JOINT_COUNT, HandPoseSample, HandSide, JointPose, PoseSample,
    hand_joint_id, parse_hand_joint_id,
};
pub use timestamp::monotonic_micros;
pub use wire::{HEADER_LEN, Message, MessageHeader, MessageType};

use thiserror::Error;

/// 协议层错误类型
///
/// 客户端把所有解码错误统一视为"畸形应答"（网络类故障），不会向上抛出。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Message too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },

    #[error("Unknown message type: 0x{0:02X}")]
    UnknownMessageType(u8),

    #[error("Unexpected message type: expected {expected:?}, got {actual:?}")]
    UnexpectedMessage {
        expected: MessageType,
        actual: MessageType,
    },

    #[error("Length mismatch: header declares {declared} payload bytes, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Payload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Sequence mismatch: expected {expected}, got {actual}")]
    SequenceMismatch { expected: u32, actual: u32 },

    #[error("Invalid joint identifier: {0}")]
    InvalidJointId(String),

    #[error("Duplicate joint identifier: {0}")]
    DuplicateJointId(String),

    #[error("Joint identifier is not valid UTF-8")]
    InvalidUtf8,

    #[error("Trailing bytes after payload: {0}")]
    TrailingBytes(usize),

    #[error("Invalid sample: {0}")]
    InvalidSample(String),
}
