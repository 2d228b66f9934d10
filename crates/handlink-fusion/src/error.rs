//! 融合层错误类型

use crate::FusionState;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    /// 配置无效
    #[error("Invalid fusion config: {0}")]
    InvalidConfig(String),

    /// 状态机不允许该操作（如重复启动）
    #[error("Fusion loop is {actual:?}, expected {expected:?}")]
    InvalidState {
        expected: FusionState,
        actual: FusionState,
    },

    /// 手部数据持续饥饿，`StarvationPolicy::Escalate` 触发停止
    #[error("Hand data starved for {ticks} consecutive ticks")]
    HandStarved { ticks: u32 },

    /// 无法创建融合线程
    #[error("Failed to spawn fusion thread: {0}")]
    Spawn(#[source] io::Error),

    /// 融合线程 panic
    #[error("Fusion thread panicked")]
    ThreadPanicked,
}
