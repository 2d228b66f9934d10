//! 融合输出帧

use crate::retarget::{FingerTransforms, finger_transforms};
use handlink_protocol::{BodyPoseSample, HandPoseSample, HandSide};

/// 命令帧
///
/// 每个融合 tick 新建一帧，交给控制循环后不再修改（没有可变访问器）。
#[derive(Debug, Clone, PartialEq)]
pub struct CommandFrame {
    sequence: u64,
    timestamp_us: u64,
    body: BodyPoseSample,
    hand: HandPoseSample,
    hand_degraded: bool,
}

impl CommandFrame {
    pub fn new(
        sequence: u64,
        timestamp_us: u64,
        body: BodyPoseSample,
        hand: HandPoseSample,
        hand_degraded: bool,
    ) -> Self {
        Self {
            sequence,
            timestamp_us,
            body,
            hand,
            hand_degraded,
        }
    }

    /// 帧序号（单次运行内从 0 开始严格递增 1）
    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    /// tick 开始时刻（单调时钟，微秒）
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn body(&self) -> &BodyPoseSample {
        &self.body
    }

    pub fn hand(&self) -> &HandPoseSample {
        &self.hand
    }

    /// 手部数据是否为缓存 / 全零降级值
    pub fn hand_degraded(&self) -> bool {
        self.hand_degraded
    }

    /// 左右手的手指目标变换
    pub fn finger_targets(&self) -> FingerTargets {
        FingerTargets {
            left: finger_transforms(&self.hand, HandSide::Left),
            right: finger_transforms(&self.hand, HandSide::Right),
        }
    }
}

/// 双手手指目标
#[derive(Debug, Clone, PartialEq)]
pub struct FingerTargets {
    pub left: FingerTransforms,
    pub right: FingerTransforms,
}

impl FingerTargets {
    pub fn get(&self, side: HandSide) -> &FingerTransforms {
        match side {
            HandSide::Left => &self.left,
            HandSide::Right => &self.right,
        }
    }
}
