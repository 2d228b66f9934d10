//! 位姿数据模型
//!
//! - [`JointPose`]：单个关节的位置（3 个 float）与姿态（单位四元数，xyzw）
//! - [`PoseSample`]：带时间戳与有效标志的关节位姿快照
//! - [`HandPoseSample`]：仅包含左右手关节（外加可选头显位姿），由手部追踪设备产生
//! - [`BodyPoseSample`]：仅包含手臂 / 躯干 / 底座关节，由身体追踪设备产生
//!
//! # 有效性约定
//!
//! `valid == false` 的采样关节表必为空。消费者只能通过 `valid` 区分
//! "零位姿"与"缺失位姿"，不得依赖关节表内容做判断。

use crate::ProtocolError;
use std::collections::BTreeMap;

/// 每只手上报的关节数量（头显运行时的手部骨架定义）
pub const HAND_JOINT_COUNT: u8 = 26;

/// 关节位姿
///
/// `orientation` 采用 `[qx, qy, qz, qw]` 顺序。
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct JointPose {
    /// 位置（米）
    pub position: [f64; 3],
    /// 姿态四元数 `[qx, qy, qz, qw]`
    pub orientation: [f64; 4],
}

impl JointPose {
    /// 全零位姿（注意：四元数全零，不是单位四元数）
    pub const ZERO: JointPose = JointPose {
        position: [0.0; 3],
        orientation: [0.0; 4],
    };

    /// 原点处的单位姿态
    pub const IDENTITY: JointPose = JointPose {
        position: [0.0; 3],
        orientation: [0.0, 0.0, 0.0, 1.0],
    };

    pub fn new(position: [f64; 3], orientation: [f64; 4]) -> Self {
        Self {
            position,
            orientation,
        }
    }

    /// 从线协议使用的 7 元组 `[px, py, pz, qx, qy, qz, qw]` 构造
    pub fn from_array(values: [f64; 7]) -> Self {
        Self {
            position: [values[0], values[1], values[2]],
            orientation: [values[3], values[4], values[5], values[6]],
        }
    }

    /// 转换为 7 元组 `[px, py, pz, qx, qy, qz, qw]`
    pub fn to_array(&self) -> [f64; 7] {
        let [px, py, pz] = self.position;
        let [qx, qy, qz, qw] = self.orientation;
        [px, py, pz, qx, qy, qz, qw]
    }

    /// 四元数是否全零（追踪丢失时运行时会上报全零四元数）
    pub fn has_zero_orientation(&self) -> bool {
        self.orientation.iter().all(|q| *q == 0.0)
    }
}

/// 通用位姿采样
///
/// 关节表以关节标识符为键，使用 `BTreeMap` 保证序列化顺序稳定
/// （静态设备输出必须编码为逐字节相同的负载）。
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PoseSample {
    timestamp_us: u64,
    valid: bool,
    joints: BTreeMap<String, JointPose>,
}

impl PoseSample {
    /// 创建一个有效的空采样
    pub fn new(timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            valid: true,
            joints: BTreeMap::new(),
        }
    }

    /// 创建一个无效采样（关节表为空）
    pub fn invalid(timestamp_us: u64) -> Self {
        Self {
            timestamp_us,
            valid: false,
            joints: BTreeMap::new(),
        }
    }

    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn joints(&self) -> &BTreeMap<String, JointPose> {
        &self.joints
    }

    pub fn joint(&self, id: &str) -> Option<&JointPose> {
        self.joints.get(id)
    }

    pub fn len(&self) -> usize {
        self.joints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joints.is_empty()
    }

    /// 标记为无效并清空关节表
    pub fn invalidate(&mut self) {
        self.valid = false;
        self.joints.clear();
    }

    fn insert(&mut self, id: String, pose: JointPose) -> Result<(), ProtocolError> {
        if !self.valid {
            return Err(ProtocolError::InvalidSample(format!(
                "cannot add joint {} to an invalid sample",
                id
            )));
        }
        self.joints.insert(id, pose);
        Ok(())
    }
}

// ============================================================================
// Hand
// ============================================================================

/// 左右手
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HandSide {
    Left,
    Right,
}

impl HandSide {
    pub const BOTH: [HandSide; 2] = [HandSide::Left, HandSide::Right];

    /// 关节标识符前缀
    pub fn prefix(&self) -> &'static str {
        match self {
            HandSide::Left => "left_hand",
            HandSide::Right => "right_hand",
        }
    }
}

/// 生成手部关节标识符，如 `left_hand/7`
pub fn hand_joint_id(side: HandSide, index: u8) -> String {
    format!("{}/{}", side.prefix(), index)
}

/// 解析手部关节标识符
///
/// 仅接受 `left_hand/<index>` / `right_hand/<index>`，且 `index < HAND_JOINT_COUNT`。
pub fn parse_hand_joint_id(id: &str) -> Option<(HandSide, u8)> {
    let (prefix, index) = id.split_once('/')?;
    let side = HandSide::BOTH.into_iter().find(|side| side.prefix() == prefix)?;
    // 拒绝 "+3"、"03" 之类的非规范写法，保证标识符与索引一一对应
    if index.is_empty() || index.starts_with('+') || (index.len() > 1 && index.starts_with('0')) {
        return None;
    }
    let index: u8 = index.parse().ok()?;
    (index < HAND_JOINT_COUNT).then_some((side, index))
}

/// 手部位姿采样（设备 B 产生）
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HandPoseSample {
    pose: PoseSample,
    headset: Option<JointPose>,
    left_tracked: bool,
    right_tracked: bool,
}

impl HandPoseSample {
    /// 创建有效的空手部采样（两只手均未追踪）
    pub fn new(timestamp_us: u64) -> Self {
        Self {
            pose: PoseSample::new(timestamp_us),
            headset: None,
            left_tracked: false,
            right_tracked: false,
        }
    }

    /// 创建无效手部采样（采集失败时服务端回复此值）
    pub fn invalid(timestamp_us: u64) -> Self {
        Self {
            pose: PoseSample::invalid(timestamp_us),
            headset: None,
            left_tracked: false,
            right_tracked: false,
        }
    }

    /// 全零无效采样（客户端从未成功获取数据时的降级值）
    pub fn zeroed() -> Self {
        Self::invalid(0)
    }

    /// 从各部分组装采样，并校验关节命名空间与有效性约定（解码器使用）
    pub fn from_parts(
        pose: PoseSample,
        headset: Option<JointPose>,
        left_tracked: bool,
        right_tracked: bool,
    ) -> Result<Self, ProtocolError> {
        if let Some(id) = pose.joints.keys().find(|id| parse_hand_joint_id(id).is_none()) {
            return Err(ProtocolError::InvalidJointId(id.clone()));
        }
        if !pose.valid && (!pose.joints.is_empty() || headset.is_some()) {
            return Err(ProtocolError::InvalidSample(
                "invalid sample must not carry poses".to_string(),
            ));
        }
        Ok(Self {
            pose,
            headset,
            left_tracked,
            right_tracked,
        })
    }

    pub fn pose(&self) -> &PoseSample {
        &self.pose
    }

    pub fn timestamp_us(&self) -> u64 {
        self.pose.timestamp_us
    }

    pub fn is_valid(&self) -> bool {
        self.pose.valid
    }

    pub fn headset(&self) -> Option<&JointPose> {
        self.headset.as_ref()
    }

    pub fn is_tracked(&self, side: HandSide) -> bool {
        match side {
            HandSide::Left => self.left_tracked,
            HandSide::Right => self.right_tracked,
        }
    }

    pub fn joint(&self, side: HandSide, index: u8) -> Option<&JointPose> {
        self.pose.joint(&hand_joint_id(side, index))
    }

    /// 写入一个手部关节
    ///
    /// # 错误
    /// - `InvalidJointId`: `index >= HAND_JOINT_COUNT`
    /// - `InvalidSample`: 采样已被标记为无效
    pub fn insert_joint(
        &mut self,
        side: HandSide,
        index: u8,
        pose: JointPose,
    ) -> Result<(), ProtocolError> {
        if index >= HAND_JOINT_COUNT {
            return Err(ProtocolError::InvalidJointId(hand_joint_id(side, index)));
        }
        self.pose.insert(hand_joint_id(side, index), pose)
    }

    /// 设置头显位姿（无效采样忽略）
    pub fn set_headset(&mut self, pose: JointPose) {
        if self.pose.valid {
            self.headset = Some(pose);
        }
    }

    pub fn set_tracked(&mut self, side: HandSide, tracked: bool) {
        match side {
            HandSide::Left => self.left_tracked = tracked,
            HandSide::Right => self.right_tracked = tracked,
        }
    }

    /// 按索引顺序返回一只手的连续关节（从 0 开始，遇到缺口即停止）
    pub fn hand_joints(&self, side: HandSide) -> Vec<JointPose> {
        (0..HAND_JOINT_COUNT).map_while(|index| self.joint(side, index).copied()).collect()
    }

    /// 标记为无效：清空关节、头显与追踪标志
    pub fn invalidate(&mut self) {
        self.pose.invalidate();
        self.headset = None;
        self.left_tracked = false;
        self.right_tracked = false;
    }
}

// ============================================================================
// Body
// ============================================================================

/// 身体区域（设备 A 覆盖的关节范围）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum BodyRegion {
    LeftArm,
    RightArm,
    Torso,
    Base,
}

impl BodyRegion {
    pub const ALL: [BodyRegion; 4] = [
        BodyRegion::LeftArm,
        BodyRegion::RightArm,
        BodyRegion::Torso,
        BodyRegion::Base,
    ];

    pub fn prefix(&self) -> &'static str {
        match self {
            BodyRegion::LeftArm => "left_arm",
            BodyRegion::RightArm => "right_arm",
            BodyRegion::Torso => "torso",
            BodyRegion::Base => "base",
        }
    }
}

/// 身体位姿采样（设备 A 产生，仅由融合循环的本地采集步骤刷新）
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct BodyPoseSample {
    pose: PoseSample,
}

impl BodyPoseSample {
    pub fn new(timestamp_us: u64) -> Self {
        Self {
            pose: PoseSample::new(timestamp_us),
        }
    }

    pub fn invalid(timestamp_us: u64) -> Self {
        Self {
            pose: PoseSample::invalid(timestamp_us),
        }
    }

    pub fn pose(&self) -> &PoseSample {
        &self.pose
    }

    pub fn timestamp_us(&self) -> u64 {
        self.pose.timestamp_us
    }

    pub fn is_valid(&self) -> bool {
        self.pose.valid
    }

    pub fn joint(&self, region: BodyRegion, name: &str) -> Option<&JointPose> {
        self.pose.joint(&format!("{}/{}", region.prefix(), name))
    }

    /// 写入一个身体关节，标识符为 `<region>/<name>`
    pub fn insert_joint(
        &mut self,
        region: BodyRegion,
        name: &str,
        pose: JointPose,
    ) -> Result<(), ProtocolError> {
        let id = format!("{}/{}", region.prefix(), name);
        if name.is_empty() || name.contains('/') {
            return Err(ProtocolError::InvalidJointId(id));
        }
        self.pose.insert(id, pose)
    }

    pub fn invalidate(&mut self) {
        self.pose.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_pose(seed: f64) -> JointPose {
        JointPose::new([seed, seed + 0.1, seed + 0.2], [0.0, 0.0, 0.0, 1.0])
    }

    #[test]
    fn test_joint_pose_array_conversion() {
        let pose = JointPose::from_array([1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 0.9]);
        assert_eq!(pose.position, [1.0, 2.0, 3.0]);
        assert_eq!(pose.orientation, [0.1, 0.2, 0.3, 0.9]);
        assert_eq!(pose.to_array(), [1.0, 2.0, 3.0, 0.1, 0.2, 0.3, 0.9]);
        assert!(JointPose::ZERO.has_zero_orientation());
        assert!(!JointPose::IDENTITY.has_zero_orientation());
    }

    #[test]
    fn test_hand_joint_id_roundtrip() {
        for side in HandSide::BOTH {
            for index in 0..HAND_JOINT_COUNT {
                let id = hand_joint_id(side, index);
                assert_eq!(parse_hand_joint_id(&id), Some((side, index)));
            }
        }
    }

    #[test]
    fn test_parse_hand_joint_id_rejects_foreign_ids() {
        assert_eq!(parse_hand_joint_id("left_arm/3"), None);
        assert_eq!(parse_hand_joint_id("left_hand/26"), None);
        assert_eq!(parse_hand_joint_id("left_hand/03"), None);
        assert_eq!(parse_hand_joint_id("left_hand/+3"), None);
        assert_eq!(parse_hand_joint_id("left_hand/"), None);
        assert_eq!(parse_hand_joint_id("right_hand"), None);
    }

    #[test]
    fn test_invalid_sample_is_empty() {
        let sample = HandPoseSample::invalid(42);
        assert!(!sample.is_valid());
        assert!(sample.pose().is_empty());
        assert!(sample.headset().is_none());
        assert_eq!(sample.timestamp_us(), 42);

        let zeroed = HandPoseSample::zeroed();
        assert_eq!(zeroed.timestamp_us(), 0);
        assert!(!zeroed.is_valid());
    }

    #[test]
    fn test_insert_into_invalid_sample_fails() {
        let mut sample = HandPoseSample::invalid(0);
        let err = sample.insert_joint(HandSide::Left, 0, sample_pose(0.0)).unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSample(_)));

        sample.set_headset(JointPose::IDENTITY);
        assert!(sample.headset().is_none());
    }

    #[test]
    fn test_insert_joint_out_of_range() {
        let mut sample = HandPoseSample::new(0);
        let err = sample
            .insert_joint(HandSide::Right, HAND_JOINT_COUNT, sample_pose(0.0))
            .unwrap_err();
        assert_eq!(err, ProtocolError::InvalidJointId("right_hand/26".to_string()));
    }

    #[test]
    fn test_hand_joints_in_index_order() {
        let mut sample = HandPoseSample::new(0);
        // 故意乱序写入，BTreeMap 字符串顺序为 0,1,10,11,...,2，读取必须按数值索引
        for index in (0..12).rev() {
            sample.insert_joint(HandSide::Left, index, sample_pose(index as f64)).unwrap();
        }
        let joints = sample.hand_joints(HandSide::Left);
        assert_eq!(joints.len(), 12);
        for (index, joint) in joints.iter().enumerate() {
            assert_eq!(joint.position[0], index as f64);
        }
        assert!(sample.hand_joints(HandSide::Right).is_empty());
    }

    #[test]
    fn test_hand_joints_stop_at_gap() {
        let mut sample = HandPoseSample::new(0);
        sample.insert_joint(HandSide::Right, 0, sample_pose(0.0)).unwrap();
        sample.insert_joint(HandSide::Right, 1, sample_pose(1.0)).unwrap();
        sample.insert_joint(HandSide::Right, 3, sample_pose(3.0)).unwrap();
        assert_eq!(sample.hand_joints(HandSide::Right).len(), 2);
    }

    #[test]
    fn test_invalidate_clears_everything() {
        let mut sample = HandPoseSample::new(5);
        sample.insert_joint(HandSide::Left, 0, sample_pose(0.0)).unwrap();
        sample.set_headset(JointPose::IDENTITY);
        sample.set_tracked(HandSide::Left, true);

        sample.invalidate();

        assert!(!sample.is_valid());
        assert!(sample.pose().is_empty());
        assert!(sample.headset().is_none());
        assert!(!sample.is_tracked(HandSide::Left));
        assert_eq!(sample.timestamp_us(), 5);
    }

    #[test]
    fn test_from_parts_rejects_body_joint() {
        let mut body = BodyPoseSample::new(0);
        body.insert_joint(BodyRegion::Torso, "waist", sample_pose(0.0)).unwrap();
        let err = HandPoseSample::from_parts(body.pose().clone(), None, false, false).unwrap_err();
        assert_eq!(err, ProtocolError::InvalidJointId("torso/waist".to_string()));
    }

    #[test]
    fn test_from_parts_rejects_invalid_with_headset() {
        let err = HandPoseSample::from_parts(
            PoseSample::invalid(0),
            Some(JointPose::IDENTITY),
            false,
            false,
        )
        .unwrap_err();
        assert!(matches!(err, ProtocolError::InvalidSample(_)));
    }

    #[test]
    fn test_body_joint_naming() {
        let mut body = BodyPoseSample::new(1);
        body.insert_joint(BodyRegion::LeftArm, "wrist", sample_pose(1.0)).unwrap();
        assert!(body.joint(BodyRegion::LeftArm, "wrist").is_some());
        assert!(body.pose().joint("left_arm/wrist").is_some());

        assert!(body.insert_joint(BodyRegion::Base, "", sample_pose(0.0)).is_err());
        assert!(body.insert_joint(BodyRegion::Base, "a/b", sample_pose(0.0)).is_err());
    }
}
