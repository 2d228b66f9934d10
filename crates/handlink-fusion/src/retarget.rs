//! 手指目标变换
//!
//! 把头显坐标系（Y 向上，-Z 向前）下的手部关节转换为世界坐标系（Z 向上）下、
//! 相对头显且去除头显偏航角的 4×4 齐次变换。去除偏航后，操作者转头不会
//! 带动手指目标绕竖直轴旋转。

use handlink_protocol::{HandPoseSample, HandSide, JointPose};
use nalgebra::{Matrix3, Matrix4, Quaternion, Rotation3, UnitQuaternion, Vector3};

/// 用于重定向的手指关节数量（手腕之外的前 25 个关节）
pub const FINGER_JOINTS: usize = 25;

/// 单只手的手指目标变换
pub type FingerTransforms = [Matrix4<f64>; FINGER_JOINTS];

/// 头显坐标系 → 世界坐标系
fn headset_to_world() -> Matrix3<f64> {
    Matrix3::new(
        0.0, 0.0, -1.0, //
        -1.0, 0.0, 0.0, //
        0.0, 1.0, 0.0,
    )
}

/// 四元数（xyzw）转旋转矩阵；全零四元数视为单位姿态
fn rotation_of(pose: &JointPose) -> Matrix3<f64> {
    if pose.has_zero_orientation() {
        return Matrix3::identity();
    }
    let [x, y, z, w] = pose.orientation;
    UnitQuaternion::from_quaternion(Quaternion::new(w, x, y, z))
        .to_rotation_matrix()
        .into_inner()
}

/// 计算一只手的 25 个手指目标变换
///
/// 采样无效、该手未追踪或关节少于 25 个时返回全零矩阵（不是单位矩阵）。
/// 没有头显位姿时按原点处的单位姿态处理。
pub fn finger_transforms(sample: &HandPoseSample, side: HandSide) -> FingerTransforms {
    let mut transforms = [Matrix4::zeros(); FINGER_JOINTS];
    if !sample.is_valid() || !sample.is_tracked(side) {
        return transforms;
    }
    let joints = sample.hand_joints(side);
    if joints.len() < FINGER_JOINTS {
        return transforms;
    }

    let to_world = headset_to_world();
    let headset = sample.headset().copied().unwrap_or(JointPose::IDENTITY);
    let headset_pos = to_world * Vector3::from(headset.position);
    let headset_rot = to_world * rotation_of(&headset) * to_world.transpose();

    let (_, _, yaw) = Rotation3::from_matrix_unchecked(headset_rot).euler_angles();
    let inv_yaw = Rotation3::from_axis_angle(&Vector3::z_axis(), -yaw).into_inner();

    for (transform, joint) in transforms.iter_mut().zip(joints.iter()) {
        let joint_pos = to_world * Vector3::from(joint.position);
        let joint_rot = to_world * rotation_of(joint) * to_world.transpose();

        let mut m = Matrix4::identity();
        m.fixed_view_mut::<3, 3>(0, 0).copy_from(&(inv_yaw * joint_rot));
        m.fixed_view_mut::<3, 1>(0, 3).copy_from(&(inv_yaw * (joint_pos - headset_pos)));
        *transform = m;
    }
    transforms
}
