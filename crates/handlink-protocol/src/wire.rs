//! 手部追踪请求-应答线协议
//!
//! 每条消息 = 8 字节消息头 + 负载（小端字节序）：
//!
//! ```text
//! | msg_type: u8 | flags: u8 | length: u16 | reserved: u8 | seq: u24 |
//! ```
//!
//! - `HandRequest (0x01)`：无负载的触发请求
//! - `HandReply (0x81)`：手部采样，回显请求的 `seq`
//!
//! `HandReply` 负载布局：
//!
//! ```text
//! | sample_flags: u8 | timestamp_us: u64 | [headset: 7 × f64] |
//! | joint_count: u16 | { id_len: u8 | id: [u8; id_len] | pose: 7 × f64 } * joint_count |
//! ```
//!
//! 协议没有错误通道：采集失败通过 `valid = 0` 的应答在带内表达。

use crate::ProtocolError;
use crate::pose::{HandPoseSample, HandSide, JointPose, PoseSample};
use bytes::{Buf, BufMut, BytesMut};
use num_enum::{IntoPrimitive, TryFromPrimitive};

/// 消息头长度（字节）
pub const HEADER_LEN: usize = 8;

/// 单条消息最大负载（受 `length: u16` 限制）
pub const MAX_PAYLOAD_LEN: usize = u16::MAX as usize;

/// 序列号有效位（24 位）
pub const SEQ_MASK: u32 = 0x00FF_FFFF;

/// 单个关节位姿在线上的字节数（7 × f64）
const POSE_LEN: usize = 7 * 8;

// 采样标志位
const FLAG_VALID: u8 = 0x01;
const FLAG_HEADSET: u8 = 0x02;
const FLAG_LEFT_TRACKED: u8 = 0x04;
const FLAG_RIGHT_TRACKED: u8 = 0x08;

// ============================================================================
// Message Types
// ============================================================================

/// 消息类型
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive, IntoPrimitive)]
pub enum MessageType {
    // 客户端 → 服务端
    HandRequest = 0x01, // 请求当前手部位姿

    // 服务端 → 客户端
    HandReply = 0x81, // 手部位姿应答
}

// ============================================================================
// Message Header
// ============================================================================

/// 消息头（8 字节）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageHeader {
    pub msg_type: MessageType,
    pub flags: u8,
    pub length: u16,
    pub reserved: u8,
    pub seq: u32,
}

impl MessageHeader {
    pub fn new(msg_type: MessageType, length: u16, seq: u32) -> Self {
        Self {
            msg_type,
            flags: 0,
            length,
            reserved: 0,
            seq: seq & SEQ_MASK,
        }
    }

    /// 编码消息头（追加 8 字节）
    pub fn encode(&self, buf: &mut impl BufMut) {
        buf.put_u8(self.msg_type.into());
        buf.put_u8(self.flags);
        buf.put_u16_le(self.length);
        buf.put_u8(self.reserved);
        // 序列号只使用低 24 位
        buf.put_slice(&(self.seq & SEQ_MASK).to_le_bytes()[..3]);
    }

    /// 从缓冲区前 8 字节解码消息头
    pub fn decode(buf: &[u8]) -> Result<Self, ProtocolError> {
        ensure_len(buf, HEADER_LEN)?;

        let msg_type =
            MessageType::try_from(buf[0]).map_err(|e| ProtocolError::UnknownMessageType(e.number))?;
        let flags = buf[1];
        let length = u16::from_le_bytes([buf[2], buf[3]]);
        let reserved = buf[4];
        let seq = u32::from_le_bytes([buf[5], buf[6], buf[7], 0]);

        Ok(Self {
            msg_type,
            flags,
            length,
            reserved,
            seq,
        })
    }

    /// 负载长度（字节）
    pub fn payload_len(&self) -> usize {
        self.length as usize
    }
}

// ============================================================================
// Messages
// ============================================================================

/// 完整消息
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    HandRequest { seq: u32 },
    HandReply { seq: u32, sample: HandPoseSample },
}

/// 编码手部请求（不透明触发，无负载）
pub fn encode_request(seq: u32, buf: &mut BytesMut) {
    buf.reserve(HEADER_LEN);
    MessageHeader::new(MessageType::HandRequest, 0, seq).encode(buf);
}

/// 编码手部应答
///
/// # 错误
/// - `TooLarge`: 负载超过 `MAX_PAYLOAD_LEN`
/// - `InvalidJointId`: 关节标识符超过 255 字节
pub fn encode_reply(
    seq: u32,
    sample: &HandPoseSample,
    buf: &mut BytesMut,
) -> Result<(), ProtocolError> {
    let payload_len = reply_payload_len(sample)?;
    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::TooLarge {
            size: payload_len,
            max: MAX_PAYLOAD_LEN,
        });
    }

    buf.reserve(HEADER_LEN + payload_len);
    MessageHeader::new(MessageType::HandReply, payload_len as u16, seq).encode(buf);

    let mut flags = 0u8;
    if sample.is_valid() {
        flags |= FLAG_VALID;
    }
    if sample.headset().is_some() {
        flags |= FLAG_HEADSET;
    }
    if sample.is_tracked(HandSide::Left) {
        flags |= FLAG_LEFT_TRACKED;
    }
    if sample.is_tracked(HandSide::Right) {
        flags |= FLAG_RIGHT_TRACKED;
    }
    buf.put_u8(flags);
    buf.put_u64_le(sample.timestamp_us());

    if let Some(headset) = sample.headset() {
        put_pose(buf, headset);
    }

    let joints = sample.pose().joints();
    buf.put_u16_le(joints.len() as u16);
    for (id, pose) in joints {
        buf.put_u8(id.len() as u8);
        buf.put_slice(id.as_bytes());
        put_pose(buf, pose);
    }

    Ok(())
}

/// 计算应答负载长度（不含消息头）
fn reply_payload_len(sample: &HandPoseSample) -> Result<usize, ProtocolError> {
    let joints = sample.pose().joints();
    if joints.len() > u16::MAX as usize {
        return Err(ProtocolError::TooLarge {
            size: joints.len(),
            max: u16::MAX as usize,
        });
    }

    let mut len = 1 + 8 + 2;
    if sample.headset().is_some() {
        len += POSE_LEN;
    }
    for id in joints.keys() {
        if id.len() > u8::MAX as usize {
            return Err(ProtocolError::InvalidJointId(id.clone()));
        }
        len += 1 + id.len() + POSE_LEN;
    }
    Ok(len)
}

fn put_pose(buf: &mut BytesMut, pose: &JointPose) {
    for value in pose.to_array() {
        buf.put_f64_le(value);
    }
}

/// 解码应答负载（不含消息头）
///
/// 负载必须被完整消费，多余字节视为畸形应答。
pub fn decode_reply_payload(payload: &[u8]) -> Result<HandPoseSample, ProtocolError> {
    let mut buf = payload;

    let mut head = take(&mut buf, 1 + 8)?;
    let flags = head.get_u8();
    let timestamp_us = head.get_u64_le();

    let valid = flags & FLAG_VALID != 0;
    let headset = if flags & FLAG_HEADSET != 0 {
        Some(get_pose(&mut buf)?)
    } else {
        None
    };

    ensure_len(buf, 2)?;
    let joint_count = buf.get_u16_le();

    let mut joints = Vec::with_capacity(joint_count as usize);
    for _ in 0..joint_count {
        ensure_len(buf, 1)?;
        let id_len = buf.get_u8() as usize;
        let id_bytes = take(&mut buf, id_len)?;
        let id = std::str::from_utf8(id_bytes).map_err(|_| ProtocolError::InvalidUtf8)?;
        let joint = get_pose(&mut buf)?;
        joints.push((id.to_string(), joint));
    }

    if !buf.is_empty() {
        return Err(ProtocolError::TrailingBytes(buf.len()));
    }

    let pose = if valid {
        PoseSample::new(timestamp_us)
    } else {
        PoseSample::invalid(timestamp_us)
    };
    if !valid && !joints.is_empty() {
        return Err(ProtocolError::InvalidSample(
            "invalid sample must not carry poses".to_string(),
        ));
    }

    let mut sample = HandPoseSample::from_parts(
        pose,
        headset,
        flags & FLAG_LEFT_TRACKED != 0,
        flags & FLAG_RIGHT_TRACKED != 0,
    )?;
    for (id, joint) in joints {
        let (side, index) = crate::pose::parse_hand_joint_id(&id)
            .ok_or_else(|| ProtocolError::InvalidJointId(id.clone()))?;
        if sample.joint(side, index).is_some() {
            return Err(ProtocolError::DuplicateJointId(id));
        }
        sample.insert_joint(side, index, joint)?;
    }
    Ok(sample)
}

/// 解码完整消息（消息头 + 负载，长度必须精确匹配）
pub fn decode_message(data: &[u8]) -> Result<Message, ProtocolError> {
    let header = MessageHeader::decode(data)?;
    let payload = &data[HEADER_LEN..];
    if payload.len() != header.payload_len() {
        return Err(ProtocolError::LengthMismatch {
            declared: header.payload_len(),
            actual: payload.len(),
        });
    }

    match header.msg_type {
        MessageType::HandRequest => {
            // 请求没有负载；前面已校验长度一致，这里只需拒绝非空负载
            if !payload.is_empty() {
                return Err(ProtocolError::TrailingBytes(payload.len()));
            }
            Ok(Message::HandRequest { seq: header.seq })
        },
        MessageType::HandReply => Ok(Message::HandReply {
            seq: header.seq,
            sample: decode_reply_payload(payload)?,
        }),
    }
}

fn get_pose(buf: &mut &[u8]) -> Result<JointPose, ProtocolError> {
    ensure_len(buf, POSE_LEN)?;
    let mut values = [0.0f64; 7];
    for value in values.iter_mut() {
        *value = buf.get_f64_le();
    }
    Ok(JointPose::from_array(values))
}

fn take<'a>(buf: &mut &'a [u8], len: usize) -> Result<&'a [u8], ProtocolError> {
    ensure_len(buf, len)?;
    let slice: &'a [u8] = buf;
    let (head, tail) = slice.split_at(len);
    *buf = tail;
    Ok(head)
}

fn ensure_len(buf: &[u8], needed: usize) -> Result<(), ProtocolError> {
    if buf.len() < needed {
        return Err(ProtocolError::TooShort {
            needed,
            actual: buf.len(),
        });
    }
    Ok(())
}
