//! 单槽邮箱（Last Write Wins）
//!
//! 融合循环与控制循环之间唯一的连接。发布永不阻塞：槽中已有未消费的帧时直接覆盖，
//! 不形成积压队列，消费者读到的总是最新帧。
//!
//! 生产端关闭（显式 `close` 或 `Drop`）后，消费者取完槽中剩余帧即得到 [`MailboxClosed`]，
//! 可以据此退出自己的循环而不是永远等待。

use crate::CommandFrame;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;
use tracing::debug;

/// 邮箱已关闭且已取空
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Frame mailbox closed")]
pub struct MailboxClosed;

#[derive(Default)]
struct Slot {
    frame: Option<CommandFrame>,
    closed: bool,
}

#[derive(Default)]
struct Shared {
    slot: Mutex<Slot>,
    published: AtomicU64,
    overwrites: AtomicU64,
}

/// 创建单槽邮箱
pub fn frame_mailbox() -> (FrameSender, FrameReceiver) {
    let shared = Arc::new(Shared::default());
    (
        FrameSender {
            shared: Arc::clone(&shared),
        },
        FrameReceiver { shared },
    )
}

/// 生产端（单生产者，不可克隆）
pub struct FrameSender {
    shared: Arc<Shared>,
}

impl FrameSender {
    /// 发布一帧（非阻塞）
    ///
    /// 返回 `true` 表示覆盖了一帧未被消费的旧帧。邮箱关闭后发布的帧被丢弃。
    pub fn publish(&self, frame: CommandFrame) -> bool {
        let mut slot = self.shared.slot.lock();
        if slot.closed {
            return false;
        }
        let overwritten = slot.frame.replace(frame).is_some();
        drop(slot);

        self.shared.published.fetch_add(1, Ordering::Relaxed);
        if overwritten {
            self.shared.overwrites.fetch_add(1, Ordering::Relaxed);
        }
        overwritten
    }

    /// 关闭邮箱（幂等）
    pub fn close(&self) {
        let mut slot = self.shared.slot.lock();
        if !slot.closed {
            slot.closed = true;
            debug!("Frame mailbox closed by producer");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }
}

impl Drop for FrameSender {
    fn drop(&mut self) {
        self.close();
    }
}

/// 消费端
pub struct FrameReceiver {
    shared: Arc<Shared>,
}

impl FrameReceiver {
    /// 取走最新帧
    ///
    /// - `Ok(Some(frame))`: 自上次读取后有新帧
    /// - `Ok(None)`: 没有新帧（消费者应保持上一帧）
    /// - `Err(MailboxClosed)`: 生产端已关闭且槽已空
    pub fn take_latest(&self) -> Result<Option<CommandFrame>, MailboxClosed> {
        let mut slot = self.shared.slot.lock();
        match slot.frame.take() {
            Some(frame) => Ok(Some(frame)),
            None if slot.closed => Err(MailboxClosed),
            None => Ok(None),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.shared.slot.lock().closed
    }

    /// 累计发布帧数
    pub fn published(&self) -> u64 {
        self.shared.published.load(Ordering::Relaxed)
    }

    /// 累计被覆盖（未被消费就被新帧替换）的帧数
    pub fn overwrites(&self) -> u64 {
        self.shared.overwrites.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handlink_protocol::{BodyPoseSample, HandPoseSample};
    use std::thread;

    fn frame(sequence: u64) -> CommandFrame {
        CommandFrame::new(
            sequence,
            sequence * 50_000,
            BodyPoseSample::new(0),
            HandPoseSample::zeroed(),
            true,
        )
    }

    #[test]
    fn test_latest_frame_wins() {
        let (tx, rx) = frame_mailbox();
        assert!(!tx.publish(frame(0)));
        assert!(tx.publish(frame(1)));
        assert!(tx.publish(frame(2)));

        assert_eq!(rx.take_latest().unwrap().unwrap().sequence(), 2);
        assert_eq!(rx.take_latest(), Ok(None));
        assert_eq!(rx.published(), 3);
        assert_eq!(rx.overwrites(), 2);
    }

    #[test]
    fn test_close_drains_then_reports_closed() {
        let (tx, rx) = frame_mailbox();
        tx.publish(frame(7));
        tx.close();
        tx.close();

        assert!(rx.is_closed());
        assert_eq!(rx.take_latest().unwrap().unwrap().sequence(), 7);
        assert_eq!(rx.take_latest(), Err(MailboxClosed));

        // 关闭后发布被丢弃
        assert!(!tx.publish(frame(8)));
        assert_eq!(rx.take_latest(), Err(MailboxClosed));
    }

    #[test]
    fn test_dropping_sender_closes() {
        let (tx, rx) = frame_mailbox();
        drop(tx);
        assert_eq!(rx.take_latest(), Err(MailboxClosed));
    }

    #[test]
    fn test_concurrent_sequences_never_go_backwards() {
        let (tx, rx) = frame_mailbox();
        let producer = thread::spawn(move || {
            for sequence in 0..10_000 {
                tx.publish(frame(sequence));
            }
        });

        let mut last = None;
        loop {
            match rx.take_latest() {
                Ok(Some(frame)) => {
                    if let Some(previous) = last {
                        assert!(frame.sequence() > previous);
                    }
                    last = Some(frame.sequence());
                },
                Ok(None) => thread::yield_now(),
                Err(MailboxClosed) => break,
            }
        }
        producer.join().unwrap();
        assert_eq!(last, Some(9_999));
    }
}
