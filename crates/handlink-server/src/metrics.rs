//! 服务端统计
//!
//! 原子计数器，可在任意线程读取快照，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 服务端实时统计
#[derive(Debug, Default)]
pub struct ServerMetrics {
    /// 已接受的连接数
    pub connections_accepted: AtomicU64,

    /// 已应答的请求数（含 `valid = false` 应答）
    pub requests_served: AtomicU64,

    /// `valid = false` 的应答数
    pub invalid_replies: AtomicU64,

    /// 采集失败次数
    pub capture_failures: AtomicU64,

    /// 畸形请求数（连接随即被关闭）
    pub malformed_requests: AtomicU64,
}

impl ServerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> ServerMetricsSnapshot {
        ServerMetricsSnapshot {
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            requests_served: self.requests_served.load(Ordering::Relaxed),
            invalid_replies: self.invalid_replies.load(Ordering::Relaxed),
            capture_failures: self.capture_failures.load(Ordering::Relaxed),
            malformed_requests: self.malformed_requests.load(Ordering::Relaxed),
        }
    }
}

/// 统计快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ServerMetricsSnapshot {
    pub connections_accepted: u64,
    pub requests_served: u64,
    pub invalid_replies: u64,
    pub capture_failures: u64,
    pub malformed_requests: u64,
}

impl ServerMetricsSnapshot {
    /// 无效应答占比（百分比）；没有请求时返回 0.0
    pub fn invalid_reply_percent(&self) -> f64 {
        if self.requests_served == 0 {
            return 0.0;
        }
        (self.invalid_replies as f64 / self.requests_served as f64) * 100.0
    }
}
