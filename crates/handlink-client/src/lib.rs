//! # Handlink Client
//!
//! 手部追踪服务端的容错客户端代理。
//!
//! `fetch` 永不失败：超时、拒绝连接、连接重置、畸形应答、`valid = false`
//! 都被降级为"返回上次成功的采样（或全零无效采样）+ `degraded = true`"。
//! 只有构造期的配置错误（端点无法解析）才会返回 `Err`。
//!
//! 客户端不保持跨调用的连接：每次 `fetch` 独立建立连接、发送请求、读取应答，
//! 全程受同一个截止时间约束，调用方因此可以确定性地限定每次等待。
//! 没有熔断、没有退避：每次调用都会重试。

pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;

pub use client::{ClientSessionState, HandTrackingClient};
pub use config::ClientConfig;
pub use endpoint::Endpoint;
pub use error::{ClientError, FetchFailure};

use handlink_protocol::HandPoseSample;
use std::time::Duration;

/// 一次获取的结果
#[derive(Debug, Clone, PartialEq)]
pub struct HandFetch {
    /// 新鲜采样，或降级时的缓存 / 全零采样
    pub sample: HandPoseSample,

    /// 是否降级
    pub degraded: bool,

    /// 降级原因（成功时为 `None`）
    pub failure: Option<FetchFailure>,

    /// 本次获取实际耗时
    pub elapsed: Duration,
}

impl HandFetch {
    pub fn fresh(sample: HandPoseSample, elapsed: Duration) -> Self {
        Self {
            sample,
            degraded: false,
            failure: None,
            elapsed,
        }
    }

    pub fn degraded(sample: HandPoseSample, failure: FetchFailure, elapsed: Duration) -> Self {
        Self {
            sample,
            degraded: true,
            failure: Some(failure),
            elapsed,
        }
    }
}

/// 手部数据源 Trait
///
/// 融合循环只依赖这个能力："在给定超时内给出一个手部采样，必要时降级"。
/// [`HandTrackingClient`] 是网络实现；测试可以提供脚本化实现。
pub trait HandSource: Send {
    /// 获取手部采样，阻塞不超过 `timeout`
    fn fetch(&mut self, timeout: Duration) -> HandFetch;

    /// 连续失败次数（仅用于观测，不改变获取行为）
    fn consecutive_failures(&self) -> u32;
}

impl<H: HandSource + ?Sized> HandSource for Box<H> {
    fn fetch(&mut self, timeout: Duration) -> HandFetch {
        (**self).fetch(timeout)
    }

    fn consecutive_failures(&self) -> u32 {
        (**self).consecutive_failures()
    }
}
