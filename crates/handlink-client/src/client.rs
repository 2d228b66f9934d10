//! 容错客户端代理实现

use crate::{ClientConfig, ClientError, Endpoint, FetchFailure, HandFetch, HandSource};
use bytes::BytesMut;
use handlink_protocol::HandPoseSample;
use handlink_protocol::wire::{
    HEADER_LEN, MessageHeader, MessageType, SEQ_MASK, decode_reply_payload, encode_request,
};
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::{Duration, Instant};
use tracing::{debug, info, trace, warn};

/// 连续失败时，每隔多少次打印一次警告（20Hz 下约 1 秒）
const FAILURE_WARN_EVERY: u32 = 20;

/// 客户端会话状态
///
/// 只由 `fetch` 修改；不跨线程共享。
#[derive(Debug, Clone)]
pub struct ClientSessionState {
    last_good_sample: HandPoseSample,
    consecutive_failures: u32,
    endpoint: Endpoint,
    timeout_budget: Duration,
}

impl ClientSessionState {
    pub fn new(endpoint: Endpoint, timeout_budget: Duration) -> Self {
        Self {
            last_good_sample: HandPoseSample::zeroed(),
            consecutive_failures: 0,
            endpoint,
            timeout_budget,
        }
    }

    /// 最近一次成功获取的采样（从未成功时为全零无效采样）
    pub fn last_good_sample(&self) -> &HandPoseSample {
        &self.last_good_sample
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn timeout_budget(&self) -> Duration {
        self.timeout_budget
    }

    fn record_success(&mut self, sample: HandPoseSample) {
        self.last_good_sample = sample;
        self.consecutive_failures = 0;
    }

    fn record_failure(&mut self) -> u32 {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_failures
    }
}

/// 手部追踪客户端代理
pub struct HandTrackingClient {
    state: ClientSessionState,
    next_seq: u32,
    buf: BytesMut,
}

impl HandTrackingClient {
    /// 创建客户端；端点在此解析
    ///
    /// # 错误
    /// - `InvalidEndpoint` / `Unresolvable`: 端点无效
    /// - `InvalidConfig`: 超时为零
    pub fn new(config: ClientConfig) -> Result<Self, ClientError> {
        config.validate()?;
        let endpoint = Endpoint::parse(&config.endpoint)?;
        Ok(Self::with_endpoint(endpoint, config.fetch_timeout))
    }

    pub fn with_endpoint(endpoint: Endpoint, timeout_budget: Duration) -> Self {
        debug!("Hand tracking client targeting {}", endpoint);
        Self {
            state: ClientSessionState::new(endpoint, timeout_budget),
            next_seq: 0,
            buf: BytesMut::with_capacity(HEADER_LEN),
        }
    }

    pub fn state(&self) -> &ClientSessionState {
        &self.state
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.state.endpoint()
    }

    pub fn last_good_sample(&self) -> &HandPoseSample {
        self.state.last_good_sample()
    }

    /// 使用配置的默认超时获取
    pub fn fetch_default(&mut self) -> HandFetch {
        let timeout = self.state.timeout_budget;
        self.fetch(timeout)
    }

    /// 获取手部采样，阻塞不超过 `timeout`
    ///
    /// `timeout` 为零时不发起任何网络操作，直接按超时降级。
    pub fn fetch(&mut self, timeout: Duration) -> HandFetch {
        let started = Instant::now();
        let deadline = started + timeout;
        let seq = self.next_seq;
        self.next_seq = (seq + 1) & SEQ_MASK;

        match self.request(seq, deadline) {
            Ok(sample) => {
                let failures = self.state.consecutive_failures;
                if failures > 0 {
                    info!(
                        "Hand tracking server {} recovered after {} failed fetches",
                        self.state.endpoint, failures
                    );
                }
                trace!("Fetched hand sample seq={} ts={}", seq, sample.timestamp_us());
                self.state.record_success(sample.clone());
                HandFetch::fresh(sample, started.elapsed())
            },
            Err(failure) => {
                let failures = self.state.record_failure();
                if failures == 1 || failures.is_multiple_of(FAILURE_WARN_EVERY) {
                    warn!(
                        "Hand fetch from {} failed ({} consecutive): {}, using last good sample",
                        self.state.endpoint, failures, failure
                    );
                } else {
                    debug!("Hand fetch failed ({} consecutive): {}", failures, failure);
                }
                HandFetch::degraded(
                    self.state.last_good_sample.clone(),
                    failure,
                    started.elapsed(),
                )
            },
        }
    }

    /// 一次完整的请求周期：连接、发送、读取、校验
    fn request(&mut self, seq: u32, deadline: Instant) -> Result<HandPoseSample, FetchFailure> {
        let mut stream = self.connect(deadline)?;
        // 请求只有 8 字节，关闭 Nagle 避免被延迟发送
        stream.set_nodelay(true).map_err(|e| FetchFailure::from_io(&e))?;

        self.buf.clear();
        encode_request(seq, &mut self.buf);
        stream
            .set_write_timeout(Some(remaining(deadline)?))
            .map_err(|e| FetchFailure::from_io(&e))?;
        stream.write_all(&self.buf).map_err(|e| FetchFailure::from_io(&e))?;

        let mut header = [0u8; HEADER_LEN];
        read_exact_until(&mut stream, &mut header, deadline)?;
        let header = MessageHeader::decode(&header).map_err(malformed)?;
        if header.msg_type != MessageType::HandReply {
            return Err(FetchFailure::Malformed(format!(
                "expected HandReply, got {:?}",
                header.msg_type
            )));
        }
        if header.seq != seq {
            return Err(FetchFailure::Malformed(format!(
                "reply seq {} does not match request seq {}",
                header.seq, seq
            )));
        }

        let mut payload = vec![0u8; header.payload_len()];
        read_exact_until(&mut stream, &mut payload, deadline)?;
        let sample = decode_reply_payload(&payload).map_err(malformed)?;

        if !sample.is_valid() {
            return Err(FetchFailure::InvalidSample);
        }
        Ok(sample)
    }

    fn connect(&self, deadline: Instant) -> Result<TcpStream, FetchFailure> {
        let mut last_failure = FetchFailure::ConnectionRefused;
        for addr in self.state.endpoint.addrs() {
            let budget = remaining(deadline)?;
            match TcpStream::connect_timeout(addr, budget) {
                Ok(stream) => return Ok(stream),
                Err(e) => {
                    trace!("Connect to {} failed: {}", addr, e);
                    last_failure = FetchFailure::from_io(&e);
                },
            }
        }
        Err(last_failure)
    }
}

impl HandSource for HandTrackingClient {
    fn fetch(&mut self, timeout: Duration) -> HandFetch {
        HandTrackingClient::fetch(self, timeout)
    }

    fn consecutive_failures(&self) -> u32 {
        self.state.consecutive_failures
    }
}

fn remaining(deadline: Instant) -> Result<Duration, FetchFailure> {
    let left = deadline.saturating_duration_since(Instant::now());
    if left.is_zero() {
        return Err(FetchFailure::Timeout);
    }
    Ok(left)
}

fn read_exact_until(
    stream: &mut TcpStream,
    buf: &mut [u8],
    deadline: Instant,
) -> Result<(), FetchFailure> {
    let mut filled = 0;
    while filled < buf.len() {
        stream
            .set_read_timeout(Some(remaining(deadline)?))
            .map_err(|e| FetchFailure::from_io(&e))?;
        match stream.read(&mut buf[filled..]) {
            Ok(0) => return Err(FetchFailure::ConnectionReset),
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
            Err(e) => return Err(FetchFailure::from_io(&e)),
        }
    }
    Ok(())
}

fn malformed(error: handlink_protocol::ProtocolError) -> FetchFailure {
    FetchFailure::Malformed(error.to_string())
}
