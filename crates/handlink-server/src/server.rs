//! 手部追踪服务端主循环
//!
//! 严格的请求-应答：每个连接上一次只处理一个请求，不做流水线，不做广播。
//! 每个请求都重新采集一次，服务端不跨请求缓存采样。
//!
//! 采集失败在带内表达：回复 `valid = false` 的采样，连接保持打开。
//! 只有畸形请求才会导致服务端主动关闭连接。
//!
//! 停止标志以 `poll_interval` 为粒度被检查（accept 轮询与读超时），
//! 正在处理的请求会先完成应答再退出。

use crate::{ServerConfig, ServerError, ServerMetrics};
use bytes::BytesMut;
use handlink_capture::{CaptureSource, Leased};
use handlink_protocol::wire::{self, HEADER_LEN, MessageHeader, MessageType};
use handlink_protocol::{HandPoseSample, monotonic_micros};
use std::io::{self, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

/// 连续采集失败时，每隔多少次打印一次警告
const CAPTURE_WARN_EVERY: u64 = 100;

/// 停止句柄
///
/// 可克隆、可跨线程（如信号处理函数）使用。
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    running: Arc<AtomicBool>,
}

impl ShutdownHandle {
    /// 请求服务端停止（`serve_forever` 在下一个轮询点返回）
    pub fn shutdown(&self) {
        self.running.store(false, Ordering::Release);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// 单次读取的结果
enum ReadOutcome {
    Complete,
    /// 对端在请求边界上正常关闭
    Closed,
    /// 空闲超时
    Idle,
    /// 服务端正在停止
    Stopped,
}

/// 手部追踪服务端
///
/// 持有一个带租约的采集源与一个监听套接字。`Drop` 时先关闭套接字，
/// 再由 [`Leased`] 释放设备与租约，保证重启的进程可以重新获取端口与设备。
pub struct HandTrackingServer<S>
where
    S: CaptureSource<Sample = HandPoseSample>,
{
    config: ServerConfig,
    listener: TcpListener,
    local_addr: SocketAddr,
    device: Leased<S>,
    running: Arc<AtomicBool>,
    metrics: Arc<ServerMetrics>,
    capture_failure_streak: u64,
    buf: BytesMut,
}

impl<S> HandTrackingServer<S>
where
    S: CaptureSource<Sample = HandPoseSample>,
{
    /// 获取设备租约并绑定监听端口
    ///
    /// 先拿设备再绑端口；任一步失败都已释放之前获取的资源。
    ///
    /// # 参数
    /// - `lock_path`: 租约锁文件路径，`None` 时使用 [`handlink_capture::default_lock_path`]
    pub fn open(
        config: ServerConfig,
        source: S,
        lock_path: Option<&Path>,
    ) -> Result<Self, ServerError> {
        config.validate()?;
        let device = match lock_path {
            Some(path) => Leased::acquire(source, path)?,
            None => Leased::acquire_default(source)?,
        };
        Self::bind(config, device)
    }

    /// 用已获取租约的设备绑定监听端口
    ///
    /// # 错误
    /// - `AddrInUse`: 端口已被占用（致命，调用方应以非零状态退出）
    /// - `Bind`: 其他绑定失败
    pub fn bind(config: ServerConfig, device: Leased<S>) -> Result<Self, ServerError> {
        config.validate()?;

        let addr = config.bind_addr();
        let listener = TcpListener::bind(&addr).map_err(|source| {
            if source.kind() == io::ErrorKind::AddrInUse {
                ServerError::AddrInUse { addr: addr.clone() }
            } else {
                ServerError::Bind {
                    addr: addr.clone(),
                    source,
                }
            }
        })?;
        listener.set_nonblocking(true)?;
        let local_addr = listener.local_addr()?;

        info!(
            "Hand tracking server bound to {} (device: {})",
            local_addr,
            device.source().device_id()
        );

        Ok(Self {
            config,
            listener,
            local_addr,
            device,
            running: Arc::new(AtomicBool::new(true)),
            metrics: Arc::new(ServerMetrics::new()),
            capture_failure_streak: 0,
            buf: BytesMut::with_capacity(4096),
        })
    }

    /// 实际监听地址（端口为 0 时可取得系统分配的端口）
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<ServerMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle {
            running: Arc::clone(&self.running),
        }
    }

    /// 阻塞服务，直到通过 [`ShutdownHandle`] 请求停止
    ///
    /// 一次只服务一个连接；其他客户端在内核 backlog 中排队。
    ///
    /// # 错误
    /// 仅监听套接字本身不可用时返回 `Io`；单个连接上的错误只会关闭该连接。
    pub fn serve_forever(&mut self) -> Result<(), ServerError> {
        info!("Hand tracking server serving on {}", self.local_addr);

        while self.running.load(Ordering::Acquire) {
            match self.listener.accept() {
                Ok((stream, peer)) => {
                    self.metrics.connections_accepted.fetch_add(1, Ordering::Relaxed);
                    debug!("Accepted connection from {}", peer);
                    if let Err(e) = self.handle_connection(stream) {
                        // 对端中途断开属于客户端侧的超时类故障，服务端只记录
                        debug!("Connection from {} closed: {}", peer, e);
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                    thread::sleep(self.config.poll_interval);
                },
                Err(e)
                    if matches!(
                        e.kind(),
                        io::ErrorKind::Interrupted
                            | io::ErrorKind::ConnectionAborted
                            | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    debug!("Transient accept error: {}", e);
                },
                Err(e) => {
                    error!("Listener on {} failed: {}", self.local_addr, e);
                    return Err(ServerError::Io(e));
                },
            }
        }

        info!("Hand tracking server on {} stopped", self.local_addr);
        Ok(())
    }

    /// 显式停止并释放设备与端口
    pub fn shutdown(self) {
        self.running.store(false, Ordering::Release);
        drop(self);
    }

    fn handle_connection(&mut self, mut stream: TcpStream) -> io::Result<()> {
        // accept 出来的套接字可能继承非阻塞标志
        stream.set_nonblocking(false)?;
        stream.set_nodelay(true)?;
        stream.set_read_timeout(Some(self.config.poll_interval))?;

        let mut header_buf = [0u8; HEADER_LEN];
        loop {
            match self.read_exact_interruptible(&mut stream, &mut header_buf)? {
                ReadOutcome::Complete => {},
                ReadOutcome::Closed => return Ok(()),
                ReadOutcome::Idle => {
                    debug!(
                        "Closing connection idle for {:?}",
                        self.config.connection_idle_timeout
                    );
                    return Ok(());
                },
                ReadOutcome::Stopped => return Ok(()),
            }

            let header = match MessageHeader::decode(&header_buf) {
                Ok(header) => header,
                Err(e) => {
                    self.metrics.malformed_requests.fetch_add(1, Ordering::Relaxed);
                    warn!("Malformed request header ({}), closing connection", e);
                    return Ok(());
                },
            };
            if header.msg_type != MessageType::HandRequest || header.payload_len() != 0 {
                self.metrics.malformed_requests.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Unexpected request {:?} with {} payload bytes, closing connection",
                    header.msg_type,
                    header.payload_len()
                );
                return Ok(());
            }

            trace!("Hand request seq={}", header.seq);
            let sample = self.capture();
            self.reply(&mut stream, header.seq, &sample)?;
        }
    }

    fn read_exact_interruptible(
        &self,
        stream: &mut TcpStream,
        buf: &mut [u8],
    ) -> io::Result<ReadOutcome> {
        let idle_since = Instant::now();
        let mut filled = 0;

        while filled < buf.len() {
            if !self.running.load(Ordering::Acquire) {
                return Ok(ReadOutcome::Stopped);
            }
            match stream.read(&mut buf[filled..]) {
                Ok(0) if filled == 0 => return Ok(ReadOutcome::Closed),
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed mid-request",
                    ));
                },
                Ok(n) => filled += n,
                Err(e)
                    if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) =>
                {
                    if idle_since.elapsed() >= self.config.connection_idle_timeout {
                        return Ok(ReadOutcome::Idle);
                    }
                },
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {},
                Err(e) => return Err(e),
            }
        }
        Ok(ReadOutcome::Complete)
    }

    /// 采集一帧；失败时返回无效采样（不向上传播）
    fn capture(&mut self) -> HandPoseSample {
        match self.device.source_mut().capture() {
            Ok(sample) => {
                if self.capture_failure_streak > 0 {
                    info!(
                        "Capture recovered after {} consecutive failures",
                        self.capture_failure_streak
                    );
                    self.capture_failure_streak = 0;
                }
                sample
            },
            Err(e) => {
                self.capture_failure_streak += 1;
                self.metrics.capture_failures.fetch_add(1, Ordering::Relaxed);
                if self.capture_failure_streak == 1
                    || self.capture_failure_streak.is_multiple_of(CAPTURE_WARN_EVERY)
                {
                    warn!(
                        "Capture failed ({} consecutive): {}, replying with invalid sample",
                        self.capture_failure_streak, e
                    );
                }
                HandPoseSample::invalid(monotonic_micros())
            },
        }
    }

    fn reply(
        &mut self,
        stream: &mut TcpStream,
        seq: u32,
        sample: &HandPoseSample,
    ) -> io::Result<()> {
        let mut valid = sample.is_valid();

        self.buf.clear();
        if let Err(e) = wire::encode_reply(seq, sample, &mut self.buf) {
            warn!("Failed to encode hand sample ({}), replying with invalid sample", e);
            self.buf.clear();
            wire::encode_reply(seq, &HandPoseSample::invalid(sample.timestamp_us()), &mut self.buf)
                .map_err(io::Error::other)?;
            valid = false;
        }

        stream.write_all(&self.buf)?;

        self.metrics.requests_served.fetch_add(1, Ordering::Relaxed);
        if !valid {
            self.metrics.invalid_replies.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }
}

impl<S> Drop for HandTrackingServer<S>
where
    S: CaptureSource<Sample = HandPoseSample>,
{
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
        info!("Hand tracking server on {} closed", self.local_addr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use handlink_capture::{CaptureError, LeaseError, ScriptedCapture, StaticCapture};
    use handlink_protocol::wire::{Message, decode_message, encode_request};
    use handlink_protocol::{HandSide, JointPose};
    use std::thread::JoinHandle;
    use std::time::Duration;

    fn tracked_sample() -> HandPoseSample {
        let mut sample = HandPoseSample::new(42);
        sample.set_tracked(HandSide::Left, true);
        sample
            .insert_joint(HandSide::Left, 0, JointPose::new([0.1, 0.2, 0.3], [0.0, 0.0, 0.0, 1.0]))
            .unwrap();
        sample
    }

    fn spawn<S>(server: HandTrackingServer<S>) -> JoinHandle<HandTrackingServer<S>>
    where
        S: CaptureSource<Sample = HandPoseSample> + 'static,
    {
        thread::spawn(move || {
            let mut server = server;
            server.serve_forever().unwrap();
            server
        })
    }

    fn request(stream: &mut TcpStream, seq: u32) -> Vec<u8> {
        let mut buf = BytesMut::new();
        encode_request(seq, &mut buf);
        stream.write_all(&buf).unwrap();

        let mut header = [0u8; HEADER_LEN];
        stream.read_exact(&mut header).unwrap();
        let decoded = MessageHeader::decode(&header).unwrap();
        let mut payload = vec![0u8; decoded.payload_len()];
        stream.read_exact(&mut payload).unwrap();

        let mut frame = header.to_vec();
        frame.extend_from_slice(&payload);
        frame
    }

    fn reply_sample(frame: &[u8]) -> (u32, HandPoseSample) {
        match decode_message(frame).unwrap() {
            Message::HandReply { seq, sample } => (seq, sample),
            other => panic!("Expected reply, got {:?}", other),
        }
    }

    #[test]
    fn test_static_source_replies_are_bit_identical() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticCapture::new("static-b", tracked_sample());
        let server = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            source,
            Some(&dir.path().join("b.lock")),
        )
        .unwrap();
        let addr = server.local_addr();
        let stop = server.shutdown_handle();
        let handle = spawn(server);

        let mut stream = TcpStream::connect(addr).unwrap();
        let first = request(&mut stream, 7);
        let second = request(&mut stream, 7);
        assert_eq!(first, second);

        let (seq, sample) = reply_sample(&first);
        assert_eq!(seq, 7);
        assert_eq!(sample, tracked_sample());
        drop(stream);

        stop.shutdown();
        let server = handle.join().unwrap();
        let stats = server.metrics().snapshot();
        assert_eq!(stats.requests_served, 2);
        assert_eq!(stats.invalid_replies, 0);
    }

    #[test]
    fn test_capture_failure_keeps_connection_open() {
        let dir = tempfile::tempdir().unwrap();
        let source = ScriptedCapture::new(
            "scripted-b",
            [
                Ok(tracked_sample()),
                Err(CaptureError::Disconnected),
                Ok(tracked_sample()),
            ],
        );
        let server = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            source,
            Some(&dir.path().join("b.lock")),
        )
        .unwrap();
        let addr = server.local_addr();
        let stop = server.shutdown_handle();
        let handle = spawn(server);

        let mut stream = TcpStream::connect(addr).unwrap();
        assert!(reply_sample(&request(&mut stream, 1)).1.is_valid());

        let (seq, failed) = reply_sample(&request(&mut stream, 2));
        assert_eq!(seq, 2);
        assert!(!failed.is_valid());
        assert!(failed.pose().is_empty());

        // 同一连接继续可用
        assert!(reply_sample(&request(&mut stream, 3)).1.is_valid());
        drop(stream);

        stop.shutdown();
        let stats = handle.join().unwrap().metrics().snapshot();
        assert_eq!(stats.requests_served, 3);
        assert_eq!(stats.invalid_replies, 1);
        assert_eq!(stats.capture_failures, 1);
    }

    #[test]
    fn test_malformed_request_closes_connection() {
        let dir = tempfile::tempdir().unwrap();
        let source = StaticCapture::new("static-b", tracked_sample());
        let server = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            source,
            Some(&dir.path().join("b.lock")),
        )
        .unwrap();
        let addr = server.local_addr();
        let stop = server.shutdown_handle();
        let handle = spawn(server);

        let mut stream = TcpStream::connect(addr).unwrap();
        stream.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        stream.write_all(&[0x7F, 0, 0, 0, 0, 1, 0, 0]).unwrap();

        let mut buf = [0u8; 1];
        let n = stream.read(&mut buf).unwrap_or(0);
        assert_eq!(n, 0, "server must close the connection");
        drop(stream);

        stop.shutdown();
        let stats = handle.join().unwrap().metrics().snapshot();
        assert_eq!(stats.malformed_requests, 1);
        assert_eq!(stats.requests_served, 0);
    }

    #[test]
    fn test_port_in_use_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let first = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            StaticCapture::new("b1", tracked_sample()),
            Some(&dir.path().join("b1.lock")),
        )
        .unwrap();

        let taken = ServerConfig {
            port: first.local_addr().port(),
            ..ServerConfig::loopback_ephemeral()
        };
        let lock_path = dir.path().join("b2.lock");
        let err = HandTrackingServer::open(
            taken,
            StaticCapture::new("b2", tracked_sample()),
            Some(&lock_path),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ServerError::AddrInUse { .. }));
        assert!(err.is_resource_conflict());

        // 绑定失败时租约已释放
        Leased::acquire(StaticCapture::new("b2", 0u8), &lock_path).unwrap();
    }

    #[test]
    fn test_device_owned_by_another_server_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("b.lock");
        let _first = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            StaticCapture::new("pico-b", tracked_sample()),
            Some(&lock_path),
        )
        .unwrap();

        let err = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            StaticCapture::new("pico-b", tracked_sample()),
            Some(&lock_path),
        )
        .err()
        .unwrap();
        assert!(matches!(err, ServerError::Lease(LeaseError::AlreadyOwned { .. })));
        assert!(err.is_resource_conflict());
    }

    #[test]
    fn test_shutdown_releases_port_and_device() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("b.lock");
        let server = HandTrackingServer::open(
            ServerConfig::loopback_ephemeral(),
            StaticCapture::new("pico-b", tracked_sample()),
            Some(&lock_path),
        )
        .unwrap();
        let port = server.local_addr().port();
        let stop = server.shutdown_handle();
        let handle = spawn(server);

        stop.shutdown();
        handle.join().unwrap().shutdown();

        let restarted = HandTrackingServer::open(
            ServerConfig {
                port,
                ..ServerConfig::loopback_ephemeral()
            },
            StaticCapture::new("pico-b", tracked_sample()),
            Some(&lock_path),
        )
        .unwrap();
        assert_eq!(restarted.local_addr().port(), port);
    }

    #[test]
    fn test_idle_connection_is_closed() {
        let dir = tempfile::tempdir().unwrap();
        let config = ServerConfig {
            connection_idle_timeout: Duration::from_millis(100),
            ..ServerConfig::loopback_ephemeral()
        };
        let server = HandTrackingServer::open(
            config,
            StaticCapture::new("pico-b", tracked_sample()),
            Some(&dir.path().join("b.lock")),
        )
        .unwrap();
        let addr = server.local_addr();
        let stop = server.shutdown_handle();
        let handle = spawn(server);

        let _idle = TcpStream::connect(addr).unwrap();
        thread::sleep(Duration::from_millis(50));

        // 空闲连接被关闭后，第二个客户端得到服务
        let mut second = TcpStream::connect(addr).unwrap();
        second.set_read_timeout(Some(Duration::from_secs(2))).unwrap();
        assert!(reply_sample(&request(&mut second, 1)).1.is_valid());
        drop(second);

        stop.shutdown();
        handle.join().unwrap();
    }
}
