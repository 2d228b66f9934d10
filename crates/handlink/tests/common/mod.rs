//! 集成测试共享工具

#![allow(dead_code)]

use handlink::capture::CaptureSource;
use handlink::protocol::{HAND_JOINT_COUNT, HandPoseSample, HandSide, JointPose};
use handlink::server::{HandTrackingServer, ServerConfig, ServerMetrics, ShutdownHandle};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// 后台运行的服务端；Drop 时停止并释放端口与设备
pub struct RunningServer {
    pub addr: SocketAddr,
    pub metrics: Arc<ServerMetrics>,
    stop: ShutdownHandle,
    handle: Option<JoinHandle<()>>,
    _dir: tempfile::TempDir,
}

impl RunningServer {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.shutdown();
        if let Some(handle) = self.handle.take() {
            handle.join().unwrap();
        }
    }
}

impl Drop for RunningServer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// 在指定端口（0 为系统分配）启动服务端
pub fn start_server<S>(source: S, port: u16) -> RunningServer
where
    S: CaptureSource<Sample = HandPoseSample> + 'static,
{
    let dir = tempfile::tempdir().unwrap();
    let config = ServerConfig {
        port,
        poll_interval: Duration::from_millis(2),
        ..ServerConfig::loopback_ephemeral()
    };
    let mut server =
        HandTrackingServer::open(config, source, Some(&dir.path().join("hand.lock"))).unwrap();
    let addr = server.local_addr();
    let metrics = server.metrics();
    let stop = server.shutdown_handle();
    let handle = thread::spawn(move || server.serve_forever().unwrap());

    RunningServer {
        addr,
        metrics,
        stop,
        handle: Some(handle),
        _dir: dir,
    }
}

/// 找一个当前空闲的本地端口
pub fn free_port() -> u16 {
    TcpListener::bind("127.0.0.1:0").unwrap().local_addr().unwrap().port()
}

/// 两只手都被追踪的完整采样
pub fn tracked_hands(timestamp_us: u64, offset: f64) -> HandPoseSample {
    let mut sample = HandPoseSample::new(timestamp_us);
    sample.set_headset(JointPose::new([0.0, 1.6, 0.0], [0.0, 0.0, 0.0, 1.0]));
    for side in HandSide::BOTH {
        sample.set_tracked(side, true);
        for index in 0..HAND_JOINT_COUNT {
            let pose = JointPose::new(
                [offset + index as f64 * 0.01, 1.2, -0.4],
                [0.0, 0.0, 0.0, 1.0],
            );
            sample.insert_joint(side, index, pose).unwrap();
        }
    }
    sample
}
