//! 融合循环
//!
//! 状态机：`Idle → Running → Stopped`。`Running` 中每个 tick 依次：
//!
//! 1. 计算截止时间 `deadline = tick_start + 1 / teleop_frequency_hz`
//! 2. 读取本地身体采样（失败时使用无效采样）
//! 3. 以 `min(hand_timeout, deadline - now)` 为超时获取手部采样
//! 4. 组装 `CommandFrame`（序号 = 上一帧 + 1，从 0 开始）
//! 5. 非阻塞发布到单槽邮箱（覆盖未消费的旧帧）
//! 6. 睡眠到截止时间；已超时则立即开始下一个 tick，不补偿丢失的 tick
//!
//! 停止时关闭邮箱生产端，控制循环随之退出。

use crate::config::StarvationPolicy;
use crate::{CommandFrame, FrameSender, FusionConfig, FusionError, FusionMetrics};
use handlink_capture::CaptureSource;
use handlink_client::HandSource;
use handlink_protocol::BodyPoseSample;
use handlink_protocol::timestamp::instant_to_micros;
use spin_sleep::SpinSleeper;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

/// 连续身体采集失败时，每隔多少次打印一次警告
const BODY_WARN_EVERY: u64 = 100;

/// 融合循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FusionState {
    Idle,
    Running,
    Stopped,
}

/// 停止句柄（可克隆，可跨线程）
#[derive(Debug, Clone)]
pub struct StopHandle {
    stop: Arc<AtomicBool>,
}

impl StopHandle {
    /// 请求停止；当前 tick 完成后生效
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    pub fn is_stop_requested(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }
}

/// 单个 tick 的执行摘要
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sequence: u64,
    pub deadline: Instant,
    /// 本 tick 实际使用的手部超时
    pub hand_timeout: Duration,
    pub hand_degraded: bool,
    pub starved: bool,
    /// 发布时覆盖了未消费的旧帧
    pub overwrote: bool,
}

/// 融合循环
///
/// - `B`: 本地身体采集源（设备 A）
/// - `H`: 手部数据源（通常为 [`handlink_client::HandTrackingClient`]）
pub struct FusionLoop<B, H>
where
    B: CaptureSource<Sample = BodyPoseSample>,
    H: HandSource,
{
    config: FusionConfig,
    period: Duration,
    body: B,
    hand: H,
    sender: FrameSender,
    state: FusionState,
    next_sequence: u64,
    stop: Arc<AtomicBool>,
    metrics: Arc<FusionMetrics>,
    starved_streak: u32,
    late_streak: u64,
    body_failure_streak: u64,
}

impl<B, H> FusionLoop<B, H>
where
    B: CaptureSource<Sample = BodyPoseSample>,
    H: HandSource,
{
    pub fn new(
        config: FusionConfig,
        body: B,
        hand: H,
        sender: FrameSender,
    ) -> Result<Self, FusionError> {
        config.validate()?;
        let period = config.period();
        Ok(Self {
            config,
            period,
            body,
            hand,
            sender,
            state: FusionState::Idle,
            next_sequence: 0,
            stop: Arc::new(AtomicBool::new(false)),
            metrics: Arc::new(FusionMetrics::new()),
            starved_streak: 0,
            late_streak: 0,
            body_failure_streak: 0,
        })
    }

    pub fn state(&self) -> FusionState {
        self.state
    }

    pub fn config(&self) -> &FusionConfig {
        &self.config
    }

    pub fn metrics(&self) -> Arc<FusionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: Arc::clone(&self.stop),
        }
    }

    /// 下一帧将使用的序号（即已产生的帧数）
    pub fn next_sequence(&self) -> u64 {
        self.next_sequence
    }

    pub fn hand_source(&self) -> &H {
        &self.hand
    }

    /// 阻塞运行，直到停止句柄被触发或饥饿策略升级
    ///
    /// 返回时状态为 `Stopped`，邮箱已关闭。
    pub fn run(&mut self) -> Result<(), FusionError> {
        if self.state == FusionState::Stopped {
            return Err(FusionError::InvalidState {
                expected: FusionState::Idle,
                actual: self.state,
            });
        }
        self.state = FusionState::Running;
        info!(
            "Fusion loop running at {} Hz (hand timeout {:?}, policy {:?})",
            self.config.teleop_frequency_hz, self.config.hand_timeout, self.config.starvation_policy
        );

        let sleeper = SpinSleeper::default();
        let result = self.run_ticks(&sleeper);
        self.finish();

        match &result {
            Ok(()) => info!("Fusion loop stopped after {} frames", self.next_sequence),
            Err(e) => error!("Fusion loop aborted after {} frames: {}", self.next_sequence, e),
        }
        result
    }

    fn run_ticks(&mut self, sleeper: &SpinSleeper) -> Result<(), FusionError> {
        while !self.stop.load(Ordering::Acquire) {
            let report = self.tick_at(Instant::now())?;

            let now = Instant::now();
            if now < report.deadline {
                self.late_streak = 0;
                sleeper.sleep(report.deadline - now);
            } else {
                // 不补偿：下一个 tick 从现在开始
                self.on_late(now - report.deadline);
            }
        }
        Ok(())
    }

    /// 手动执行一个 tick（不睡眠）
    ///
    /// 首次调用把状态从 `Idle` 切换到 `Running`。
    pub fn tick(&mut self) -> Result<TickReport, FusionError> {
        self.tick_at(Instant::now())
    }

    /// 手动停止：状态切换到 `Stopped` 并关闭邮箱
    pub fn stop(&mut self) {
        self.stop.store(true, Ordering::Release);
        self.finish();
    }

    fn finish(&mut self) {
        self.state = FusionState::Stopped;
        self.sender.close();
    }

    fn tick_at(&mut self, tick_start: Instant) -> Result<TickReport, FusionError> {
        if self.state == FusionState::Stopped {
            return Err(FusionError::InvalidState {
                expected: FusionState::Running,
                actual: self.state,
            });
        }
        self.state = FusionState::Running;

        let deadline = tick_start + self.period;
        let timestamp_us = instant_to_micros(tick_start);

        let body = self.capture_body(timestamp_us);

        let remaining = deadline.saturating_duration_since(Instant::now());
        let hand_timeout = self.config.hand_timeout.min(remaining);
        let clipped = hand_timeout < self.config.hand_timeout;
        let fetch = self.hand.fetch(hand_timeout);
        let hand_degraded = fetch.degraded;
        let fetch_timed_out = fetch.failure.as_ref().is_some_and(|f| f.is_timeout());

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let frame = CommandFrame::new(sequence, timestamp_us, body, fetch.sample, hand_degraded);
        let overwrote = self.sender.publish(frame);

        self.metrics.frames_produced.fetch_add(1, Ordering::Relaxed);
        if hand_degraded {
            self.metrics.hand_degraded_frames.fetch_add(1, Ordering::Relaxed);
        }
        if clipped {
            self.metrics.hand_timeout_clipped.fetch_add(1, Ordering::Relaxed);
        }
        if overwrote {
            self.metrics.mailbox_overwrites.fetch_add(1, Ordering::Relaxed);
        }
        trace!(
            "Tick seq={} hand_timeout={:?} degraded={} overwrote={}",
            sequence, hand_timeout, hand_degraded, overwrote
        );

        // 只有截止时间耗尽的降级才算饥饿；连接被拒等快速失败与预算无关
        let starved = clipped && fetch_timed_out;
        self.track_starvation(starved)?;

        Ok(TickReport {
            sequence,
            deadline,
            hand_timeout,
            hand_degraded,
            starved,
            overwrote,
        })
    }

    fn capture_body(&mut self, timestamp_us: u64) -> BodyPoseSample {
        match self.body.capture() {
            Ok(sample) => {
                if self.body_failure_streak > 0 {
                    info!(
                        "Body capture recovered after {} failures",
                        self.body_failure_streak
                    );
                    self.body_failure_streak = 0;
                }
                sample
            },
            Err(e) => {
                self.body_failure_streak += 1;
                self.metrics.body_capture_failures.fetch_add(1, Ordering::Relaxed);
                if self.body_failure_streak == 1
                    || self.body_failure_streak.is_multiple_of(BODY_WARN_EVERY)
                {
                    warn!(
                        "Body capture failed ({} consecutive): {}",
                        self.body_failure_streak, e
                    );
                }
                BodyPoseSample::invalid(timestamp_us)
            },
        }
    }

    fn track_starvation(&mut self, starved: bool) -> Result<(), FusionError> {
        if !starved {
            if self.starved_streak > 0 {
                debug!("Hand data no longer starved after {} ticks", self.starved_streak);
            }
            self.starved_streak = 0;
            return Ok(());
        }

        self.starved_streak = self.starved_streak.saturating_add(1);
        self.metrics.starved_ticks.fetch_add(1, Ordering::Relaxed);

        if let StarvationPolicy::Escalate { max_starved_ticks } = self.config.starvation_policy
            && self.starved_streak >= max_starved_ticks
        {
            return Err(FusionError::HandStarved {
                ticks: self.starved_streak,
            });
        }
        if self.starved_streak.is_multiple_of(self.config.starvation_warn_ticks) {
            warn!(
                "Hand data starved for {} consecutive ticks ({} consecutive fetch failures)",
                self.starved_streak,
                self.hand.consecutive_failures()
            );
        }
        Ok(())
    }

    fn on_late(&mut self, overrun: Duration) {
        self.late_streak += 1;
        self.metrics.late_ticks.fetch_add(1, Ordering::Relaxed);
        if self.late_streak.is_multiple_of(u64::from(self.config.drift_warn_ticks)) {
            warn!(
                "Fusion loop cannot keep {} Hz: {} consecutive late ticks (last overrun {:?})",
                self.config.teleop_frequency_hz, self.late_streak, overrun
            );
        } else {
            debug!("Tick overran its deadline by {:?}", overrun);
        }
    }
}

impl<B, H> FusionLoop<B, H>
where
    B: CaptureSource<Sample = BodyPoseSample> + 'static,
    H: HandSource + 'static,
{
    /// 在独立线程中运行
    ///
    /// 启用 `realtime` feature 时会尝试提升线程优先级。
    pub fn spawn(mut self) -> Result<FusionHandle, FusionError> {
        let stop = self.stop_handle();
        let metrics = self.metrics();
        let thread = thread::Builder::new()
            .name("handlink-fusion".to_string())
            .spawn(move || {
                #[cfg(feature = "realtime")]
                raise_thread_priority();

                self.run().map(|()| self.next_sequence)
            })
            .map_err(FusionError::Spawn)?;

        Ok(FusionHandle {
            stop,
            metrics,
            thread,
        })
    }
}

#[cfg(feature = "realtime")]
fn raise_thread_priority() {
    use thread_priority::*;

    match set_current_thread_priority(ThreadPriority::Max) {
        Ok(_) => info!("Fusion thread priority set to MAX (realtime)"),
        Err(e) => warn!(
            "Failed to set fusion thread priority: {}. \
             On Linux, you may need to run with CAP_SYS_NICE or use rtkit.",
            e
        ),
    }
}

/// 后台融合线程句柄
pub struct FusionHandle {
    stop: StopHandle,
    metrics: Arc<FusionMetrics>,
    thread: JoinHandle<Result<u64, FusionError>>,
}

impl FusionHandle {
    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    pub fn metrics(&self) -> Arc<FusionMetrics> {
        Arc::clone(&self.metrics)
    }

    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// 等待融合线程结束，返回产生的帧数
    pub fn join(self) -> Result<u64, FusionError> {
        self.thread.join().map_err(|_| FusionError::ThreadPanicked)?
    }

    /// 请求停止并等待
    pub fn stop_and_join(self) -> Result<u64, FusionError> {
        self.stop.stop();
        self.join()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_mailbox;
    use handlink_capture::{CaptureError, ScriptedCapture, StaticCapture};
    use handlink_client::{FetchFailure, HandFetch};
    use handlink_protocol::{BodyRegion, HandPoseSample, JointPose};
    use parking_lot::Mutex;

    struct MockHand {
        degraded: bool,
        failure: FetchFailure,
        delay: Duration,
        timeouts: Arc<Mutex<Vec<Duration>>>,
        failures: u32,
    }

    impl MockHand {
        fn new(degraded: bool, delay: Duration) -> Self {
            Self {
                degraded,
                failure: FetchFailure::Timeout,
                delay,
                timeouts: Arc::new(Mutex::new(Vec::new())),
                failures: 0,
            }
        }

        fn healthy() -> Self {
            Self::new(false, Duration::ZERO)
        }

        fn failing_with(failure: FetchFailure) -> Self {
            Self {
                failure,
                ..Self::new(true, Duration::ZERO)
            }
        }
    }

    impl HandSource for MockHand {
        fn fetch(&mut self, timeout: Duration) -> HandFetch {
            let started = Instant::now();
            thread::sleep(self.delay.min(timeout));
            self.timeouts.lock().push(timeout);
            if self.degraded {
                self.failures += 1;
                HandFetch::degraded(
                    HandPoseSample::zeroed(),
                    self.failure.clone(),
                    started.elapsed(),
                )
            } else {
                self.failures = 0;
                HandFetch::fresh(HandPoseSample::new(1), started.elapsed())
            }
        }

        fn consecutive_failures(&self) -> u32 {
            self.failures
        }
    }

    fn body() -> StaticCapture<BodyPoseSample> {
        let mut sample = BodyPoseSample::new(5);
        sample
            .insert_joint(BodyRegion::Torso, "pelvis", JointPose::IDENTITY)
            .unwrap();
        StaticCapture::new("body-a", sample)
    }

    #[test]
    fn test_sequence_starts_at_zero_and_increments() {
        let (tx, rx) = frame_mailbox();
        let mut fusion =
            FusionLoop::new(FusionConfig::default(), body(), MockHand::healthy(), tx).unwrap();
        assert_eq!(fusion.state(), FusionState::Idle);

        for expected in 0..5 {
            let report = fusion.tick().unwrap();
            assert_eq!(report.sequence, expected);
            let frame = rx.take_latest().unwrap().unwrap();
            assert_eq!(frame.sequence(), expected);
            assert!(!frame.hand_degraded());
            assert!(frame.body().is_valid());
        }
        assert_eq!(fusion.state(), FusionState::Running);
    }

    #[test]
    fn test_hand_timeout_capped_by_tick_deadline() {
        let (tx, _rx) = frame_mailbox();
        let hand = MockHand::new(true, Duration::from_secs(10));
        let timeouts = Arc::clone(&hand.timeouts);
        let config = FusionConfig {
            hand_timeout: Duration::from_millis(2000),
            ..FusionConfig::default()
        };
        let mut fusion = FusionLoop::new(config, body(), hand, tx).unwrap();

        let started = Instant::now();
        let report = fusion.tick().unwrap();
        assert!(started.elapsed() < Duration::from_millis(100));
        assert!(report.hand_timeout <= Duration::from_millis(50));
        assert!(report.starved);
        assert!(timeouts.lock()[0] <= Duration::from_millis(50));
    }

    #[test]
    fn test_short_hand_timeout_is_not_clipped() {
        let (tx, _rx) = frame_mailbox();
        let config = FusionConfig {
            hand_timeout: Duration::from_millis(10),
            ..FusionConfig::default()
        };
        let mut fusion =
            FusionLoop::new(config, body(), MockHand::new(true, Duration::ZERO), tx).unwrap();

        let report = fusion.tick().unwrap();
        assert_eq!(report.hand_timeout, Duration::from_millis(10));
        assert!(report.hand_degraded);
        assert!(!report.starved);
    }

    #[test]
    fn test_body_failure_yields_invalid_body() {
        let (tx, rx) = frame_mailbox();
        let source = ScriptedCapture::new(
            "body-a",
            [Err(CaptureError::Disconnected), Ok(BodyPoseSample::new(9))],
        );
        let mut fusion =
            FusionLoop::new(FusionConfig::default(), source, MockHand::healthy(), tx).unwrap();

        fusion.tick().unwrap();
        let frame = rx.take_latest().unwrap().unwrap();
        assert!(!frame.body().is_valid());
        assert!(frame.body().pose().is_empty());

        fusion.tick().unwrap();
        assert!(rx.take_latest().unwrap().unwrap().body().is_valid());
        assert_eq!(fusion.metrics().snapshot().body_capture_failures, 1);
    }

    #[test]
    fn test_escalation_stops_loop_and_closes_mailbox() {
        let (tx, rx) = frame_mailbox();
        let config = FusionConfig {
            starvation_policy: StarvationPolicy::Escalate {
                max_starved_ticks: 3,
            },
            ..FusionConfig::default()
        };
        let mut fusion =
            FusionLoop::new(config, body(), MockHand::new(true, Duration::ZERO), tx).unwrap();

        match fusion.run() {
            Err(FusionError::HandStarved { ticks }) => assert_eq!(ticks, 3),
            other => panic!("Expected HandStarved, got {:?}", other),
        }
        assert_eq!(fusion.state(), FusionState::Stopped);
        assert_eq!(fusion.next_sequence(), 3);

        assert_eq!(rx.take_latest().unwrap().unwrap().sequence(), 2);
        assert!(rx.take_latest().is_err());
    }

    #[test]
    fn test_degrade_policy_keeps_running() {
        let (tx, _rx) = frame_mailbox();
        let mut fusion = FusionLoop::new(
            FusionConfig::default(),
            body(),
            MockHand::new(true, Duration::ZERO),
            tx,
        )
        .unwrap();

        for _ in 0..250 {
            assert!(fusion.tick().unwrap().starved);
        }
        assert_eq!(fusion.metrics().snapshot().starved_ticks, 250);
    }

    #[test]
    fn test_fast_failures_are_degraded_but_not_starved() {
        let (tx, rx) = frame_mailbox();
        let config = FusionConfig {
            starvation_policy: StarvationPolicy::Escalate {
                max_starved_ticks: 3,
            },
            ..FusionConfig::default()
        };
        let hand = MockHand::failing_with(FetchFailure::ConnectionRefused);
        let mut fusion = FusionLoop::new(config, body(), hand, tx).unwrap();

        for _ in 0..10 {
            let report = fusion.tick().unwrap();
            assert!(report.hand_degraded);
            assert!(!report.starved);
            assert!(rx.take_latest().unwrap().unwrap().hand_degraded());
        }
        let snapshot = fusion.metrics().snapshot();
        assert_eq!(snapshot.starved_ticks, 0);
        assert_eq!(snapshot.hand_degraded_frames, 10);
        assert_eq!(snapshot.hand_timeout_clipped, 10);
    }

    #[test]
    fn test_stopped_loop_cannot_run_again() {
        let (tx, _rx) = frame_mailbox();
        let mut fusion =
            FusionLoop::new(FusionConfig::default(), body(), MockHand::healthy(), tx).unwrap();
        fusion.stop();

        assert!(matches!(fusion.run(), Err(FusionError::InvalidState { .. })));
        assert!(matches!(fusion.tick(), Err(FusionError::InvalidState { .. })));
    }

    #[test]
    fn test_spawned_loop_produces_gapless_sequences() {
        let (tx, rx) = frame_mailbox();
        let config = FusionConfig {
            teleop_frequency_hz: 200.0,
            ..FusionConfig::default()
        };
        let fusion = FusionLoop::new(config, body(), MockHand::healthy(), tx).unwrap();
        let handle = fusion.spawn().unwrap();

        let mut seen = Vec::new();
        let deadline = Instant::now() + Duration::from_millis(300);
        while Instant::now() < deadline {
            if let Ok(Some(frame)) = rx.take_latest() {
                seen.push(frame.sequence());
            }
            thread::sleep(Duration::from_millis(1));
        }
        let produced = handle.stop_and_join().unwrap();

        assert!(produced > 10, "only {} frames in 300ms at 200Hz", produced);
        assert!(seen.windows(2).all(|w| w[1] > w[0]));
        assert!(rx.is_closed());
        assert_eq!(rx.published(), produced);
    }

    #[test]
    fn test_late_ticks_do_not_burst() {
        struct SlowBody;
        impl CaptureSource for SlowBody {
            type Sample = BodyPoseSample;
            fn device_id(&self) -> &str {
                "slow-body"
            }
            fn capture(&mut self) -> Result<BodyPoseSample, CaptureError> {
                thread::sleep(Duration::from_millis(30));
                Ok(BodyPoseSample::new(0))
            }
        }

        let (tx, _rx) = frame_mailbox();
        let config = FusionConfig {
            teleop_frequency_hz: 50.0,
            ..FusionConfig::default()
        };
        let fusion = FusionLoop::new(config, SlowBody, MockHand::healthy(), tx).unwrap();
        let handle = fusion.spawn().unwrap();
        let metrics = handle.metrics();

        thread::sleep(Duration::from_millis(300));
        let produced = handle.stop_and_join().unwrap();

        // 每帧至少 30ms：不会为追赶 50Hz 而突发
        assert!(produced <= 11, "burst detected: {} frames", produced);
        assert!(metrics.snapshot().late_ticks > 0);
    }
}
