//! 单调时间戳
//!
//! 所有位姿采样的 `timestamp_us` 都以进程启动为锚点的单调时钟表示：
//! - 单调递增，不受 NTP / 手动校时影响
//! - 微秒精度，可直接存入 `u64` / `AtomicU64`
//!
//! 注意：时间戳只在同一进程内可比较，跨进程（服务端 / 客户端）不具备可比性。

use std::sync::OnceLock;
use std::time::{Duration, Instant};

/// 全局时间锚点（首次访问时初始化，之后不再改变）
static APP_START: OnceLock<Instant> = OnceLock::new();

/// 获取自进程启动以来的单调时间（微秒）
pub fn monotonic_micros() -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    start.elapsed().as_micros() as u64
}

/// 把某个 `Instant` 换算为单调时间戳（微秒）
///
/// 早于锚点的 `Instant` 饱和为 0。
pub fn instant_to_micros(instant: Instant) -> u64 {
    let start = APP_START.get_or_init(Instant::now);
    instant.saturating_duration_since(*start).as_micros() as u64
}

/// 两个时间戳之间的时长（饱和减法）
pub fn micros_between(earlier_us: u64, later_us: u64) -> Duration {
    Duration::from_micros(later_us.saturating_sub(earlier_us))
}
