//! 融合循环与控制循环配置

use crate::FusionError;
use std::time::Duration;
use tracing::warn;

/// 慢性饥饿策略
///
/// 当 tick 剩余的时间不足以容纳配置的手部超时、且获取因等到截止时间而降级时，
/// 称该 tick "饥饿"。连接被拒等快速失败只算降级，不算饥饿。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "mode", rename_all = "snake_case"))]
pub enum StarvationPolicy {
    /// 一直降级运行，只按 `starvation_warn_ticks` 周期性告警
    #[default]
    Degrade,

    /// 连续饥饿达到 `max_starved_ticks` 后停止融合循环
    Escalate { max_starved_ticks: u32 },
}

/// 融合循环配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct FusionConfig {
    /// 遥操作频率（Hz），默认 20
    pub teleop_frequency_hz: f64,

    /// 手部获取超时上限；实际超时取它与本 tick 剩余时间的较小值
    pub hand_timeout: Duration,

    /// 慢性饥饿策略
    pub starvation_policy: StarvationPolicy,

    /// 连续迟到多少个 tick 打印一次漂移告警
    pub drift_warn_ticks: u32,

    /// 连续饥饿多少个 tick 打印一次告警
    pub starvation_warn_ticks: u32,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            teleop_frequency_hz: 20.0,
            hand_timeout: Duration::from_millis(2000),
            starvation_policy: StarvationPolicy::Degrade,
            drift_warn_ticks: 20,
            starvation_warn_ticks: 100,
        }
    }
}

impl FusionConfig {
    /// 标称 tick 周期
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.teleop_frequency_hz)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        validate_frequency("teleop_frequency_hz", self.teleop_frequency_hz)?;
        if self.hand_timeout.is_zero() {
            return Err(FusionError::InvalidConfig("hand_timeout must be positive".to_string()));
        }
        if self.drift_warn_ticks == 0 || self.starvation_warn_ticks == 0 {
            return Err(FusionError::InvalidConfig(
                "drift_warn_ticks and starvation_warn_ticks must be positive".to_string(),
            ));
        }
        if let StarvationPolicy::Escalate { max_starved_ticks } = self.starvation_policy
            && max_starved_ticks == 0
        {
            return Err(FusionError::InvalidConfig(
                "max_starved_ticks must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// 控制循环配置（外部控制循环的参考实现使用）
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ControlLoopConfig {
    /// 控制频率（Hz），默认 50
    pub frequency_hz: f64,

    /// 最大迭代次数（None 表示运行到邮箱关闭）
    pub max_iterations: Option<u64>,
}

impl Default for ControlLoopConfig {
    fn default() -> Self {
        Self {
            frequency_hz: 50.0,
            max_iterations: None,
        }
    }
}

impl ControlLoopConfig {
    pub fn period(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frequency_hz)
    }

    pub fn validate(&self) -> Result<(), FusionError> {
        validate_frequency("frequency_hz", self.frequency_hz)
    }
}

/// 最低循环频率（周期 1000 秒）；更低的值在换算周期时会溢出 `Duration`
pub const MIN_FREQUENCY_HZ: f64 = 0.001;

fn validate_frequency(name: &str, frequency_hz: f64) -> Result<(), FusionError> {
    if !frequency_hz.is_finite() || frequency_hz < MIN_FREQUENCY_HZ {
        return Err(FusionError::InvalidConfig(format!(
            "Invalid {}: {} (must be >= {})",
            name, frequency_hz, MIN_FREQUENCY_HZ
        )));
    }
    if frequency_hz > 10_000.0 {
        warn!(
            "Very high loop frequency: {} Hz. This may cause performance issues.",
            frequency_hz
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = FusionConfig::default();
        assert_eq!(config.period(), Duration::from_millis(50));
        assert_eq!(config.starvation_policy, StarvationPolicy::Degrade);
        assert!(config.validate().is_ok());

        let control = ControlLoopConfig::default();
        assert_eq!(control.period(), Duration::from_millis(20));
        assert!(control.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        for frequency in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = FusionConfig {
                teleop_frequency_hz: frequency,
                ..FusionConfig::default()
            };
            assert!(matches!(config.validate(), Err(FusionError::InvalidConfig(_))));
        }

        let zero_timeout = FusionConfig {
            hand_timeout: Duration::ZERO,
            ..FusionConfig::default()
        };
        assert!(zero_timeout.validate().is_err());

        let zero_escalation = FusionConfig {
            starvation_policy: StarvationPolicy::Escalate {
                max_starved_ticks: 0,
            },
            ..FusionConfig::default()
        };
        assert!(zero_escalation.validate().is_err());

        let control = ControlLoopConfig {
            frequency_hz: 0.0,
            ..ControlLoopConfig::default()
        };
        assert!(control.validate().is_err());
    }

    #[test]
    fn test_tiny_frequency_is_rejected_before_period_overflows() {
        for frequency in [1e-30, f64::MIN_POSITIVE, MIN_FREQUENCY_HZ / 2.0] {
            let fusion = FusionConfig {
                teleop_frequency_hz: frequency,
                ..FusionConfig::default()
            };
            assert!(matches!(fusion.validate(), Err(FusionError::InvalidConfig(_))));

            let control = ControlLoopConfig {
                frequency_hz: frequency,
                ..ControlLoopConfig::default()
            };
            assert!(matches!(control.validate(), Err(FusionError::InvalidConfig(_))));
        }

        let slowest = ControlLoopConfig {
            frequency_hz: MIN_FREQUENCY_HZ,
            ..ControlLoopConfig::default()
        };
        assert!(slowest.validate().is_ok());
        assert_eq!(slowest.period(), Duration::from_secs(1000));
    }
}
