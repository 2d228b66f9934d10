//! 配置文件
//!
//! TOML 格式，时间单位均为毫秒：
//!
//! ```toml
//! [client]
//! endpoint = "192.168.1.20:5557"
//! fetch_timeout_ms = 2000
//!
//! [fusion]
//! frequency_hz = 20.0
//! hand_timeout_ms = 2000
//! starvation = "escalate"
//! max_starved_ticks = 200
//!
//! [control]
//! frequency_hz = 50.0
//! ```

use anyhow::{Context, Result, bail};
use handlink::{ClientConfig, ControlLoopConfig, FusionConfig, StarvationPolicy};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 默认配置文件路径：`<config_dir>/handlink/teleop.toml`
pub fn default_config_path() -> Option<PathBuf> {
    let mut path = dirs::config_dir()?;
    path.push("handlink");
    path.push("teleop.toml");
    Some(path)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientSection {
    pub endpoint: Option<String>,
    pub fetch_timeout_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StarvationMode {
    #[default]
    Degrade,
    Escalate,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FusionSection {
    pub frequency_hz: Option<f64>,
    pub hand_timeout_ms: Option<u64>,
    pub starvation: StarvationMode,
    pub max_starved_ticks: Option<u32>,
    pub drift_warn_ticks: Option<u32>,
    pub starvation_warn_ticks: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ControlSection {
    pub frequency_hz: Option<f64>,
    pub max_iterations: Option<u64>,
}

/// 遥操作配置文件
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TeleopFile {
    pub client: ClientSection,
    pub fusion: FusionSection,
    pub control: ControlSection,
}

/// 解析后的全部运行配置
#[derive(Debug, Clone, PartialEq)]
pub struct TeleopConfig {
    pub client: ClientConfig,
    pub fusion: FusionConfig,
    pub control: ControlLoopConfig,
}

impl TeleopFile {
    /// 加载配置文件
    ///
    /// 显式给出的路径必须存在；默认路径不存在时使用内置默认值。
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match default_config_path() {
                Some(path) if path.exists() => path,
                _ => return Ok(Self::default()),
            },
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn parse(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// 叠加到库默认配置之上
    pub fn resolve(&self) -> Result<TeleopConfig> {
        let mut client = ClientConfig::default();
        if let Some(endpoint) = &self.client.endpoint {
            client.endpoint = endpoint.clone();
        }
        if let Some(ms) = self.client.fetch_timeout_ms {
            client.fetch_timeout = Duration::from_millis(ms);
        }

        let mut fusion = FusionConfig::default();
        if let Some(hz) = self.fusion.frequency_hz {
            fusion.teleop_frequency_hz = hz;
        }
        if let Some(ms) = self.fusion.hand_timeout_ms {
            fusion.hand_timeout = Duration::from_millis(ms);
        }
        if let Some(ticks) = self.fusion.drift_warn_ticks {
            fusion.drift_warn_ticks = ticks;
        }
        if let Some(ticks) = self.fusion.starvation_warn_ticks {
            fusion.starvation_warn_ticks = ticks;
        }
        fusion.starvation_policy = match (self.fusion.starvation, self.fusion.max_starved_ticks) {
            (StarvationMode::Degrade, None) => StarvationPolicy::Degrade,
            (StarvationMode::Degrade, Some(_)) => {
                bail!("fusion.max_starved_ticks requires starvation = \"escalate\"")
            },
            (StarvationMode::Escalate, Some(max_starved_ticks)) => {
                StarvationPolicy::Escalate { max_starved_ticks }
            },
            (StarvationMode::Escalate, None) => {
                bail!("starvation = \"escalate\" requires fusion.max_starved_ticks")
            },
        };

        let mut control = ControlLoopConfig::default();
        if let Some(hz) = self.control.frequency_hz {
            control.frequency_hz = hz;
        }
        control.max_iterations = self.control.max_iterations;

        Ok(TeleopConfig {
            client,
            fusion,
            control,
        })
    }
}

impl TeleopConfig {
    pub fn validate(&self) -> Result<()> {
        self.client.validate()?;
        self.fusion.validate()?;
        self.control.validate()?;
        Ok(())
    }
}
