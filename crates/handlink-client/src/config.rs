//! 客户端配置

use crate::ClientError;
use std::time::Duration;

/// 客户端配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct ClientConfig {
    /// 服务端端点，`host:port`
    pub endpoint: String,

    /// 默认获取超时（`fetch_default` 使用；融合循环会传入更小的值）
    pub fetch_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:5557".to_string(),
            fetch_timeout: Duration::from_millis(2000),
        }
    }
}

impl ClientConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ClientError> {
        if self.fetch_timeout.is_zero() {
            return Err(ClientError::InvalidConfig("fetch_timeout must be positive".to_string()));
        }
        Ok(())
    }
}
