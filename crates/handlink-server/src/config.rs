//! 服务端配置

use crate::ServerError;
use std::time::Duration;

/// 默认监听端口
pub const DEFAULT_PORT: u16 = 5557;

/// 服务端配置
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ServerConfig {
    /// 监听地址（默认 `0.0.0.0`，即所有网卡）
    pub bind_host: String,

    /// 监听端口（默认 5557；0 表示由系统分配）
    pub port: u16,

    /// 停止标志的轮询间隔（accept 与读超时的粒度）
    pub poll_interval: Duration,

    /// 连接空闲超时：客户端在此时间内没有发出请求则关闭连接，让出服务端
    pub connection_idle_timeout: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            poll_interval: Duration::from_millis(20),
            connection_idle_timeout: Duration::from_secs(5),
        }
    }
}

impl ServerConfig {
    /// 本机回环地址 + 系统分配端口（测试用）
    pub fn loopback_ephemeral() -> Self {
        Self {
            bind_host: "127.0.0.1".to_string(),
            port: 0,
            ..Self::default()
        }
    }

    /// `host:port` 形式的监听地址
    pub fn bind_addr(&self) -> String {
        if self.bind_host.contains(':') && !self.bind_host.starts_with('[') {
            // IPv6 字面量
            format!("[{}]:{}", self.bind_host, self.port)
        } else {
            format!("{}:{}", self.bind_host, self.port)
        }
    }

    pub fn validate(&self) -> Result<(), ServerError> {
        if self.bind_host.trim().is_empty() {
            return Err(ServerError::InvalidConfig("bind_host must not be empty".to_string()));
        }
        if self.poll_interval.is_zero() {
            return Err(ServerError::InvalidConfig("poll_interval must be positive".to_string()));
        }
        if self.connection_idle_timeout < self.poll_interval {
            return Err(ServerError::InvalidConfig(format!(
                "connection_idle_timeout ({:?}) must not be shorter than poll_interval ({:?})",
                self.connection_idle_timeout, self.poll_interval
            )));
        }
        Ok(())
    }
}
