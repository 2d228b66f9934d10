//! 服务端端点
//!
//! 端点在构造时解析并完成 DNS 查询：格式错误或主机不可解析属于配置错误，
//! 在启动期暴露，而不是变成每个 tick 的网络故障。

use crate::ClientError;
use std::fmt;
use std::net::{SocketAddr, ToSocketAddrs};

/// 未指定端口时使用的默认端口
pub const DEFAULT_PORT: u16 = 5557;

/// 已解析的服务端端点
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    host: String,
    port: u16,
    addrs: Vec<SocketAddr>,
}

impl Endpoint {
    /// 解析 `host:port`、`host`（默认端口）或 `[ipv6]:port`
    pub fn parse(endpoint: &str) -> Result<Self, ClientError> {
        let trimmed = endpoint.trim();
        let invalid = || ClientError::InvalidEndpoint(endpoint.to_string());
        if trimmed.is_empty() {
            return Err(invalid());
        }

        let (host, port) = if let Some(rest) = trimmed.strip_prefix('[') {
            let (host, tail) = rest.split_once(']').ok_or_else(invalid)?;
            match tail {
                "" => (host, None),
                _ => (host, Some(tail.strip_prefix(':').ok_or_else(invalid)?)),
            }
        } else if trimmed.matches(':').count() == 1 {
            let (host, port) = trimmed.split_once(':').ok_or_else(invalid)?;
            (host, Some(port))
        } else {
            // 无端口，或不带方括号的 IPv6 字面量
            (trimmed, None)
        };

        if host.is_empty() {
            return Err(invalid());
        }
        let port = match port {
            Some(port) => port.parse::<u16>().map_err(|_| invalid())?,
            None => DEFAULT_PORT,
        };
        Self::new(host, port)
    }

    /// 由主机与端口构造并解析
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self, ClientError> {
        let host = host.into();
        if port == 0 {
            return Err(ClientError::InvalidEndpoint(format!("{}:0", host)));
        }
        let addrs: Vec<SocketAddr> = (host.as_str(), port)
            .to_socket_addrs()
            .map_err(|source| ClientError::Unresolvable {
                endpoint: format!("{}:{}", host, port),
                source,
            })?
            .collect();
        if addrs.is_empty() {
            return Err(ClientError::Unresolvable {
                endpoint: format!("{}:{}", host, port),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no addresses"),
            });
        }
        Ok(Self { host, port, addrs })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// 解析得到的地址（按解析顺序尝试连接）
    pub fn addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }
}

impl From<SocketAddr> for Endpoint {
    fn from(addr: SocketAddr) -> Self {
        Self {
            host: addr.ip().to_string(),
            port: addr.port(),
            addrs: vec![addr],
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.host.contains(':') {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
