//! 客户端错误类型
//!
//! 分两类：
//! - [`ClientError`]：构造期配置错误（端点无法解析等），对调用方致命
//! - [`FetchFailure`]：单次获取的网络类故障，只作为观测信息随 `HandFetch` 返回，永不向上抛出

use std::io;
use thiserror::Error;

/// 构造期错误
#[derive(Error, Debug)]
pub enum ClientError {
    /// 端点格式无效
    #[error("Invalid endpoint '{0}': expected host:port")]
    InvalidEndpoint(String),

    /// 端点主机名无法解析
    #[error("Cannot resolve endpoint {endpoint}: {source}")]
    Unresolvable {
        endpoint: String,
        #[source]
        source: io::Error,
    },

    /// 配置无效
    #[error("Invalid client config: {0}")]
    InvalidConfig(String),
}

/// 单次获取失败的分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    /// 超过本次超时预算
    #[error("timed out")]
    Timeout,

    /// 服务端不可达（端口无人监听）
    #[error("connection refused")]
    ConnectionRefused,

    /// 连接在应答完成前被关闭
    #[error("connection reset")]
    ConnectionReset,

    /// 应答无法解码或与请求不匹配
    #[error("malformed reply: {0}")]
    Malformed(String),

    /// 服务端应答 `valid = false`（设备采集失败）
    #[error("server reported invalid sample")]
    InvalidSample,

    /// 其他 IO 错误
    #[error("I/O error: {0}")]
    Io(io::ErrorKind),
}

impl FetchFailure {
    /// 把 IO 错误归类为获取失败
    pub fn from_io(error: &io::Error) -> Self {
        match error.kind() {
            io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => FetchFailure::Timeout,
            io::ErrorKind::ConnectionRefused => FetchFailure::ConnectionRefused,
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe
            | io::ErrorKind::UnexpectedEof => FetchFailure::ConnectionReset,
            kind => FetchFailure::Io(kind),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, FetchFailure::Timeout)
    }
}
