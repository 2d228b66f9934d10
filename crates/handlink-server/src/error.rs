//! 服务端错误类型
//!
//! 这里只有资源获取类错误（端口占用、设备已被占用）与配置错误，
//! 均在启动期报告，调用方应以非零状态退出。采集失败与单个连接上的 IO 错误
//! 在服务循环内部处理，不会出现在这里。

use handlink_capture::LeaseError;
use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    /// 配置无效
    #[error("Invalid server config: {0}")]
    InvalidConfig(String),

    /// 端口已被占用
    #[error("Address {addr} is already in use")]
    AddrInUse { addr: String },

    /// 其他绑定失败（地址无法解析、权限不足等）
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: io::Error,
    },

    /// 设备租约获取失败
    #[error(transparent)]
    Lease(#[from] LeaseError),

    /// 监听套接字 IO 错误
    #[error("Server IO error: {0}")]
    Io(#[from] io::Error),
}

impl ServerError {
    /// 是否为资源获取失败（端口或设备已被占用）
    pub fn is_resource_conflict(&self) -> bool {
        matches!(
            self,
            ServerError::AddrInUse { .. } | ServerError::Lease(LeaseError::AlreadyOwned { .. })
        )
    }
}
