//! 日志初始化
//!
//! 使用 `tracing_subscriber::fmt`，过滤规则取自 `RUST_LOG`，
//! 外加调用方给出的默认指令（如 `"hand_tracking_server=info"`）。

use thiserror::Error;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::ParseError;

#[derive(Error, Debug)]
pub enum LoggingError {
    #[error("Invalid log directive: {0}")]
    InvalidDirective(#[from] ParseError),

    #[error("Global subscriber already set: {0}")]
    AlreadyInitialized(String),
}

/// 初始化全局日志订阅者
///
/// # 参数
/// - `default_directive`: 追加在 `RUST_LOG` 之后的过滤指令
pub fn init_logging(default_directive: &str) -> Result<(), LoggingError> {
    let filter = EnvFilter::from_default_env().add_directive(default_directive.parse()?);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .map_err(|e| LoggingError::AlreadyInitialized(e.to_string()))
}
