//! 设备独占租约
//!
//! 同一物理追踪设备同时只能被一个采集进程持有。租约用文件锁实现：
//! 比进程扫描更可靠，进程崩溃时操作系统会自动释放锁，重启的进程可以重新获取。
//!
//! 租约是显式的"获取 / 释放"握手，而非全局状态：
//! - [`DeviceLease::acquire`] 获取独占锁（非阻塞，已被持有时立即失败）
//! - `Drop` 或 [`Leased::release`] 释放

use crate::CaptureSource;
use fs4::fs_std::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// 租约错误（资源获取失败，属于启动期致命错误）
#[derive(Error, Debug)]
pub enum LeaseError {
    /// 设备已被其他进程持有
    #[error("Device {device_id} is already owned by another process (lock: {path})")]
    AlreadyOwned { device_id: String, path: PathBuf },

    /// 锁文件操作失败
    #[error("Lock file error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 默认锁文件路径
///
/// 优先使用用户可写目录，避免权限问题：
/// 1. `dirs::runtime_dir()`（Linux 上通常为 `/run/user/{uid}`）
/// 2. 系统临时目录
pub fn default_lock_path(device_id: &str) -> PathBuf {
    let file_name = format!("handlink_{}.lock", sanitize(device_id));

    if let Some(runtime_dir) = dirs::runtime_dir()
        && (runtime_dir.exists() || std::fs::create_dir_all(&runtime_dir).is_ok())
    {
        return runtime_dir.join(file_name);
    }

    std::env::temp_dir().join(file_name)
}

fn sanitize(device_id: &str) -> String {
    device_id
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect()
}

/// 设备独占租约令牌
pub struct DeviceLease {
    device_id: String,
    path: PathBuf,
    file: File,
}

impl DeviceLease {
    /// 尝试获取设备租约
    ///
    /// # 参数
    /// - `device_id`: 设备标识
    /// - `lock_path`: 锁文件路径（见 [`default_lock_path`]）
    ///
    /// # 错误
    /// - `AlreadyOwned`: 锁已被其他进程持有
    /// - `Io`: 锁文件无法创建或写入
    pub fn acquire(device_id: &str, lock_path: impl AsRef<Path>) -> Result<Self, LeaseError> {
        let path = lock_path.as_ref().to_path_buf();
        let io_err = |source| LeaseError::Io {
            path: path.clone(),
            source,
        };

        // 先不截断：还没拿到锁，文件内容可能属于当前持有者
        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .read(true)
            .open(&path)
            .map_err(io_err)?;

        if !file.try_lock_exclusive().map_err(io_err)? {
            return Err(LeaseError::AlreadyOwned {
                device_id: device_id.to_string(),
                path: path.clone(),
            });
        }

        // 拿到锁后再截断并写入当前 PID（用于排障）
        file.set_len(0).map_err(io_err)?;
        file.seek(SeekFrom::Start(0)).map_err(io_err)?;
        writeln!(&file, "{}", std::process::id()).map_err(io_err)?;
        file.sync_all().map_err(io_err)?;

        info!("Acquired device lease for {} ({})", device_id, path.display());

        Ok(Self {
            device_id: device_id.to_string(),
            path,
            file,
        })
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DeviceLease {
    fn drop(&mut self) {
        // 文件关闭时操作系统会释放锁，这里显式解锁以便尽早让出设备
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("Failed to unlock device lease {}: {}", self.path.display(), e);
        }
        info!("Released device lease for {}", self.device_id);
    }
}

/// 持有租约的采集源
///
/// 把采集源与其租约绑定在一起：只有拿到租约才能构造，释放时先关闭设备再释放锁。
pub struct Leased<S: CaptureSource> {
    source: S,
    lease: Option<DeviceLease>,
}

impl<S: CaptureSource> Leased<S> {
    /// 为采集源获取租约
    pub fn acquire(source: S, lock_path: impl AsRef<Path>) -> Result<Self, LeaseError> {
        let lease = DeviceLease::acquire(source.device_id(), lock_path)?;
        Ok(Self {
            source,
            lease: Some(lease),
        })
    }

    /// 使用默认锁路径获取租约
    pub fn acquire_default(source: S) -> Result<Self, LeaseError> {
        let path = default_lock_path(source.device_id());
        Self::acquire(source, path)
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn source_mut(&mut self) -> &mut S {
        &mut self.source
    }

    pub fn lease(&self) -> Option<&DeviceLease> {
        self.lease.as_ref()
    }

    /// 显式释放：关闭设备，然后释放租约
    pub fn release(mut self) {
        self.release_inner();
    }

    fn release_inner(&mut self) {
        if let Some(lease) = self.lease.take() {
            self.source.release();
            drop(lease);
        }
    }
}

impl<S: CaptureSource> Drop for Leased<S> {
    fn drop(&mut self) {
        self.release_inner();
    }
}
