//! # Encoder CAN Channel Layer
//!
//! CAN 硬件抽象层：把具体传输（SocketCAN、测试用 Mock）统一为 `FrameChannel`，
//! 上层的解码/分发逻辑与传输无关。

use std::time::Duration;
use thiserror::Error;

// 重新导出 encoder-protocol 中的 EncoderFrame
pub use encoder_protocol::EncoderFrame;

#[cfg(target_os = "linux")]
pub mod socketcan;

#[cfg(target_os = "linux")]
pub use socketcan::{
    InterfaceStatus, SocketCanChannel, check_interface_status, ensure_interface_up,
};

#[cfg(any(test, feature = "mock"))]
pub mod mock;

#[cfg(any(test, feature = "mock"))]
pub use mock::{MockChannel, MockFeeder, WhenExhausted};

/// CAN 通道层统一错误类型
#[derive(Error, Debug)]
pub enum CanError {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Device Error: {0}")]
    Device(#[from] CanDeviceError),
    #[error("Read timeout")]
    Timeout,
    #[error("Buffer overflow")]
    BufferOverflow,
    #[error("Bus off")]
    BusOff,
    #[error("Channel closed")]
    Closed,
}

impl CanError {
    /// 是否为致命错误（读循环应停止）
    ///
    /// - 致命：通道已关闭、Bus Off、致命设备错误（接口不存在、绑定失败等）、
    ///   描述符失效的 IO 错误（见 [`is_descriptor_gone`]）
    /// - 可恢复：其他单次 IO 错误、缓冲区溢出、超时、其他设备错误
    pub fn is_fatal(&self) -> bool {
        match self {
            CanError::Closed | CanError::BusOff => true,
            CanError::Device(e) => e.is_fatal(),
            CanError::Io(e) => is_descriptor_gone(e),
            CanError::Timeout | CanError::BufferOverflow => false,
        }
    }
}

/// IO 错误是否表示描述符已失效
///
/// 设备拔出（`ENODEV` / `ENXIO`）、接口被关闭（`ENETDOWN`）或 fd 无效（`EBADF`）后，
/// 每次读取都会立即以同样的错误返回，重试没有意义。
pub fn is_descriptor_gone(e: &std::io::Error) -> bool {
    #[cfg(target_os = "linux")]
    {
        matches!(
            e.raw_os_error(),
            Some(libc::ENODEV) | Some(libc::ENXIO) | Some(libc::ENETDOWN) | Some(libc::EBADF)
        )
    }
    #[cfg(not(target_os = "linux"))]
    {
        let _ = e;
        false
    }
}

/// 设备/后端错误的结构化分类
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CanDeviceErrorKind {
    Unknown,
    /// 接口不存在
    NotFound,
    /// 接口存在但未启动（DOWN）
    InterfaceDown,
    /// 无法创建 socket
    SocketCreationFailed,
    /// 无法绑定到接口
    BindFailed,
    AccessDenied,
    /// 接口名非法（过长或包含 NUL）
    InvalidInterfaceName,
    InvalidFrame,
    Backend,
}

/// 结构化设备错误
#[derive(Error, Debug, Clone)]
#[error("{kind:?}: {message}")]
pub struct CanDeviceError {
    pub kind: CanDeviceErrorKind,
    pub message: String,
}

impl CanDeviceError {
    pub fn new(kind: CanDeviceErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind,
            CanDeviceErrorKind::NotFound
                | CanDeviceErrorKind::InterfaceDown
                | CanDeviceErrorKind::SocketCreationFailed
                | CanDeviceErrorKind::BindFailed
                | CanDeviceErrorKind::AccessDenied
                | CanDeviceErrorKind::InvalidInterfaceName
        )
    }
}

impl From<String> for CanDeviceError {
    fn from(message: String) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

impl From<&str> for CanDeviceError {
    fn from(message: &str) -> Self {
        Self::new(CanDeviceErrorKind::Unknown, message)
    }
}

/// 帧通道（只读）
///
/// 打开由具体实现的构造函数完成（如 `SocketCanChannel::open("can0")`），
/// 读取为阻塞调用，`close()` 之后的读取返回 `CanError::Closed`。
///
/// # 超时语义
///
/// - `None`：无限阻塞，直到收到帧或出错
/// - `Some(d)`：最多等待 `d`，到期返回 `CanError::Timeout`（非错误，调用方跳过本次迭代）
pub trait FrameChannel {
    /// 阻塞读取一帧（按当前配置的超时）
    fn receive(&mut self) -> Result<EncoderFrame, CanError>;

    /// 设置读取超时
    fn set_receive_timeout(&mut self, _timeout: Option<Duration>) {}

    /// 以指定超时读取一帧
    ///
    /// 默认实现会覆盖当前超时设置；需要保留原设置的实现应重写此方法。
    fn receive_timeout(&mut self, timeout: Duration) -> Result<EncoderFrame, CanError> {
        self.set_receive_timeout(Some(timeout));
        self.receive()
    }

    /// 非阻塞读取
    fn try_receive(&mut self) -> Result<Option<EncoderFrame>, CanError> {
        match self.receive_timeout(Duration::ZERO) {
            Ok(frame) => Ok(Some(frame)),
            Err(CanError::Timeout) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// 关闭通道并释放底层描述符（幂等）
    fn close(&mut self) {}

    /// 通道是否仍处于打开状态
    fn is_open(&self) -> bool {
        true
    }
}

impl<C: FrameChannel + ?Sized> FrameChannel for Box<C> {
    fn receive(&mut self) -> Result<EncoderFrame, CanError> {
        (**self).receive()
    }

    fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        (**self).set_receive_timeout(timeout)
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<EncoderFrame, CanError> {
        (**self).receive_timeout(timeout)
    }

    fn try_receive(&mut self) -> Result<Option<EncoderFrame>, CanError> {
        (**self).try_receive()
    }

    fn close(&mut self) {
        (**self).close()
    }

    fn is_open(&self) -> bool {
        (**self).is_open()
    }
}
