//! SocketCAN 帧通道
//!
//! Linux 内核 CAN 子系统的只读通道实现。
//!
//! ## 限制
//!
//! - **仅限 Linux 平台**
//! - 波特率等由系统工具（`ip link`）配置，不在应用层设置
//! - 错误帧在通道内部过滤，Bus Off / 缓冲区溢出转换为对应的 `CanError`

use crate::{CanDeviceError, CanDeviceErrorKind, CanError, EncoderFrame, FrameChannel};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use socketcan::{
    CanError as SocketCanError, CanErrorFrame, CanFrame, CanSocket, EmbeddedFrame, Frame, Socket,
};
use std::convert::TryFrom;
use std::io;
use std::os::fd::{AsRawFd, BorrowedFd};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{error, trace, warn};

mod interface_check;

pub use interface_check::{InterfaceStatus, check_interface_status, ensure_interface_up};

/// SocketCAN 通道
///
/// # 示例
///
/// ```no_run
/// use encoder_can::{FrameChannel, SocketCanChannel};
/// use std::time::Duration;
///
/// let mut channel = SocketCanChannel::open("can0").unwrap();
/// channel.set_receive_timeout(Some(Duration::from_millis(100)));
/// let frame = channel.receive().unwrap();
/// println!("0x{:X}: {:02X?}", frame.id, frame.data_slice());
/// ```
#[derive(Debug)]
pub struct SocketCanChannel {
    /// `None` 表示已关闭
    socket: Option<CanSocket>,
    interface: String,
    /// `None` 为无限阻塞
    read_timeout: Option<Duration>,
}

impl SocketCanChannel {
    /// 打开 CAN 接口
    ///
    /// 打开前检查接口存在且为 UP，失败时返回带修复提示的设备错误。
    ///
    /// # 错误
    /// - `CanDeviceErrorKind::NotFound` / `InterfaceDown` / `InvalidInterfaceName`
    /// - `CanDeviceErrorKind::AccessDenied`: 权限不足
    /// - `CanDeviceErrorKind::SocketCreationFailed` / `BindFailed`
    pub fn open(interface: impl Into<String>) -> Result<Self, CanError> {
        let interface = interface.into();

        ensure_interface_up(&interface)?;
        trace!("CAN interface '{}' is UP, opening socket", interface);

        let socket = CanSocket::open(&interface).map_err(|e| open_error(&interface, e))?;

        trace!("SocketCAN interface '{}' opened", interface);
        Ok(Self {
            socket: Some(socket),
            interface,
            read_timeout: None,
        })
    }

    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }

    /// 等待可读
    ///
    /// 返回 `Ok(false)` 表示超时。被信号中断（EINTR）也按超时处理，
    /// 让调用方有机会检查取消标志。
    fn wait_readable(socket: &CanSocket, timeout: Option<Duration>) -> Result<bool, CanError> {
        let poll_timeout = match timeout {
            None => PollTimeout::NONE,
            Some(d) => PollTimeout::from(d.as_millis().min(u16::MAX as u128) as u16),
        };
        // socket 在本函数期间保持存活
        let fd = unsafe { BorrowedFd::borrow_raw(socket.as_raw_fd()) };
        let mut fds = [PollFd::new(fd, PollFlags::POLLIN)];
        match poll(&mut fds, poll_timeout) {
            Ok(0) => Ok(false),
            Ok(_) => Ok(true),
            Err(Errno::EINTR) => Ok(false),
            Err(e) => Err(CanError::Io(io::Error::other(format!("poll failed: {}", e)))),
        }
    }

    /// 把内核错误帧映射为通道错误
    ///
    /// 返回 `None` 表示该错误帧可以忽略，继续读取下一帧。
    fn map_error_frame(frame: CanFrame) -> Option<CanError> {
        let Ok(error_frame) = CanErrorFrame::try_from(frame) else {
            warn!("Received CAN error frame but failed to parse, ignoring");
            return None;
        };
        match SocketCanError::from(error_frame) {
            SocketCanError::BusOff => {
                error!("CAN Bus Off error detected");
                Some(CanError::BusOff)
            },
            SocketCanError::ControllerProblem(problem) => {
                let text = problem.to_string();
                if text.to_lowercase().contains("overflow") {
                    error!("CAN Buffer Overflow detected: {}", problem);
                    Some(CanError::BufferOverflow)
                } else {
                    warn!("CAN Controller Problem: {}, ignoring", problem);
                    None
                }
            },
            other => {
                warn!("CAN Error Frame received: {}, ignoring", other);
                None
            },
        }
    }
}

/// 把 `CanSocket::open` 的失败归类为设备错误
fn open_error(interface: &str, e: io::Error) -> CanError {
    let kind = match e.kind() {
        io::ErrorKind::PermissionDenied => CanDeviceErrorKind::AccessDenied,
        io::ErrorKind::NotFound => CanDeviceErrorKind::NotFound,
        _ => match e.raw_os_error() {
            Some(libc::ENODEV) | Some(libc::EADDRNOTAVAIL) => CanDeviceErrorKind::BindFailed,
            Some(libc::EMFILE) | Some(libc::ENFILE) | Some(libc::EAFNOSUPPORT) => {
                CanDeviceErrorKind::SocketCreationFailed
            },
            _ => CanDeviceErrorKind::BindFailed,
        },
    };
    CanDeviceError::new(
        kind,
        format!("Failed to open CAN interface '{}': {}", interface, e),
    )
    .into()
}

/// 归类 `read` 的失败
///
/// 接口消失或描述符失效时 poll 会立即返回，read 每次都以相同错误失败，
/// 必须报告为致命错误让读循环退出，否则读循环会空转。
fn read_error(interface: &str, e: io::Error) -> CanError {
    if e.kind() == io::ErrorKind::WouldBlock {
        return CanError::Timeout;
    }
    match e.raw_os_error() {
        Some(libc::ENODEV) | Some(libc::ENXIO) => CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!("CAN interface '{}' disappeared: {}", interface, e),
        )
        .into(),
        Some(libc::ENETDOWN) => CanDeviceError::new(
            CanDeviceErrorKind::InterfaceDown,
            format!(
                "CAN interface '{}' went down: {}. Bring it up with:\n  sudo ip link set up {}",
                interface, e, interface
            ),
        )
        .into(),
        Some(libc::EBADF) => CanError::Closed,
        _ => CanError::Io(e),
    }
}

fn now_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

impl FrameChannel for SocketCanChannel {
    /// 阻塞读取一帧
    ///
    /// 错误帧与远程帧不会返回给调用方；时间戳取主机接收时刻（微秒）。
    fn receive(&mut self) -> Result<EncoderFrame, CanError> {
        let timeout = self.read_timeout;
        let socket = self.socket.as_ref().ok_or(CanError::Closed)?;

        loop {
            if !Self::wait_readable(socket, timeout)? {
                return Err(CanError::Timeout);
            }

            let can_frame = match socket.read_frame() {
                Ok(frame) => frame,
                Err(e) => return Err(read_error(&self.interface, e)),
            };

            if can_frame.is_error_frame() {
                match Self::map_error_frame(can_frame) {
                    Some(err) => return Err(err),
                    None => continue,
                }
            }

            if can_frame.is_remote_frame() {
                trace!("Ignoring remote frame 0x{:X}", can_frame.raw_id());
                continue;
            }

            // raw_id() 含标志位，按帧类型取低 29 / 11 位
            let frame = if can_frame.is_extended() {
                EncoderFrame::new_extended(can_frame.raw_id() & 0x1FFF_FFFF, can_frame.data())
            } else {
                EncoderFrame::new_standard((can_frame.raw_id() & 0x7FF) as u16, can_frame.data())
            }
            .with_timestamp(now_micros());

            trace!(
                "Received CAN frame: ID=0x{:X}, len={}, timestamp_us={}",
                frame.id, frame.len, frame.timestamp_us
            );
            return Ok(frame);
        }
    }

    fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    /// 以指定超时读取，之后恢复原设置
    fn receive_timeout(&mut self, timeout: Duration) -> Result<EncoderFrame, CanError> {
        let previous = self.read_timeout;
        self.read_timeout = Some(timeout);
        let result = self.receive();
        self.read_timeout = previous;
        result
    }

    fn close(&mut self) {
        if self.socket.take().is_some() {
            trace!("SocketCAN interface '{}' closed", self.interface);
        }
    }

    fn is_open(&self) -> bool {
        self.socket.is_some()
    }
}

impl Drop for SocketCanChannel {
    fn drop(&mut self) {
        if self.socket.is_some() {
            trace!(
                "[Auto-Drop] SocketCAN interface '{}' closed",
                self.interface
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn vcan0_up() -> bool {
        check_interface_status("vcan0")
            .map(|s| s.is_up)
            .unwrap_or(false)
    }

    fn send_with_cansend(frame: &str) -> bool {
        Command::new("cansend")
            .args(["vcan0", frame])
            .status()
            .map(|s| s.success())
            .unwrap_or(false)
    }

    #[test]
    fn test_open_missing_interface_fails_with_not_found() {
        match SocketCanChannel::open("enc997") {
            Err(CanError::Device(e)) => assert_eq!(e.kind, CanDeviceErrorKind::NotFound),
            other => panic!("Expected NotFound, got: {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn test_open_error_classification() {
        let denied = open_error("can0", io::Error::from(io::ErrorKind::PermissionDenied));
        match denied {
            CanError::Device(e) => assert_eq!(e.kind, CanDeviceErrorKind::AccessDenied),
            other => panic!("unexpected: {:?}", other),
        }
        let emfile = open_error("can0", io::Error::from_raw_os_error(libc::EMFILE));
        match emfile {
            CanError::Device(e) => assert_eq!(e.kind, CanDeviceErrorKind::SocketCreationFailed),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_read_error_classification() {
        let gone = read_error("can0", io::Error::from_raw_os_error(libc::ENODEV));
        match gone {
            CanError::Device(ref e) => assert_eq!(e.kind, CanDeviceErrorKind::NotFound),
            ref other => panic!("unexpected: {:?}", other),
        }
        assert!(gone.is_fatal());

        let down = read_error("can0", io::Error::from_raw_os_error(libc::ENETDOWN));
        match down {
            CanError::Device(ref e) => assert_eq!(e.kind, CanDeviceErrorKind::InterfaceDown),
            ref other => panic!("unexpected: {:?}", other),
        }
        assert!(down.is_fatal());

        let nxio = read_error("can0", io::Error::from_raw_os_error(libc::ENXIO));
        assert!(nxio.is_fatal());

        assert!(matches!(
            read_error("can0", io::Error::from_raw_os_error(libc::EBADF)),
            CanError::Closed
        ));
        assert!(matches!(
            read_error("can0", io::Error::from(io::ErrorKind::WouldBlock)),
            CanError::Timeout
        ));

        let nobufs = read_error("can0", io::Error::from_raw_os_error(libc::ENOBUFS));
        assert!(matches!(nobufs, CanError::Io(_)));
        assert!(!nobufs.is_fatal());
    }

    #[test]
    fn test_vcan0_timeout_and_close() {
        if !vcan0_up() {
            eprintln!("Skipping test: vcan0 not available");
            return;
        }
        let mut channel = SocketCanChannel::open("vcan0").unwrap();
        assert!(channel.is_open());
        assert!(channel.read_timeout().is_none());

        // vcan0 上没有流量时应超时
        let result = channel.receive_timeout(Duration::from_millis(10));
        assert!(matches!(result, Err(CanError::Timeout) | Ok(_)));
        assert!(channel.read_timeout().is_none(), "timeout must be restored");

        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(channel.receive(), Err(CanError::Closed)));
    }

    #[test]
    fn test_vcan0_receive_angle_frame() {
        if !vcan0_up() {
            eprintln!("Skipping test: vcan0 not available");
            return;
        }
        let mut channel = SocketCanChannel::open("vcan0").unwrap();
        channel.set_receive_timeout(Some(Duration::from_millis(500)));
        if !send_with_cansend("101#5555000000000500") {
            eprintln!("Skipping test: cansend not available");
            return;
        }
        let frame = channel.receive().unwrap();
        assert_eq!(frame.id, 0x101);
        assert_eq!(frame.len, 8);
        assert_eq!(frame.data, [0x55, 0x55, 0, 0, 0, 0, 0x05, 0]);
        assert!(frame.timestamp_us > 0);
    }
}
