//! CAN 接口状态检查
//!
//! 通过 `if_nametoindex()` + `ioctl(SIOCGIFFLAGS)` 只读地查询接口，
//! 不修改任何配置，普通用户即可调用。

use crate::{CanDeviceError, CanDeviceErrorKind, CanError};
use libc::{AF_INET, IFF_UP, SIOCGIFFLAGS, SOCK_DGRAM, if_nametoindex, ifreq};
use std::ffi::CString;
use std::io;
use tracing::trace;

/// ifr_name 为 IFNAMSIZ = 16 字节（含结尾 NUL）
const MAX_IFACE_NAME_LEN: usize = 15;

/// 接口查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InterfaceStatus {
    pub name: String,
    /// 内核接口索引
    pub index: u32,
    /// 管理态是否为 UP
    pub is_up: bool,
}

/// 查询接口是否存在以及是否为 UP
///
/// # 错误
/// - `CanDeviceErrorKind::InvalidInterfaceName`: 名称过长或包含 NUL
/// - `CanDeviceErrorKind::NotFound`: 接口不存在（消息中附带创建命令）
/// - `CanError::Io`: socket / ioctl 调用失败
pub fn check_interface_status(interface: &str) -> Result<InterfaceStatus, CanError> {
    if interface.is_empty() || interface.len() > MAX_IFACE_NAME_LEN {
        return Err(CanDeviceError::new(
            CanDeviceErrorKind::InvalidInterfaceName,
            format!(
                "Interface name '{}' must be 1..={} characters long",
                interface, MAX_IFACE_NAME_LEN
            ),
        )
        .into());
    }

    let c_iface = CString::new(interface).map_err(|e| {
        CanDeviceError::new(
            CanDeviceErrorKind::InvalidInterfaceName,
            format!("Invalid interface name: {}", e),
        )
    })?;

    let index = unsafe { if_nametoindex(c_iface.as_ptr()) };
    if index == 0 {
        let errno = io::Error::last_os_error();
        return Err(CanDeviceError::new(
            CanDeviceErrorKind::NotFound,
            format!(
                "CAN interface '{}' does not exist ({}). Create it first:\n  sudo ip link add dev {} type can",
                interface, errno, interface
            ),
        )
        .into());
    }

    let mut ifr: ifreq = unsafe { std::mem::zeroed() };
    let name_bytes = c_iface.as_bytes_with_nul();
    for (dst, src) in ifr.ifr_name.iter_mut().zip(name_bytes) {
        *dst = *src as libc::c_char;
    }

    struct FdGuard(libc::c_int);
    impl Drop for FdGuard {
        fn drop(&mut self) {
            if self.0 >= 0 {
                unsafe { libc::close(self.0) };
            }
        }
    }

    let sockfd = unsafe { libc::socket(AF_INET, SOCK_DGRAM, 0) };
    if sockfd < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }
    let _guard = FdGuard(sockfd);

    let result = unsafe { libc::ioctl(sockfd, SIOCGIFFLAGS, &mut ifr as *mut ifreq) };
    if result < 0 {
        return Err(CanError::Io(io::Error::last_os_error()));
    }

    // ifru_flags 是 ifr_ifru 联合体的第一个字段
    let flags = unsafe { *(std::ptr::addr_of!(ifr.ifr_ifru) as *const libc::c_short) };
    let is_up = (flags as i32 & IFF_UP) != 0;

    trace!(
        "Interface '{}' (index {}) is {}",
        interface,
        index,
        if is_up { "UP" } else { "DOWN" }
    );

    Ok(InterfaceStatus {
        name: interface.to_string(),
        index,
        is_up,
    })
}

/// 要求接口存在且为 UP，否则返回带修复提示的设备错误
pub fn ensure_interface_up(interface: &str) -> Result<InterfaceStatus, CanError> {
    let status = check_interface_status(interface)?;
    if !status.is_up {
        return Err(CanDeviceError::new(
            CanDeviceErrorKind::InterfaceDown,
            format!(
                "CAN interface '{}' exists but is not UP. Start it first:\n  sudo ip link set up {}",
                interface, interface
            ),
        )
        .into());
    }
    Ok(status)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::process::Command;

    fn interface_exists(interface: &str) -> bool {
        Command::new("ip")
            .args(["link", "show", interface])
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    fn device_kind(result: Result<InterfaceStatus, CanError>) -> CanDeviceErrorKind {
        match result {
            Err(CanError::Device(e)) => e.kind,
            other => panic!("Expected Device error, got: {:?}", other),
        }
    }

    #[test]
    fn test_missing_interface_is_not_found() {
        let result = check_interface_status("enc999");
        match result {
            Err(CanError::Device(e)) => {
                assert_eq!(e.kind, CanDeviceErrorKind::NotFound);
                assert!(e.message.contains("ip link add"), "got: {}", e.message);
            },
            other => panic!("Expected NotFound, got: {:?}", other),
        }
    }

    #[test]
    fn test_invalid_names() {
        assert_eq!(
            device_kind(check_interface_status("can0\0")),
            CanDeviceErrorKind::InvalidInterfaceName
        );
        assert_eq!(
            device_kind(check_interface_status(&"a".repeat(20))),
            CanDeviceErrorKind::InvalidInterfaceName
        );
        assert_eq!(
            device_kind(check_interface_status("")),
            CanDeviceErrorKind::InvalidInterfaceName
        );
    }

    #[test]
    fn test_missing_interface_is_fatal() {
        let err = ensure_interface_up("enc998").unwrap_err();
        assert!(err.is_fatal());
    }

    #[test]
    fn test_vcan0_status() {
        if !interface_exists("vcan0") {
            eprintln!("Skipping test: vcan0 does not exist");
            return;
        }
        let status = check_interface_status("vcan0").unwrap();
        assert_eq!(status.name, "vcan0");
        assert!(status.index > 0);
    }
}
