//! 消息类型分类
//!
//! 由负载前两个字节组成的标记决定帧的寄存器布局。

use crate::constants::{ANGLE_MARKER, TEMPERATURE_MARKER};

/// 消息类型
///
/// 标记按 `data[0] << 8 | data[1]` 组合后映射，未知标记统一归为 `Unclassified`。
///
/// ```rust
/// use encoder_protocol::MessageKind;
///
/// assert_eq!(MessageKind::classify(&[0x55, 0x55, 0, 0, 0, 0, 0, 0]), MessageKind::Angle);
/// assert_eq!(MessageKind::classify(&[0x55, 0x56, 0, 0, 0, 0, 0, 0]), MessageKind::Temperature);
/// assert_eq!(MessageKind::classify(&[0x55, 0x5F, 0, 0, 0, 0, 0, 0]), MessageKind::Unclassified);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, num_enum::FromPrimitive)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[repr(u16)]
pub enum MessageKind {
    /// 角度 + 角速度 + 圈数（`0x55 0x55`）
    Angle = 0x5555,
    /// 温度（`0x55 0x56`）
    Temperature = 0x5556,
    /// 保留/未知标记
    #[default]
    Unclassified = 0x0000,
}

impl MessageKind {
    /// 根据负载前两个字节分类
    pub fn classify(data: &[u8; 8]) -> Self {
        Self::from_marker([data[0], data[1]])
    }

    /// 根据标记分类
    pub fn from_marker(marker: [u8; 2]) -> Self {
        Self::from(u16::from_be_bytes(marker))
    }

    /// 该类型对应的标记（`Unclassified` 没有标记）
    pub fn marker(self) -> Option<[u8; 2]> {
        match self {
            Self::Angle => Some(ANGLE_MARKER),
            Self::Temperature => Some(TEMPERATURE_MARKER),
            Self::Unclassified => None,
        }
    }

    /// 是否为已知（可解码）类型
    pub fn is_known(self) -> bool {
        !matches!(self, Self::Unclassified)
    }
}
