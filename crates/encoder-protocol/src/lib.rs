//! # Encoder Protocol
//!
//! 旋转编码器 CAN 遥测协议定义（无硬件依赖）
//!
//! ## 模块
//!
//! - `constants`: 协议常量（消息标记、量程、默认采样时间）
//! - `kind`: 消息类型分类（由 `data[0..2]` 决定）
//! - `decoder`: 寄存器解码（角度、角速度、圈数、温度）
//! - `delta`: 同类型相邻帧的负载差分
//!
//! ## 字节序
//!
//! 寄存器使用小端字节序：低字节在前（`data[2]` 为 LSB，`data[3]` 为 MSB）。

pub mod constants;
pub mod decoder;
pub mod delta;
pub mod kind;

pub use constants::*;
pub use decoder::*;
pub use delta::*;
pub use kind::*;

use thiserror::Error;

/// CAN 2.0 帧的统一抽象
///
/// 协议层与 CAN 层之间的中间类型：
///
/// ```text
/// Protocol Layer (encoder-protocol)
///     ↓ RegisterDecoder / TryFrom<EncoderFrame>
/// EncoderFrame (此类型)
///     ↓ 转换逻辑在 CAN 层实现
/// CAN Layer (encoder-can)
///     ↓ SocketCAN / Mock
/// Hardware
/// ```
///
/// - **Copy**：单帧只存活一次循环迭代，按值传递
/// - **固定 8 字节**：未使用部分为 0，`len` 记录有效长度
///
/// ```rust
/// use encoder_protocol::EncoderFrame;
///
/// let frame = EncoderFrame::new_standard(0x101, &[0x55, 0x55, 0, 0, 0, 0, 5, 0]);
/// assert_eq!(frame.id(), 0x101);
/// assert!(frame.is_decodable());
///
/// let short = EncoderFrame::new_standard(0x101, &[0x55, 0x55]);
/// assert!(!short.is_decodable());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct EncoderFrame {
    /// CAN ID（标准帧或扩展帧）
    pub id: u32,

    /// 帧数据（固定 8 字节，未使用部分为 0）
    pub data: [u8; 8],

    /// 有效数据长度 (0-8)
    pub len: u8,

    /// 是否为扩展帧（29-bit ID）
    pub is_extended: bool,

    /// 接收时间戳（微秒），0 表示不可用
    pub timestamp_us: u64,
}

impl EncoderFrame {
    /// 创建标准帧
    pub fn new_standard(id: u16, data: &[u8]) -> Self {
        Self::new(id as u32, data, false)
    }

    /// 创建扩展帧
    pub fn new_extended(id: u32, data: &[u8]) -> Self {
        Self::new(id, data, true)
    }

    fn new(id: u32, data: &[u8], is_extended: bool) -> Self {
        let mut fixed_data = [0u8; 8];
        let len = data.len().min(8);
        fixed_data[..len].copy_from_slice(&data[..len]);

        Self {
            id,
            data: fixed_data,
            len: len as u8,
            is_extended,
            timestamp_us: 0,
        }
    }

    /// 附带时间戳
    pub fn with_timestamp(mut self, timestamp_us: u64) -> Self {
        self.timestamp_us = timestamp_us;
        self
    }

    /// 获取数据切片（只包含有效数据）
    pub fn data_slice(&self) -> &[u8] {
        &self.data[..self.len as usize]
    }

    /// 获取 CAN ID
    pub fn id(&self) -> u32 {
        self.id
    }

    /// 获取完整数据（8字节固定数组）
    pub fn data(&self) -> &[u8; 8] {
        &self.data
    }

    /// 只有满 8 字节的帧才能解码
    pub fn is_decodable(&self) -> bool {
        self.len as usize == FRAME_PAYLOAD_LEN
    }

    /// 校验帧长度
    ///
    /// # 错误
    /// - `ProtocolError::InvalidLength`: `len != 8`
    pub fn validate(&self) -> Result<(), ProtocolError> {
        if self.is_decodable() {
            Ok(())
        } else {
            Err(ProtocolError::InvalidLength {
                expected: FRAME_PAYLOAD_LEN,
                actual: self.len as usize,
            })
        }
    }

    /// 消息类型（由前两个字节决定）
    pub fn kind(&self) -> MessageKind {
        MessageKind::classify(&self.data)
    }
}

/// 协议解析错误类型
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("Invalid frame length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },

    #[error("Unexpected message marker: expected {expected:?}, got [0x{:02X}, 0x{:02X}]", .actual[0], .actual[1])]
    UnexpectedMarker {
        expected: MessageKind,
        actual: [u8; 2],
    },

    #[error("Invalid sample time: {0} s (must be finite and > 0)")]
    InvalidSampleTime(f64),
}

/// 从两个连续字节组装小端 16 位寄存器
///
/// `lo` 为低字节，`hi` 为高字节。
#[inline]
pub fn register_u16_le(lo: u8, hi: u8) -> u16 {
    u16::from_le_bytes([lo, hi])
}

/// 读取负载中 `offset` 处的寄存器（`data[offset]` 为 LSB）
#[inline]
pub fn register_at(data: &[u8; 8], offset: usize) -> u16 {
    register_u16_le(data[offset], data[offset + 1])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_u16_le_low_byte_first() {
        assert_eq!(register_u16_le(0xD6, 0x09), 0x09D6);
        assert_eq!(register_u16_le(0xFF, 0x00), 0x00FF);
        assert_eq!(register_u16_le(0x00, 0x80), 0x8000);
    }

    #[test]
    fn test_register_at_offsets() {
        let data = [0x55, 0x55, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06];
        assert_eq!(register_at(&data, 2), 0x0201);
        assert_eq!(register_at(&data, 4), 0x0403);
        assert_eq!(register_at(&data, 6), 0x0605);
    }

    #[test]
    fn test_frame_new_standard_pads_data() {
        let frame = EncoderFrame::new_standard(0x50, &[1, 2, 3]);
        assert_eq!(frame.len, 3);
        assert_eq!(frame.data, [1, 2, 3, 0, 0, 0, 0, 0]);
        assert_eq!(frame.data_slice(), &[1, 2, 3]);
        assert!(!frame.is_extended);
        assert_eq!(frame.timestamp_us, 0);
    }

    #[test]
    fn test_frame_truncates_oversized_payload() {
        let frame = EncoderFrame::new_extended(0x1234_5678, &[0xAA; 12]);
        assert_eq!(frame.len, 8);
        assert!(frame.is_extended);
        assert!(frame.is_decodable());
    }

    #[test]
    fn test_extended_flag_does_not_follow_id_range() {
        // 扩展帧的 ID 可以落在标准帧范围内
        let low_ext = EncoderFrame::new_extended(0x101, &[0; 8]);
        assert!(low_ext.is_extended);
        assert_eq!(low_ext.id, 0x101);

        let std_max = EncoderFrame::new_standard(0x7FF, &[0; 8]);
        assert!(!std_max.is_extended);
        assert_ne!(low_ext, EncoderFrame::new_standard(0x101, &[0; 8]));
    }

    #[test]
    fn test_frame_validate() {
        let ok = EncoderFrame::new_standard(0x101, &[0; 8]);
        assert!(ok.validate().is_ok());

        let short = EncoderFrame::new_standard(0x101, &[0; 4]);
        assert_eq!(
            short.validate(),
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 4
            })
        );
    }

    #[test]
    fn test_protocol_error_display() {
        let err = ProtocolError::InvalidLength {
            expected: 8,
            actual: 2,
        };
        assert_eq!(err.to_string(), "Invalid frame length: expected 8, got 2");

        let err = ProtocolError::UnexpectedMarker {
            expected: MessageKind::Angle,
            actual: [0x55, 0x56],
        };
        let msg = err.to_string();
        assert!(msg.contains("Angle") && msg.contains("0x56"), "{}", msg);

        let err = ProtocolError::InvalidSampleTime(0.0);
        assert!(err.to_string().contains("Invalid sample time"));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_frame_serde_json() {
        let frame = EncoderFrame::new_standard(0x101, &[0x55, 0x56, 0xD6, 0x09, 0, 0, 0, 0]);
        let json = serde_json::to_string(&frame).unwrap();
        let back: EncoderFrame = serde_json::from_str(&json).unwrap();
        assert_eq!(frame, back);
    }
}
