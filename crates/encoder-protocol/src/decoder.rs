//! 寄存器解码
//!
//! 负载布局（8 字节，寄存器低字节在前）：
//!
//! ```text
//! 角度帧:  55 55 | angle_lo angle_hi | vel_lo vel_hi | rot_lo rot_hi
//! 温度帧:  55 56 | temp_lo  temp_hi  | 保留 ...
//! ```
//!
//! `RegisterDecoder` 的解码函数是纯函数、全函数：调用方先用标记分类，
//! 解码本身从不失败。需要带校验的解析时使用 `TryFrom<EncoderFrame>`。

use crate::constants::*;
use crate::{EncoderFrame, MessageKind, ProtocolError, register_at};

/// 角度帧原始寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AngleRegisters {
    pub angle_raw: u16,
    pub angular_velocity_raw: u16,
    pub rotation_count: u16,
}

impl AngleRegisters {
    /// 从负载提取寄存器（不校验标记）
    pub fn from_payload(data: &[u8; 8]) -> Self {
        Self {
            angle_raw: register_at(data, offsets::FIRST_REGISTER),
            angular_velocity_raw: register_at(data, offsets::SECOND_REGISTER),
            rotation_count: register_at(data, offsets::THIRD_REGISTER),
        }
    }
}

impl TryFrom<EncoderFrame> for AngleRegisters {
    type Error = ProtocolError;

    fn try_from(frame: EncoderFrame) -> Result<Self, Self::Error> {
        frame.validate()?;
        expect_kind(&frame, MessageKind::Angle)?;
        Ok(Self::from_payload(&frame.data))
    }
}

/// 温度帧原始寄存器
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureRegisters {
    pub temperature_raw: u16,
}

impl TemperatureRegisters {
    /// 从负载提取寄存器（不校验标记）
    pub fn from_payload(data: &[u8; 8]) -> Self {
        Self {
            temperature_raw: register_at(data, offsets::FIRST_REGISTER),
        }
    }
}

impl TryFrom<EncoderFrame> for TemperatureRegisters {
    type Error = ProtocolError;

    fn try_from(frame: EncoderFrame) -> Result<Self, Self::Error> {
        frame.validate()?;
        expect_kind(&frame, MessageKind::Temperature)?;
        Ok(Self::from_payload(&frame.data))
    }
}

fn expect_kind(frame: &EncoderFrame, expected: MessageKind) -> Result<(), ProtocolError> {
    if frame.kind() == expected {
        Ok(())
    } else {
        Err(ProtocolError::UnexpectedMarker {
            expected,
            actual: [frame.data[0], frame.data[1]],
        })
    }
}

/// 角度读数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AngleReading {
    pub can_id: u32,
    pub angle_raw: u16,
    /// 角度（°），`angle_raw < 32768` 时位于 `[0, 360)`
    pub angle_deg: f64,
    pub angular_velocity_raw: u16,
    pub angular_velocity_deg_per_s: f64,
    pub rotation_count: u16,
}

impl AngleReading {
    /// 圈数寄存器按有符号 16 位解释
    ///
    /// 多圈模式下反转会使计数变为负数（如 `0xFFF2` 即 -14 圈）。
    pub fn signed_rotation_count(&self) -> i16 {
        self.rotation_count as i16
    }

    /// 角速度寄存器按有符号 16 位解释（反向旋转为负）
    pub fn signed_angular_velocity_raw(&self) -> i16 {
        self.angular_velocity_raw as i16
    }

    /// 原始寄存器视图
    pub fn registers(&self) -> AngleRegisters {
        AngleRegisters {
            angle_raw: self.angle_raw,
            angular_velocity_raw: self.angular_velocity_raw,
            rotation_count: self.rotation_count,
        }
    }
}

/// 温度读数
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TemperatureReading {
    pub can_id: u32,
    pub temperature_raw: u16,
    /// 温度（°C），保留小数部分（0.01 °C 分辨率）
    pub temperature_c: f64,
}

impl TemperatureReading {
    pub fn signed_temperature_raw(&self) -> i16 {
        self.temperature_raw as i16
    }

    /// 温度寄存器按有符号 16 位解释后的摄氏度
    ///
    /// 零下温度以补码上报（`0xFF38` 即 -2.00 °C），
    /// 此时 `temperature_c` 会给出 655 °C 附近的值。
    pub fn signed_temperature_c(&self) -> f64 {
        self.signed_temperature_raw() as f64 / TEMPERATURE_SCALE
    }
}

/// 寄存器解码器
///
/// 角速度换算依赖设备配置的采样时间，因此采样时间在构造时确定，
/// 而不是每次调用传入。
///
/// ```rust
/// use encoder_protocol::RegisterDecoder;
///
/// let decoder = RegisterDecoder::default();
/// let reading = decoder.decode_temperature(0x101, &[0x55, 0x56, 0xD6, 0x09, 0, 0, 0, 0]);
/// assert!((reading.temperature_c - 25.18).abs() < 1e-9);
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegisterDecoder {
    sample_time_s: f64,
}

impl Default for RegisterDecoder {
    fn default() -> Self {
        Self {
            sample_time_s: DEFAULT_SAMPLE_TIME_S,
        }
    }
}

impl RegisterDecoder {
    /// 使用指定的角速度采样时间创建解码器
    ///
    /// # 错误
    /// - `ProtocolError::InvalidSampleTime`: 采样时间非有限值或不大于 0
    pub fn new(sample_time_s: f64) -> Result<Self, ProtocolError> {
        if !sample_time_s.is_finite() || sample_time_s <= 0.0 {
            return Err(ProtocolError::InvalidSampleTime(sample_time_s));
        }
        Ok(Self { sample_time_s })
    }

    /// 角速度采样时间（秒）
    pub fn sample_time_s(&self) -> f64 {
        self.sample_time_s
    }

    /// 解码角度帧
    ///
    /// 调用方负责先确认标记为 `0x55 0x55`。
    pub fn decode_angle(&self, can_id: u32, data: &[u8; 8]) -> AngleReading {
        let regs = AngleRegisters::from_payload(data);
        self.angle_from_registers(can_id, regs)
    }

    /// 由原始寄存器换算角度读数
    pub fn angle_from_registers(&self, can_id: u32, regs: AngleRegisters) -> AngleReading {
        AngleReading {
            can_id,
            angle_raw: regs.angle_raw,
            angle_deg: regs.angle_raw as f64 * DEGREES_PER_REVOLUTION / REGISTER_FULL_SCALE,
            angular_velocity_raw: regs.angular_velocity_raw,
            angular_velocity_deg_per_s: regs.angular_velocity_raw as f64 * DEGREES_PER_COUNT
                / self.sample_time_s,
            rotation_count: regs.rotation_count,
        }
    }

    /// 解码温度帧
    ///
    /// 调用方负责先确认标记为 `0x55 0x56`。
    pub fn decode_temperature(&self, can_id: u32, data: &[u8; 8]) -> TemperatureReading {
        let regs = TemperatureRegisters::from_payload(data);
        TemperatureReading {
            can_id,
            temperature_raw: regs.temperature_raw,
            temperature_c: regs.temperature_raw as f64 / TEMPERATURE_SCALE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn angle_payload(angle: u16, vel: u16, rot: u16) -> [u8; 8] {
        let [a0, a1] = angle.to_le_bytes();
        let [v0, v1] = vel.to_le_bytes();
        let [r0, r1] = rot.to_le_bytes();
        [0x55, 0x55, a0, a1, v0, v1, r0, r1]
    }

    #[test]
    fn test_decode_angle_zero_with_rotations() {
        let decoder = RegisterDecoder::default();
        let data = [0x55, 0x55, 0x00, 0x00, 0x00, 0x00, 0x05, 0x00];
        let reading = decoder.decode_angle(0x101, &data);

        assert_eq!(reading.can_id, 0x101);
        assert_eq!(reading.angle_raw, 0);
        assert_eq!(reading.angle_deg, 0.0);
        assert_eq!(reading.angular_velocity_deg_per_s, 0.0);
        assert_eq!(reading.rotation_count, 5);
    }

    #[test]
    fn test_decode_angle_boundaries() {
        let decoder = RegisterDecoder::default();

        let max = decoder.decode_angle(0x1, &angle_payload(32767, 0, 0));
        assert!(max.angle_deg < 360.0);
        assert!((max.angle_deg - 359.989).abs() < 1e-3, "{}", max.angle_deg);

        let half = decoder.decode_angle(0x1, &angle_payload(16384, 0, 0));
        assert_eq!(half.angle_deg, 180.0);

        // 不截断：1 个计数约 0.011°
        let one = decoder.decode_angle(0x1, &angle_payload(1, 0, 0));
        assert!((one.angle_deg - 0.010986328125).abs() < 1e-12);
    }

    #[test]
    fn test_decode_angle_little_endian_registers() {
        let decoder = RegisterDecoder::default();
        let data = [0x55, 0x55, 0x3C, 0x00, 0x10, 0x00, 0xF2, 0xFF];
        let reading = decoder.decode_angle(0x50, &data);

        assert_eq!(reading.angle_raw, 0x003C);
        assert_eq!(reading.angular_velocity_raw, 0x0010);
        assert_eq!(reading.rotation_count, 0xFFF2);
        assert_eq!(reading.signed_rotation_count(), -14);
    }

    #[test]
    fn test_angular_velocity_uses_sample_time() {
        let data = angle_payload(0, 100, 0);

        let default = RegisterDecoder::default().decode_angle(0x1, &data);
        let expected = 100.0 * (360.0 / 32768.0) / 0.1;
        assert!((default.angular_velocity_deg_per_s - expected).abs() < 1e-9);

        let slow = RegisterDecoder::new(0.2).unwrap().decode_angle(0x1, &data);
        assert!((slow.angular_velocity_deg_per_s - expected / 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_signed_angular_velocity_raw() {
        let reading = RegisterDecoder::default().decode_angle(0x1, &angle_payload(0, 0xFFFF, 0));
        assert_eq!(reading.angular_velocity_raw, 0xFFFF);
        assert_eq!(reading.signed_angular_velocity_raw(), -1);
    }

    #[test]
    fn test_decode_temperature_keeps_fraction() {
        let decoder = RegisterDecoder::default();

        let [lo, hi] = 2550u16.to_le_bytes();
        let reading = decoder.decode_temperature(0x7, &[0x55, 0x56, lo, hi, 0, 0, 0, 0]);
        assert_eq!(reading.temperature_raw, 2550);
        assert_eq!(reading.temperature_c, 25.5);

        let reading = decoder.decode_temperature(0x101, &[0x55, 0x56, 0xD6, 0x09, 0, 0, 0, 0]);
        assert_eq!(reading.temperature_raw, 2518);
        assert!((reading.temperature_c - 25.18).abs() < 1e-9);
    }

    #[test]
    fn test_signed_temperature_below_zero() {
        let decoder = RegisterDecoder::default();

        let [lo, hi] = (-200i16).to_le_bytes();
        let reading = decoder.decode_temperature(0x7, &[0x55, 0x56, lo, hi, 0, 0, 0, 0]);
        assert_eq!(reading.temperature_raw, 0xFF38);
        assert!((reading.temperature_c - 653.36).abs() < 1e-9);
        assert_eq!(reading.signed_temperature_raw(), -200);
        assert_eq!(reading.signed_temperature_c(), -2.0);

        // 正温度两种解释一致
        let reading = decoder.decode_temperature(0x7, &[0x55, 0x56, 0xD6, 0x09, 0, 0, 0, 0]);
        assert_eq!(reading.signed_temperature_c(), reading.temperature_c);
    }

    #[test]
    fn test_new_rejects_invalid_sample_time() {
        assert!(matches!(
            RegisterDecoder::new(0.0),
            Err(ProtocolError::InvalidSampleTime(_))
        ));
        assert!(RegisterDecoder::new(-0.1).is_err());
        assert!(RegisterDecoder::new(f64::NAN).is_err());
        assert!(RegisterDecoder::new(f64::INFINITY).is_err());
        assert_eq!(RegisterDecoder::new(0.05).unwrap().sample_time_s(), 0.05);
    }

    #[test]
    fn test_angle_registers_try_from() {
        let frame = EncoderFrame::new_standard(0x101, &angle_payload(10, 20, 30));
        let regs = AngleRegisters::try_from(frame).unwrap();
        assert_eq!(
            regs,
            AngleRegisters {
                angle_raw: 10,
                angular_velocity_raw: 20,
                rotation_count: 30
            }
        );

        let short = EncoderFrame::new_standard(0x101, &[0x55, 0x55, 0, 0]);
        assert!(matches!(
            AngleRegisters::try_from(short),
            Err(ProtocolError::InvalidLength {
                expected: 8,
                actual: 4
            })
        ));

        let temp = EncoderFrame::new_standard(0x101, &[0x55, 0x56, 0, 0, 0, 0, 0, 0]);
        assert!(matches!(
            AngleRegisters::try_from(temp),
            Err(ProtocolError::UnexpectedMarker {
                expected: MessageKind::Angle,
                actual: [0x55, 0x56]
            })
        ));
    }

    #[test]
    fn test_temperature_registers_try_from() {
        let frame = EncoderFrame::new_standard(0x101, &[0x55, 0x56, 0xD6, 0x09, 0, 0, 0, 0]);
        let regs = TemperatureRegisters::try_from(frame).unwrap();
        assert_eq!(regs.temperature_raw, 2518);

        let angle = EncoderFrame::new_standard(0x101, &angle_payload(0, 0, 0));
        assert!(TemperatureRegisters::try_from(angle).is_err());
    }

    #[test]
    fn test_reading_registers_view() {
        let decoder = RegisterDecoder::default();
        let reading = decoder.decode_angle(0x1, &angle_payload(1, 2, 3));
        let regs = reading.registers();
        assert_eq!(decoder.angle_from_registers(0x1, regs), reading);
    }
}
