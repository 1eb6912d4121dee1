//! 协议常量定义
//!
//! 寄存器量程和换算系数来自编码器手册：
//! - 角度（°）= 角度寄存器 × 360 / 32768
//! - 角速度（°/s）= 角速度寄存器 × 360 / 32768 / 采样时间（s）
//! - 温度（°C）= 温度寄存器 / 100

/// 可解码帧的负载长度
pub const FRAME_PAYLOAD_LEN: usize = 8;

/// 消息标记的首字节（所有主动上报帧共用）
pub const MARKER_PREFIX: u8 = 0x55;

/// 角度/角速度/圈数帧标记
pub const ANGLE_MARKER: [u8; 2] = [MARKER_PREFIX, 0x55];

/// 温度帧标记
pub const TEMPERATURE_MARKER: [u8; 2] = [MARKER_PREFIX, 0x56];

/// 寄存器满量程（一圈对应的计数）
pub const REGISTER_FULL_SCALE: f64 = 32768.0;

/// 一圈的角度
pub const DEGREES_PER_REVOLUTION: f64 = 360.0;

/// 每个寄存器计数对应的角度
pub const DEGREES_PER_COUNT: f64 = DEGREES_PER_REVOLUTION / REGISTER_FULL_SCALE;

/// 温度寄存器缩放系数（0.01 °C / LSB）
pub const TEMPERATURE_SCALE: f64 = 100.0;

/// 默认角速度采样时间（秒），出厂值 100 ms
pub const DEFAULT_SAMPLE_TIME_S: f64 = 0.1;

/// 负载内寄存器偏移
pub mod offsets {
    /// 角度寄存器 / 温度寄存器
    pub const FIRST_REGISTER: usize = 2;
    /// 角速度寄存器
    pub const SECOND_REGISTER: usize = 4;
    /// 圈数寄存器
    pub const THIRD_REGISTER: usize = 6;
}
