//! # 配置文件
//!
//! TOML 格式的编码器接口配置，字段缺省时取默认值：
//!
//! ```toml
//! interface = "can0"
//! can_ids = [0x101, 0x102]
//! sample_time_s = 0.1
//! receive_timeout_ms = 100
//! message_filter = "all"      # all | angle | temperature
//! track_deltas = false
//! error_backoff_ms = 10
//! ```

use crate::dispatch::MessageFilter;
use crate::error::DriverError;
use encoder_protocol::DEFAULT_SAMPLE_TIME_S;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_INTERFACE: &str = "can0";

/// 编码器接口配置
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EncoderConfig {
    /// SocketCAN 接口名
    pub interface: String,
    /// CAN ID 白名单（空表示接受全部）
    pub can_ids: Vec<u32>,
    /// 设备采样时间（秒），用于换算角速度
    pub sample_time_s: f64,
    /// 单次读取超时（毫秒），不设置则无限阻塞
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receive_timeout_ms: Option<u64>,
    pub message_filter: MessageFilter,
    pub track_deltas: bool,
    /// 可恢复错误后的退避（毫秒）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_backoff_ms: Option<u64>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            interface: DEFAULT_INTERFACE.to_string(),
            can_ids: Vec::new(),
            sample_time_s: DEFAULT_SAMPLE_TIME_S,
            receive_timeout_ms: None,
            message_filter: MessageFilter::All,
            track_deltas: false,
            error_backoff_ms: None,
        }
    }
}

impl EncoderConfig {
    /// 解析并校验 TOML 文本
    pub fn from_toml_str(content: &str) -> Result<Self, DriverError> {
        let config: Self =
            toml::from_str(content).map_err(|e| DriverError::InvalidConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// 从文件加载
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, DriverError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| DriverError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn to_toml_string(&self) -> Result<String, DriverError> {
        toml::to_string(self).map_err(|e| DriverError::InvalidConfig(e.to_string()))
    }

    /// 保存到文件
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), DriverError> {
        let path = path.as_ref();
        let content = self.to_toml_string()?;
        fs::write(path, content).map_err(|source| DriverError::ConfigIo {
            path: path.to_path_buf(),
            source,
        })
    }

    /// 校验取值范围
    pub fn validate(&self) -> Result<(), DriverError> {
        if self.interface.is_empty() {
            return Err(DriverError::InvalidConfig(
                "interface must not be empty".to_string(),
            ));
        }
        if !self.sample_time_s.is_finite() || self.sample_time_s <= 0.0 {
            return Err(DriverError::InvalidConfig(format!(
                "sample_time_s must be a positive number, got {}",
                self.sample_time_s
            )));
        }
        if self.receive_timeout_ms == Some(0) {
            return Err(DriverError::InvalidConfig(
                "receive_timeout_ms must be > 0 (omit it to block indefinitely)".to_string(),
            ));
        }
        if let Some(id) = self.can_ids.iter().find(|id| **id > 0x1FFF_FFFF) {
            return Err(DriverError::InvalidConfig(format!(
                "CAN ID 0x{:X} exceeds the 29-bit range",
                id
            )));
        }
        Ok(())
    }

    pub fn receive_timeout(&self) -> Option<Duration> {
        self.receive_timeout_ms.map(Duration::from_millis)
    }

    pub fn error_backoff(&self) -> Option<Duration> {
        self.error_backoff_ms.map(Duration::from_millis)
    }
}
