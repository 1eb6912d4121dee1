//! 驱动层错误类型定义

use crate::hooks::EventKind;
use encoder_can::CanError;
use encoder_protocol::ProtocolError;
use std::path::PathBuf;
use thiserror::Error;

/// 驱动层错误类型
#[derive(Error, Debug)]
pub enum DriverError {
    /// CAN 通道错误
    #[error("CAN channel error: {0}")]
    Can(#[from] CanError),

    /// 协议解析错误
    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// 配置无效（采样时间、超时、过滤模式等）
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// 配置文件读取失败
    #[error("Failed to read config file {path:?}: {source}")]
    ConfigIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// 读线程错误（创建失败或 panic）
    #[error("Reader thread error: {0}")]
    ReaderThread(String),

    /// 等待读线程退出超时
    #[error("Operation timeout")]
    Timeout,
}

/// 单个订阅者执行失败的报告
///
/// 订阅者 panic 会在分发边界被捕获并转换为此结构，后续订阅者照常执行。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Observer #{subscription_id} panicked on {event:?} (CAN ID 0x{can_id:X}): {message}")]
pub struct ObserverError {
    pub event: EventKind,
    pub subscription_id: u64,
    pub can_id: u32,
    pub message: String,
}

impl ObserverError {
    /// 从 `catch_unwind` 的 panic 负载中提取消息
    pub(crate) fn from_panic(
        event: EventKind,
        subscription_id: u64,
        can_id: u32,
        payload: &(dyn std::any::Any + Send),
    ) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self {
            event,
            subscription_id,
            can_id,
            message,
        }
    }
}
