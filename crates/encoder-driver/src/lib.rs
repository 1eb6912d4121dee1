//! # Encoder Driver
//!
//! 编码器接口的驱动层：
//! - 读循环（单读者，取消令牌，致命/可恢复错误区分）
//! - 帧分发（长度校验、CAN ID 白名单、消息过滤、差分跟踪）
//! - 订阅表（ArcSwap 快照，订阅者 panic 隔离）
//! - 事件总线钩子（有界 crossbeam channel）
//! - Builder 与 TOML 配置
//!
//! # 使用示例
//!
//! ```no_run
//! use encoder_driver::EncoderBuilder;
//! use std::time::Duration;
//!
//! let encoder = EncoderBuilder::new()
//!     .interface("can0")
//!     .receive_timeout(Duration::from_millis(100))
//!     .build()
//!     .unwrap();
//!
//! let _ = encoder.on_temperature(|can_id, celsius| {
//!     println!("0x{can_id:X}: {celsius:.2} °C");
//! });
//!
//! let handle = encoder.spawn().unwrap();
//! std::thread::sleep(Duration::from_secs(5));
//! let reason = handle.stop(Duration::from_secs(1)).unwrap();
//! println!("stopped: {reason}");
//! ```

mod builder;
pub mod config;
pub mod dispatch;
mod error;
pub mod event_bus;
pub mod hooks;
mod interface;
pub mod metrics;
pub mod pipeline;
pub mod state;

pub use builder::EncoderBuilder;
pub use config::EncoderConfig;
pub use dispatch::{DispatchConfig, DispatchReport, Disposition, MessageFilter, TelemetryDispatcher};
pub use error::{DriverError, ObserverError};
pub use event_bus::{EventBusHook, TelemetryEvent};
pub use hooks::{EncoderObserver, EventKind, ObserverRegistry, SubscriptionHandle};
pub use interface::{DEFAULT_JOIN_TIMEOUT, EncoderInterface, InterfaceHandle};
pub use metrics::{DriverMetrics, MetricsSnapshot};
pub use pipeline::{CancellationToken, ReadLoop, ReadLoopConfig, StopReason};
pub use state::{AtomicLoopState, LoopState};

// 常用的下层类型
pub use encoder_can::{CanDeviceError, CanDeviceErrorKind, CanError, FrameChannel};
pub use encoder_protocol::{
    AngleReading, EncoderFrame, MessageKind, PayloadDelta, ProtocolError, RegisterDecoder,
    TemperatureReading,
};
