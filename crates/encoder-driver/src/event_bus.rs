//! 事件总线钩子（Event Bus Hook）
//!
//! 把分发事件转发到有界 channel，由其他线程异步消费。
//!
//! - **Bounded Queue**: 防止消费方停滞时内存无限增长
//! - **非阻塞**: 使用 `try_send`，队列满时丢弃事件并计数
//!
//! # 使用示例
//!
//! ```rust
//! use encoder_driver::event_bus::{EventBusHook, TelemetryEvent};
//! use encoder_driver::hooks::ObserverRegistry;
//! use std::sync::Arc;
//!
//! let registry = ObserverRegistry::new();
//! let (hook, rx) = EventBusHook::new();
//! let dropped = hook.dropped_events().clone();
//! let _handle = registry.add_observer(Arc::new(hook));
//!
//! std::thread::spawn(move || {
//!     while let Ok(event) = rx.recv() {
//!         if let TelemetryEvent::Angle(reading) = event {
//!             println!("0x{:X}: {:.2}°", reading.can_id, reading.angle_deg);
//!         }
//!     }
//! });
//!
//! println!("dropped {} events", dropped.load(std::sync::atomic::Ordering::Relaxed));
//! ```

use crate::hooks::{EncoderObserver, EventKind};
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use encoder_protocol::{AngleReading, EncoderFrame, PayloadDelta, TemperatureReading};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 默认队列容量（1 kHz 总线约 10 秒）
pub const DEFAULT_EVENT_BUS_CAPACITY: usize = 10_000;

/// 总线上传递的事件
#[derive(Debug, Clone, PartialEq)]
pub enum TelemetryEvent {
    Angle(AngleReading),
    Temperature(TemperatureReading),
    RawFrame(EncoderFrame),
    Delta(PayloadDelta),
}

impl TelemetryEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            TelemetryEvent::Angle(_) => EventKind::AngleDecoded,
            TelemetryEvent::Temperature(_) => EventKind::TemperatureDecoded,
            TelemetryEvent::RawFrame(_) => EventKind::RawFrameSeen,
            TelemetryEvent::Delta(_) => EventKind::DeltaDetected,
        }
    }

    pub fn can_id(&self) -> u32 {
        match self {
            TelemetryEvent::Angle(r) => r.can_id,
            TelemetryEvent::Temperature(r) => r.can_id,
            TelemetryEvent::RawFrame(f) => f.id,
            TelemetryEvent::Delta(d) => d.can_id,
        }
    }
}

/// 事件总线钩子
pub struct EventBusHook {
    tx: Sender<TelemetryEvent>,
    /// 队列满时丢弃的事件数
    dropped_events: Arc<AtomicU64>,
    /// 成功入队的事件数
    sent_events: Arc<AtomicU64>,
    /// 是否转发原始帧（高频总线上原始帧会占满队列）
    forward_raw: bool,
}

impl EventBusHook {
    /// 默认容量，转发全部事件
    #[must_use]
    pub fn new() -> (Self, Receiver<TelemetryEvent>) {
        Self::with_capacity(DEFAULT_EVENT_BUS_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, Receiver<TelemetryEvent>) {
        let (tx, rx) = bounded(capacity);
        let hook = Self {
            tx,
            dropped_events: Arc::new(AtomicU64::new(0)),
            sent_events: Arc::new(AtomicU64::new(0)),
            forward_raw: true,
        };
        (hook, rx)
    }

    /// 不转发原始帧事件
    #[must_use]
    pub fn without_raw_frames(mut self) -> Self {
        self.forward_raw = false;
        self
    }

    pub fn dropped_events(&self) -> &Arc<AtomicU64> {
        &self.dropped_events
    }

    pub fn sent_events(&self) -> &Arc<AtomicU64> {
        &self.sent_events
    }

    fn forward(&self, event: TelemetryEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.sent_events.fetch_add(1, Ordering::Relaxed);
            },
            // 消费端已退出时同样计为丢弃
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped_events.fetch_add(1, Ordering::Relaxed);
            },
        }
    }
}

impl EncoderObserver for EventBusHook {
    fn on_angle(&self, reading: &AngleReading) {
        self.forward(TelemetryEvent::Angle(*reading));
    }

    fn on_temperature(&self, reading: &TemperatureReading) {
        self.forward(TelemetryEvent::Temperature(*reading));
    }

    fn on_raw_frame(&self, frame: &EncoderFrame) {
        if self.forward_raw {
            self.forward(TelemetryEvent::RawFrame(*frame));
        }
    }

    fn on_delta(&self, delta: &PayloadDelta) {
        self.forward(TelemetryEvent::Delta(*delta));
    }
}
