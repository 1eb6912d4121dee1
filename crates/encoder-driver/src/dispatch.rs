//! 帧分发（Telemetry Dispatch）
//!
//! 对单帧执行：长度校验 → CAN ID 白名单 → 分类 → 解码并通知订阅者 →
//! 差分检测 → 原始帧通知。
//!
//! 每个订阅者调用都用 `catch_unwind` 隔离，panic 不会越过 `dispatch`。

use crate::error::ObserverError;
use crate::hooks::{EventKind, ObserverRegistry, Subscriber};
use crate::metrics::DriverMetrics;
use encoder_protocol::{EncoderFrame, MessageKind, PayloadDelta, ProtocolError, RegisterDecoder};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, error, trace};

/// 消息过滤模式
///
/// 被排除的消息类型不解码，但仍送达原始帧订阅者。
///
/// 配置文件与命令行共用 `FromStr` 的拼写，序列化时写规范名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum MessageFilter {
    /// 角度与温度都解码
    #[default]
    All,
    Angle,
    Temperature,
}

impl MessageFilter {
    pub fn accepts(self, kind: MessageKind) -> bool {
        match (self, kind) {
            (_, MessageKind::Unclassified) => false,
            (MessageFilter::All, _) => true,
            (MessageFilter::Angle, MessageKind::Angle) => true,
            (MessageFilter::Temperature, MessageKind::Temperature) => true,
            _ => false,
        }
    }
}

impl FromStr for MessageFilter {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" | "e" | "everything" => Ok(MessageFilter::All),
            "angle" | "a" | "angle_only" => Ok(MessageFilter::Angle),
            "temperature" | "temp" | "t" | "temperature_only" => Ok(MessageFilter::Temperature),
            other => Err(format!(
                "unknown message filter '{}', expected one of: all, angle, temperature",
                other
            )),
        }
    }
}

impl TryFrom<String> for MessageFilter {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<MessageFilter> for String {
    fn from(filter: MessageFilter) -> Self {
        filter.to_string()
    }
}

impl std::fmt::Display for MessageFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            MessageFilter::All => "all",
            MessageFilter::Angle => "angle",
            MessageFilter::Temperature => "temperature",
        };
        f.write_str(name)
    }
}

/// 单帧的处理结果
#[derive(Debug, Clone, PartialEq)]
pub enum Disposition {
    /// 长度不为 8，未触达任何订阅者
    Rejected(ProtocolError),
    /// 不在 CAN ID 白名单中，未触达任何订阅者
    Filtered,
    /// 已解码并通知对应订阅者
    Decoded(MessageKind),
    /// 类型被消息过滤模式排除，仅通知原始帧订阅者
    Skipped(MessageKind),
    /// 未知标记，仅通知原始帧订阅者
    Unclassified,
}

/// 分发报告
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchReport {
    pub can_id: u32,
    pub disposition: Disposition,
    /// 成功返回的订阅者调用次数（含原始帧与差分）
    pub delivered: usize,
    /// 本帧是否产生了差分事件
    pub delta: Option<PayloadDelta>,
    /// panic 的订阅者
    pub errors: Vec<ObserverError>,
}

impl DispatchReport {
    fn new(can_id: u32, disposition: Disposition) -> Self {
        Self {
            can_id,
            disposition,
            delivered: 0,
            delta: None,
            errors: Vec::new(),
        }
    }
}

/// 分发器配置
#[derive(Debug, Clone, Default)]
pub struct DispatchConfig {
    /// CAN ID 白名单（空集表示接受全部）
    pub can_ids: HashSet<u32>,
    pub message_filter: MessageFilter,
    pub track_deltas: bool,
}

/// 帧分发器
///
/// 持有解码参数、过滤条件与差分状态，只在读线程上使用。
pub struct TelemetryDispatcher {
    decoder: RegisterDecoder,
    config: DispatchConfig,
    registry: Arc<ObserverRegistry>,
    metrics: Arc<DriverMetrics>,
    /// 每个 `(can_id, kind)` 最近一次的负载
    last_payloads: HashMap<(u32, MessageKind), [u8; 8]>,
}

impl TelemetryDispatcher {
    pub fn new(
        decoder: RegisterDecoder,
        config: DispatchConfig,
        registry: Arc<ObserverRegistry>,
        metrics: Arc<DriverMetrics>,
    ) -> Self {
        Self {
            decoder,
            config,
            registry,
            metrics,
            last_payloads: HashMap::new(),
        }
    }

    pub fn decoder(&self) -> &RegisterDecoder {
        &self.decoder
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<ObserverRegistry> {
        &self.registry
    }

    /// 清空差分状态（下一帧不会产生差分）
    pub fn reset_deltas(&mut self) {
        self.last_payloads.clear();
    }

    /// 处理一帧
    pub fn dispatch(&mut self, frame: &EncoderFrame) -> DispatchReport {
        let can_id = frame.id;

        if let Err(e) = frame.validate() {
            DriverMetrics::incr(&self.metrics.frames_rejected);
            debug!("Dropping frame 0x{:X}: {}", can_id, e);
            return DispatchReport::new(can_id, Disposition::Rejected(e));
        }

        if !self.config.can_ids.is_empty() && !self.config.can_ids.contains(&can_id) {
            DriverMetrics::incr(&self.metrics.frames_filtered);
            trace!("Frame 0x{:X} not in CAN ID allow-set, skipping", can_id);
            return DispatchReport::new(can_id, Disposition::Filtered);
        }

        let kind = frame.kind();
        let subscribers = self.registry.snapshot();

        let disposition = if self.config.message_filter.accepts(kind) {
            Disposition::Decoded(kind)
        } else if kind.is_known() {
            DriverMetrics::incr(&self.metrics.kind_skipped);
            Disposition::Skipped(kind)
        } else {
            DriverMetrics::incr(&self.metrics.unclassified);
            Disposition::Unclassified
        };
        let mut report = DispatchReport::new(can_id, disposition);

        if let Disposition::Decoded(kind) = report.disposition {
            match kind {
                MessageKind::Angle => {
                    let reading = self.decoder.decode_angle(can_id, &frame.data);
                    DriverMetrics::incr(&self.metrics.angle_decoded);
                    trace!(
                        "Angle 0x{:X}: {:.3}° {:.3}°/s rot={}",
                        can_id,
                        reading.angle_deg,
                        reading.angular_velocity_deg_per_s,
                        reading.rotation_count
                    );
                    self.invoke(
                        &subscribers.angle,
                        EventKind::AngleDecoded,
                        &reading,
                        &mut report,
                    );
                },
                MessageKind::Temperature => {
                    let reading = self.decoder.decode_temperature(can_id, &frame.data);
                    DriverMetrics::incr(&self.metrics.temperature_decoded);
                    trace!("Temperature 0x{:X}: {:.2} °C", can_id, reading.temperature_c);
                    self.invoke(
                        &subscribers.temperature,
                        EventKind::TemperatureDecoded,
                        &reading,
                        &mut report,
                    );
                },
                MessageKind::Unclassified => {},
            }

            if self.config.track_deltas
                && let Some(delta) = self.track_delta(can_id, kind, frame.data)
            {
                DriverMetrics::incr(&self.metrics.deltas_detected);
                report.delta = Some(delta);
                self.invoke(
                    &subscribers.delta,
                    EventKind::DeltaDetected,
                    &delta,
                    &mut report,
                );
            }
        }

        self.invoke(
            &subscribers.raw,
            EventKind::RawFrameSeen,
            frame,
            &mut report,
        );

        report
    }

    fn track_delta(
        &mut self,
        can_id: u32,
        kind: MessageKind,
        current: [u8; 8],
    ) -> Option<PayloadDelta> {
        let previous = self.last_payloads.insert((can_id, kind), current)?;
        PayloadDelta::between(can_id, kind, previous, current)
    }

    /// 按注册顺序调用订阅者，逐个隔离 panic
    fn invoke<T: ?Sized, F: ?Sized + Fn(&T)>(
        &self,
        subscribers: &[Subscriber<F>],
        event: EventKind,
        payload: &T,
        report: &mut DispatchReport,
    ) {
        for subscriber in subscribers {
            let callback = &subscriber.callback;
            match catch_unwind(AssertUnwindSafe(|| callback(payload))) {
                Ok(()) => report.delivered += 1,
                Err(panic) => {
                    let err =
                        ObserverError::from_panic(event, subscriber.id, report.can_id, &*panic);
                    DriverMetrics::incr(&self.metrics.observer_panics);
                    error!("{}", err);
                    report.errors.push(err);
                },
            }
        }
    }
}
