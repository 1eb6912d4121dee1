//! 订阅者注册表（Observer Registry）
//!
//! 按事件类型维护有序的回调列表，分发时按注册顺序同步调用。
//!
//! # 并发模型
//!
//! 回调列表保存在 `ArcSwap` 快照中：
//! - 订阅/退订使用写时复制（`rcu`），任意线程、任意时刻都可以调用
//! - 分发只读取快照，不持锁，因此回调内部再订阅不会死锁
//! - 新订阅从下一帧开始生效
//!
//! # 使用示例
//!
//! ```rust
//! use encoder_driver::hooks::ObserverRegistry;
//!
//! let registry = ObserverRegistry::new();
//! let handle = registry.on_angle(|can_id, angle_deg, vel_deg_s, rotations| {
//!     println!("0x{can_id:X}: {angle_deg:.2}° {vel_deg_s:.2}°/s rot={rotations}");
//! });
//! assert_eq!(registry.len(), 1);
//! registry.unsubscribe(handle);
//! assert!(registry.is_empty());
//! ```

use arc_swap::ArcSwap;
use encoder_protocol::{AngleReading, EncoderFrame, PayloadDelta, TemperatureReading};
use smallvec::SmallVec;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

/// 分发事件类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AngleDecoded,
    TemperatureDecoded,
    RawFrameSeen,
    DeltaDetected,
}

/// 观察者 Trait
///
/// 一次注册即订阅全部四类事件，未覆盖的方法为空操作。
/// 回调在读线程上同步执行，应尽快返回（耗时处理请转交 channel，参见 `EventBusHook`）。
pub trait EncoderObserver: Send + Sync {
    fn on_angle(&self, reading: &AngleReading) {
        let _ = reading;
    }

    fn on_temperature(&self, reading: &TemperatureReading) {
        let _ = reading;
    }

    fn on_raw_frame(&self, frame: &EncoderFrame) {
        let _ = frame;
    }

    fn on_delta(&self, delta: &PayloadDelta) {
        let _ = delta;
    }
}

pub(crate) type AngleCallback = dyn Fn(&AngleReading) + Send + Sync;
pub(crate) type TemperatureCallback = dyn Fn(&TemperatureReading) + Send + Sync;
pub(crate) type RawFrameCallback = dyn Fn(&EncoderFrame) + Send + Sync;
pub(crate) type DeltaCallback = dyn Fn(&PayloadDelta) + Send + Sync;

/// 订阅句柄，用于退订
///
/// `add_observer` 返回的句柄覆盖该观察者的全部事件。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use = "dropping the handle makes the subscription impossible to remove"]
pub struct SubscriptionHandle {
    id: u64,
}

impl SubscriptionHandle {
    pub fn id(&self) -> u64 {
        self.id
    }
}

pub(crate) struct Subscriber<F: ?Sized> {
    pub(crate) id: u64,
    pub(crate) callback: Arc<F>,
}

impl<F: ?Sized> Clone for Subscriber<F> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            callback: Arc::clone(&self.callback),
        }
    }
}

type SubscriberList<F> = SmallVec<[Subscriber<F>; 4]>;

/// 某一时刻的完整订阅快照
#[derive(Clone, Default)]
pub(crate) struct Subscribers {
    pub(crate) angle: SubscriberList<AngleCallback>,
    pub(crate) temperature: SubscriberList<TemperatureCallback>,
    pub(crate) raw: SubscriberList<RawFrameCallback>,
    pub(crate) delta: SubscriberList<DeltaCallback>,
}

impl Subscribers {
    fn len(&self) -> usize {
        self.angle.len() + self.temperature.len() + self.raw.len() + self.delta.len()
    }

    fn contains(&self, id: u64) -> bool {
        self.angle.iter().any(|s| s.id == id)
            || self.temperature.iter().any(|s| s.id == id)
            || self.raw.iter().any(|s| s.id == id)
            || self.delta.iter().any(|s| s.id == id)
    }

    fn remove(&mut self, id: u64) {
        self.angle.retain(|s| s.id != id);
        self.temperature.retain(|s| s.id != id);
        self.raw.retain(|s| s.id != id);
        self.delta.retain(|s| s.id != id);
    }
}

/// 订阅者注册表
pub struct ObserverRegistry {
    subscribers: ArcSwap<Subscribers>,
    next_id: AtomicU64,
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snapshot = self.subscribers.load();
        f.debug_struct("ObserverRegistry")
            .field("angle", &snapshot.angle.len())
            .field("temperature", &snapshot.temperature.len())
            .field("raw", &snapshot.raw.len())
            .field("delta", &snapshot.delta.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self {
            subscribers: ArcSwap::from_pointee(Subscribers::default()),
            next_id: AtomicU64::new(1),
        }
    }

    fn next_handle(&self) -> SubscriptionHandle {
        SubscriptionHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
        }
    }

    fn update(&self, f: impl Fn(&mut Subscribers)) {
        self.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            f(&mut next);
            next
        });
    }

    /// 角度帧（工程单位）：`(can_id, angle_deg, angular_velocity_deg_per_s, rotation_count)`
    pub fn on_angle<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(u32, f64, f64, u16) + Send + Sync + 'static,
    {
        self.subscribe_angle(Arc::new(move |r: &AngleReading| {
            callback(
                r.can_id,
                r.angle_deg,
                r.angular_velocity_deg_per_s,
                r.rotation_count,
            )
        }))
    }

    /// 角度帧（原始寄存器）：`(can_id, angle_raw, angular_velocity_raw, rotation_count)`
    pub fn on_angle_raw<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(u32, u16, u16, u16) + Send + Sync + 'static,
    {
        self.subscribe_angle(Arc::new(move |r: &AngleReading| {
            callback(
                r.can_id,
                r.angle_raw,
                r.angular_velocity_raw,
                r.rotation_count,
            )
        }))
    }

    /// 温度帧（°C）：`(can_id, temperature_c)`
    pub fn on_temperature<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(u32, f64) + Send + Sync + 'static,
    {
        self.subscribe_temperature(Arc::new(move |r: &TemperatureReading| {
            callback(r.can_id, r.temperature_c)
        }))
    }

    /// 温度帧（原始寄存器）：`(can_id, temperature_raw)`
    pub fn on_temperature_raw<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(u32, u16) + Send + Sync + 'static,
    {
        self.subscribe_temperature(Arc::new(move |r: &TemperatureReading| {
            callback(r.can_id, r.temperature_raw)
        }))
    }

    /// 所有通过长度校验的帧（包括未知标记的帧）
    pub fn on_raw_frame<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&EncoderFrame) + Send + Sync + 'static,
    {
        let handle = self.next_handle();
        let subscriber = Subscriber {
            id: handle.id,
            callback: Arc::new(callback) as Arc<RawFrameCallback>,
        };
        self.update(|s| s.raw.push(subscriber.clone()));
        handle
    }

    /// 同一 `(can_id, kind)` 的负载发生变化（需开启差分跟踪）
    pub fn on_delta<F>(&self, callback: F) -> SubscriptionHandle
    where
        F: Fn(&PayloadDelta) + Send + Sync + 'static,
    {
        let handle = self.next_handle();
        let subscriber = Subscriber {
            id: handle.id,
            callback: Arc::new(callback) as Arc<DeltaCallback>,
        };
        self.update(|s| s.delta.push(subscriber.clone()));
        handle
    }

    /// 注册观察者到全部四个事件列表
    pub fn add_observer(&self, observer: Arc<dyn EncoderObserver>) -> SubscriptionHandle {
        let handle = self.next_handle();
        let id = handle.id;

        let angle_observer = Arc::clone(&observer);
        let angle = Subscriber {
            id,
            callback: Arc::new(move |r: &AngleReading| angle_observer.on_angle(r))
                as Arc<AngleCallback>,
        };
        let temperature_observer = Arc::clone(&observer);
        let temperature = Subscriber {
            id,
            callback: Arc::new(move |r: &TemperatureReading| temperature_observer.on_temperature(r))
                as Arc<TemperatureCallback>,
        };
        let raw_observer = Arc::clone(&observer);
        let raw = Subscriber {
            id,
            callback: Arc::new(move |f: &EncoderFrame| raw_observer.on_raw_frame(f))
                as Arc<RawFrameCallback>,
        };
        let delta = Subscriber {
            id,
            callback: Arc::new(move |d: &PayloadDelta| observer.on_delta(d)) as Arc<DeltaCallback>,
        };

        self.update(|s| {
            s.angle.push(angle.clone());
            s.temperature.push(temperature.clone());
            s.raw.push(raw.clone());
            s.delta.push(delta.clone());
        });
        handle
    }

    /// 退订；句柄未知时返回 `false`
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
        let previous = self.subscribers.rcu(|current| {
            let mut next = Subscribers::clone(current);
            next.remove(handle.id);
            next
        });
        previous.contains(handle.id)
    }

    /// 移除全部订阅
    pub fn clear(&self) {
        self.subscribers.store(Arc::new(Subscribers::default()));
    }

    /// 所有事件列表中的条目总数
    pub fn len(&self) -> usize {
        self.subscribers.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// 某一事件的订阅数
    pub fn count(&self, event: EventKind) -> usize {
        let snapshot = self.subscribers.load();
        match event {
            EventKind::AngleDecoded => snapshot.angle.len(),
            EventKind::TemperatureDecoded => snapshot.temperature.len(),
            EventKind::RawFrameSeen => snapshot.raw.len(),
            EventKind::DeltaDetected => snapshot.delta.len(),
        }
    }

    pub(crate) fn snapshot(&self) -> Arc<Subscribers> {
        self.subscribers.load_full()
    }

    fn subscribe_angle(&self, callback: Arc<AngleCallback>) -> SubscriptionHandle {
        let handle = self.next_handle();
        let subscriber = Subscriber {
            id: handle.id,
            callback,
        };
        self.update(|s| s.angle.push(subscriber.clone()));
        handle
    }

    fn subscribe_temperature(&self, callback: Arc<TemperatureCallback>) -> SubscriptionHandle {
        let handle = self.next_handle();
        let subscriber = Subscriber {
            id: handle.id,
            callback,
        };
        self.update(|s| s.temperature.push(subscriber.clone()));
        handle
    }
}
