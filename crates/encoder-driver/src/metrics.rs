//! 读循环与分发指标
//!
//! 原子计数器，可在任意线程读取快照，不引入锁竞争。

use std::sync::atomic::{AtomicU64, Ordering};

/// 驱动实时指标
///
/// # 使用示例
///
/// ```rust
/// use encoder_driver::DriverMetrics;
/// use std::sync::Arc;
/// use std::sync::atomic::Ordering;
///
/// let metrics = Arc::new(DriverMetrics::default());
/// metrics.frames_received.fetch_add(1, Ordering::Relaxed);
///
/// let snapshot = metrics.snapshot();
/// assert_eq!(snapshot.frames_received, 1);
/// ```
#[derive(Debug, Default)]
pub struct DriverMetrics {
    /// 从通道读到的总帧数
    pub frames_received: AtomicU64,

    /// 长度不为 8 被丢弃的帧数
    pub frames_rejected: AtomicU64,

    /// 不在 CAN ID 白名单中被跳过的帧数
    pub frames_filtered: AtomicU64,

    pub angle_decoded: AtomicU64,
    pub temperature_decoded: AtomicU64,

    /// 标记未知的帧数（仍会送达原始帧订阅者）
    pub unclassified: AtomicU64,

    /// 被消息过滤模式排除、未解码的帧数
    pub kind_skipped: AtomicU64,

    pub deltas_detected: AtomicU64,

    /// 订阅者 panic 次数
    pub observer_panics: AtomicU64,

    /// 读超时次数（正常现象，总线静默时会超时）
    pub receive_timeouts: AtomicU64,

    /// 可恢复通道错误次数
    pub transient_errors: AtomicU64,
}

impl DriverMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            frames_received: self.frames_received.load(Ordering::Relaxed),
            frames_rejected: self.frames_rejected.load(Ordering::Relaxed),
            frames_filtered: self.frames_filtered.load(Ordering::Relaxed),
            angle_decoded: self.angle_decoded.load(Ordering::Relaxed),
            temperature_decoded: self.temperature_decoded.load(Ordering::Relaxed),
            unclassified: self.unclassified.load(Ordering::Relaxed),
            kind_skipped: self.kind_skipped.load(Ordering::Relaxed),
            deltas_detected: self.deltas_detected.load(Ordering::Relaxed),
            observer_panics: self.observer_panics.load(Ordering::Relaxed),
            receive_timeouts: self.receive_timeouts.load(Ordering::Relaxed),
            transient_errors: self.transient_errors.load(Ordering::Relaxed),
        }
    }

    /// 重置所有计数器
    pub fn reset(&self) {
        self.frames_received.store(0, Ordering::Relaxed);
        self.frames_rejected.store(0, Ordering::Relaxed);
        self.frames_filtered.store(0, Ordering::Relaxed);
        self.angle_decoded.store(0, Ordering::Relaxed);
        self.temperature_decoded.store(0, Ordering::Relaxed);
        self.unclassified.store(0, Ordering::Relaxed);
        self.kind_skipped.store(0, Ordering::Relaxed);
        self.deltas_detected.store(0, Ordering::Relaxed);
        self.observer_panics.store(0, Ordering::Relaxed);
        self.receive_timeouts.store(0, Ordering::Relaxed);
        self.transient_errors.store(0, Ordering::Relaxed);
    }

    pub(crate) fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// 指标快照（不可变）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub frames_received: u64,
    pub frames_rejected: u64,
    pub frames_filtered: u64,
    pub angle_decoded: u64,
    pub temperature_decoded: u64,
    pub unclassified: u64,
    pub kind_skipped: u64,
    pub deltas_detected: u64,
    pub observer_panics: u64,
    pub receive_timeouts: u64,
    pub transient_errors: u64,
}

impl MetricsSnapshot {
    /// 成功解码的帧数（角度 + 温度）
    pub fn decoded_total(&self) -> u64 {
        self.angle_decoded + self.temperature_decoded
    }

    /// 被拒绝帧占比（百分比），未收到帧时为 0.0
    pub fn reject_rate(&self) -> f64 {
        if self.frames_received == 0 {
            return 0.0;
        }
        (self.frames_rejected as f64 / self.frames_received as f64) * 100.0
    }
}

impl std::fmt::Display for MetricsSnapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "received={} rejected={} filtered={} angle={} temperature={} unclassified={} \
             skipped={} deltas={} observer_panics={} timeouts={} transient_errors={}",
            self.frames_received,
            self.frames_rejected,
            self.frames_filtered,
            self.angle_decoded,
            self.temperature_decoded,
            self.unclassified,
            self.kind_skipped,
            self.deltas_detected,
            self.observer_panics,
            self.receive_timeouts,
            self.transient_errors,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_and_reset() {
        let metrics = DriverMetrics::new();
        DriverMetrics::incr(&metrics.frames_received);
        DriverMetrics::incr(&metrics.frames_received);
        DriverMetrics::incr(&metrics.frames_rejected);
        DriverMetrics::incr(&metrics.angle_decoded);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.frames_received, 2);
        assert_eq!(snapshot.decoded_total(), 1);
        assert!((snapshot.reject_rate() - 50.0).abs() < 1e-9);

        metrics.reset();
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
        assert_eq!(metrics.snapshot().reject_rate(), 0.0);
    }

    #[test]
    fn test_snapshot_display() {
        let snapshot = MetricsSnapshot {
            frames_received: 3,
            angle_decoded: 2,
            ..Default::default()
        };
        let text = snapshot.to_string();
        assert!(text.starts_with("received=3 "));
        assert!(text.contains("angle=2"));
    }
}
