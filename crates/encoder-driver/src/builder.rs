//! Builder 模式实现
//!
//! 提供链式构造 `EncoderInterface` 的便捷方式。

use crate::config::{DEFAULT_INTERFACE, EncoderConfig};
use crate::dispatch::{DispatchConfig, MessageFilter, TelemetryDispatcher};
use crate::error::DriverError;
use crate::hooks::ObserverRegistry;
use crate::interface::EncoderInterface;
use crate::metrics::DriverMetrics;
use crate::pipeline::{CancellationToken, ReadLoop, ReadLoopConfig};
use crate::state::AtomicLoopState;
#[cfg(target_os = "linux")]
use encoder_can::SocketCanChannel;
use encoder_can::FrameChannel;
use encoder_protocol::{DEFAULT_SAMPLE_TIME_S, RegisterDecoder};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Encoder Builder（链式构造）
///
/// # Example
///
/// ```no_run
/// use encoder_driver::{EncoderBuilder, MessageFilter};
/// use std::time::Duration;
///
/// // 默认配置：can0，全部 CAN ID，采样时间 0.1 s
/// let encoder = EncoderBuilder::new().build().unwrap();
///
/// // 只解码 0x101 的角度帧
/// let encoder = EncoderBuilder::new()
///     .interface("vcan0")
///     .can_ids([0x101])
///     .message_filter(MessageFilter::Angle)
///     .receive_timeout(Duration::from_millis(100))
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct EncoderBuilder {
    interface: Option<String>,
    can_ids: HashSet<u32>,
    sample_time_s: f64,
    receive_timeout: Option<Duration>,
    message_filter: MessageFilter,
    track_deltas: bool,
    error_backoff: Option<Duration>,
}

impl Default for EncoderBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EncoderBuilder {
    pub fn new() -> Self {
        Self {
            interface: None,
            can_ids: HashSet::new(),
            sample_time_s: DEFAULT_SAMPLE_TIME_S,
            receive_timeout: None,
            message_filter: MessageFilter::All,
            track_deltas: false,
            error_backoff: None,
        }
    }

    /// 从配置文件内容构造（配置已校验）
    pub fn from_config(config: &EncoderConfig) -> Self {
        Self {
            interface: Some(config.interface.clone()),
            can_ids: config.can_ids.iter().copied().collect(),
            sample_time_s: config.sample_time_s,
            receive_timeout: config.receive_timeout(),
            message_filter: config.message_filter,
            track_deltas: config.track_deltas,
            error_backoff: config.error_backoff(),
        }
    }

    /// 设置 SocketCAN 接口（默认 "can0"）
    pub fn interface(mut self, interface: impl Into<String>) -> Self {
        self.interface = Some(interface.into());
        self
    }

    /// 只处理这些 CAN ID（可多次调用，累加；不调用表示接受全部）
    pub fn can_ids(mut self, ids: impl IntoIterator<Item = u32>) -> Self {
        self.can_ids.extend(ids);
        self
    }

    pub fn can_id(mut self, id: u32) -> Self {
        self.can_ids.insert(id);
        self
    }

    /// 设备采样时间（秒，默认 0.1），`build` 时校验
    pub fn sample_time(mut self, sample_time_s: f64) -> Self {
        self.sample_time_s = sample_time_s;
        self
    }

    /// 单次读取超时（默认无限阻塞）
    ///
    /// 设置后，取消请求最迟在一个超时周期内生效。
    pub fn receive_timeout(mut self, timeout: Duration) -> Self {
        self.receive_timeout = Some(timeout);
        self
    }

    pub fn message_filter(mut self, filter: MessageFilter) -> Self {
        self.message_filter = filter;
        self
    }

    /// 开启差分跟踪（`on_delta`）
    pub fn track_deltas(mut self, enabled: bool) -> Self {
        self.track_deltas = enabled;
        self
    }

    /// 可恢复通道错误后的退避时间
    pub fn error_backoff(mut self, backoff: Duration) -> Self {
        self.error_backoff = Some(backoff);
        self
    }

    /// 打开 SocketCAN 接口并构造
    ///
    /// # 错误
    /// - `DriverError::Protocol`: 采样时间无效
    /// - `DriverError::Can`: 接口不存在、未启动、无法打开
    #[cfg(target_os = "linux")]
    pub fn build(self) -> Result<EncoderInterface<SocketCanChannel>, DriverError> {
        let decoder = RegisterDecoder::new(self.sample_time_s)?;
        let interface = self
            .interface
            .clone()
            .unwrap_or_else(|| DEFAULT_INTERFACE.to_string());
        let channel = SocketCanChannel::open(interface.clone())?;
        Ok(self.assemble(channel, interface, decoder))
    }

    /// 使用任意 `FrameChannel` 构造（测试、回放或自定义传输）
    pub fn build_with_channel<C: FrameChannel>(
        self,
        channel: C,
    ) -> Result<EncoderInterface<C>, DriverError> {
        let decoder = RegisterDecoder::new(self.sample_time_s)?;
        let interface = self
            .interface
            .clone()
            .unwrap_or_else(|| "custom".to_string());
        Ok(self.assemble(channel, interface, decoder))
    }

    fn assemble<C: FrameChannel>(
        self,
        channel: C,
        interface: String,
        decoder: RegisterDecoder,
    ) -> EncoderInterface<C> {
        debug!(
            "Building encoder interface '{}': can_ids={:?} sample_time_s={} filter={} deltas={}",
            interface, self.can_ids, self.sample_time_s, self.message_filter, self.track_deltas
        );

        let registry = Arc::new(ObserverRegistry::new());
        let metrics = Arc::new(DriverMetrics::new());
        let state = Arc::new(AtomicLoopState::default());

        let dispatcher = TelemetryDispatcher::new(
            decoder,
            DispatchConfig {
                can_ids: self.can_ids,
                message_filter: self.message_filter,
                track_deltas: self.track_deltas,
            },
            Arc::clone(&registry),
            Arc::clone(&metrics),
        );
        let read_loop = ReadLoop::new(
            channel,
            dispatcher,
            ReadLoopConfig {
                receive_timeout: self.receive_timeout,
                error_backoff: self.error_backoff,
            },
            CancellationToken::new(),
            Arc::clone(&state),
            Arc::clone(&metrics),
        );

        EncoderInterface::new(read_loop, interface, registry, metrics, state)
    }
}
