//! 编码器接口（对外 API）
//!
//! `EncoderInterface` 持有通道、分发器与订阅表，可以在调用者线程上 `run()`，
//! 也可以 `spawn()` 到专用读线程，返回 `InterfaceHandle`。

use crate::error::DriverError;
use crate::hooks::{EncoderObserver, ObserverRegistry, SubscriptionHandle};
use crate::metrics::{DriverMetrics, MetricsSnapshot};
use crate::pipeline::{CancellationToken, ReadLoop, StopReason};
use crate::state::{AtomicLoopState, LoopState};
use encoder_can::FrameChannel;
use encoder_protocol::{EncoderFrame, PayloadDelta};
use std::sync::Arc;
use std::thread::{JoinHandle, spawn};
use std::time::Duration;
use tracing::{error, info};

/// `InterfaceHandle` 析构时等待读线程退出的上限
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// 带超时的线程 join
trait JoinTimeout<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError>;
}

impl<T: Send + 'static> JoinTimeout<T> for JoinHandle<T> {
    fn join_timeout(self, timeout: Duration) -> Result<T, DriverError> {
        use std::sync::mpsc;

        let (tx, rx) = mpsc::channel();

        // 看门狗线程代为 join，本线程只阻塞在 recv_timeout 上
        spawn(move || {
            let _ = tx.send(self.join());
        });

        match rx.recv_timeout(timeout) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(_)) => Err(DriverError::ReaderThread(
                "reader thread panicked".to_string(),
            )),
            // 超时：看门狗线程继续等待，进程退出时由系统回收
            Err(mpsc::RecvTimeoutError::Timeout) => Err(DriverError::Timeout),
            Err(mpsc::RecvTimeoutError::Disconnected) => Err(DriverError::ReaderThread(
                "reader thread panicked during join".to_string(),
            )),
        }
    }
}

/// 为持有 `ObserverRegistry` 的类型生成订阅方法
macro_rules! observer_api {
    ($ty:ident $(<$gen:ident>)?) => {
        impl$(<$gen>)? $ty$(<$gen>)? {
            /// 角度帧：`(can_id, angle_deg, angular_velocity_deg_per_s, rotation_count)`
            pub fn on_angle<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(u32, f64, f64, u16) + Send + Sync + 'static,
            {
                self.registry.on_angle(callback)
            }

            /// 角度帧原始寄存器：`(can_id, angle_raw, angular_velocity_raw, rotation_count)`
            pub fn on_angle_raw<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(u32, u16, u16, u16) + Send + Sync + 'static,
            {
                self.registry.on_angle_raw(callback)
            }

            /// 温度帧：`(can_id, temperature_c)`
            pub fn on_temperature<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(u32, f64) + Send + Sync + 'static,
            {
                self.registry.on_temperature(callback)
            }

            /// 温度帧原始寄存器：`(can_id, temperature_raw)`
            pub fn on_temperature_raw<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(u32, u16) + Send + Sync + 'static,
            {
                self.registry.on_temperature_raw(callback)
            }

            pub fn on_raw_frame<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(&EncoderFrame) + Send + Sync + 'static,
            {
                self.registry.on_raw_frame(callback)
            }

            pub fn on_delta<F>(&self, callback: F) -> SubscriptionHandle
            where
                F: Fn(&PayloadDelta) + Send + Sync + 'static,
            {
                self.registry.on_delta(callback)
            }

            pub fn add_observer(&self, observer: Arc<dyn EncoderObserver>) -> SubscriptionHandle {
                self.registry.add_observer(observer)
            }

            pub fn unsubscribe(&self, handle: SubscriptionHandle) -> bool {
                self.registry.unsubscribe(handle)
            }

            pub fn registry(&self) -> &Arc<ObserverRegistry> {
                &self.registry
            }

            pub fn metrics(&self) -> MetricsSnapshot {
                self.metrics.snapshot()
            }

            pub fn state(&self) -> LoopState {
                self.state.get()
            }

            /// 取消令牌的克隆（可交给信号处理函数）
            pub fn cancellation_token(&self) -> CancellationToken {
                self.token.clone()
            }
        }
    };
}

/// 编码器接口
///
/// # 示例
///
/// ```no_run
/// use encoder_driver::EncoderBuilder;
///
/// let mut encoder = EncoderBuilder::new()
///     .interface("can0")
///     .can_ids([0x101, 0x102])
///     .receive_timeout(std::time::Duration::from_millis(100))
///     .build()
///     .unwrap();
///
/// let _ = encoder.on_angle(|can_id, angle, vel, rotations| {
///     println!("0x{can_id:X}: {angle:.2}° {vel:.2}°/s rot={rotations}");
/// });
///
/// // 10 秒后停止
/// let token = encoder.cancellation_token();
/// std::thread::spawn(move || {
///     std::thread::sleep(std::time::Duration::from_secs(10));
///     token.cancel();
/// });
///
/// let reason = encoder.run();
/// println!("stopped: {reason}");
/// encoder.close();
/// ```
pub struct EncoderInterface<C> {
    read_loop: ReadLoop<C>,
    interface: String,
    registry: Arc<ObserverRegistry>,
    metrics: Arc<DriverMetrics>,
    state: Arc<AtomicLoopState>,
    token: CancellationToken,
}

observer_api!(EncoderInterface<C>);

impl<C: FrameChannel> EncoderInterface<C> {
    pub(crate) fn new(
        read_loop: ReadLoop<C>,
        interface: String,
        registry: Arc<ObserverRegistry>,
        metrics: Arc<DriverMetrics>,
        state: Arc<AtomicLoopState>,
    ) -> Self {
        let token = read_loop.token().clone();
        Self {
            read_loop,
            interface,
            registry,
            metrics,
            state,
            token,
        }
    }

    /// 接口名称（自定义通道时为构造时给定的名称）
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn sample_time_s(&self) -> f64 {
        self.read_loop.dispatcher().decoder().sample_time_s()
    }

    /// 在当前线程上运行读循环，直到取消或通道致命错误
    pub fn run(&mut self) -> StopReason {
        info!("Encoder interface '{}' reading", self.interface);
        self.read_loop.run()
    }

    /// 关闭通道（幂等）；之后的 `run()` 会立即以 `ChannelFailed(Closed)` 返回
    pub fn close(&mut self) {
        if self.read_loop.channel().is_open() {
            self.read_loop.channel_mut().close();
            info!("Encoder interface '{}' closed", self.interface);
        }
    }

    pub fn is_open(&self) -> bool {
        self.read_loop.channel().is_open()
    }

    /// 重置差分跟踪状态
    pub fn reset_deltas(&mut self) {
        self.read_loop.dispatcher_mut().reset_deltas();
    }

    pub fn channel(&self) -> &C {
        self.read_loop.channel()
    }

    /// 在专用读线程上运行
    ///
    /// 读线程退出后关闭通道。
    pub fn spawn(self) -> Result<InterfaceHandle, DriverError>
    where
        C: Send + 'static,
    {
        let Self {
            mut read_loop,
            interface,
            registry,
            metrics,
            state,
            token,
        } = self;

        let thread_interface = interface.clone();
        let thread = std::thread::Builder::new()
            .name(format!("encoder-rx-{}", interface))
            .spawn(move || {
                let reason = read_loop.run();
                read_loop.channel_mut().close();
                info!("Encoder interface '{}' closed", thread_interface);
                reason
            })
            .map_err(|e| DriverError::ReaderThread(format!("failed to spawn: {}", e)))?;

        Ok(InterfaceHandle {
            thread: Some(thread),
            interface,
            registry,
            metrics,
            state,
            token,
        })
    }
}

/// 运行在专用线程上的编码器接口
///
/// 析构时触发取消并在 `DEFAULT_JOIN_TIMEOUT` 内等待读线程退出。
/// 没有配置读超时时，读线程要等到下一帧到达才能观察到取消。
pub struct InterfaceHandle {
    thread: Option<JoinHandle<StopReason>>,
    interface: String,
    registry: Arc<ObserverRegistry>,
    metrics: Arc<DriverMetrics>,
    state: Arc<AtomicLoopState>,
    token: CancellationToken,
}

observer_api!(InterfaceHandle);

impl InterfaceHandle {
    pub fn interface(&self) -> &str {
        &self.interface
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// 读线程是否已退出
    pub fn is_finished(&self) -> bool {
        self.thread.as_ref().is_none_or(|t| t.is_finished())
    }

    /// 等待读线程退出（不触发取消）
    pub fn join(mut self) -> Result<StopReason, DriverError> {
        match self.thread.take() {
            Some(thread) => thread
                .join()
                .map_err(|_| DriverError::ReaderThread("reader thread panicked".to_string())),
            None => Err(DriverError::ReaderThread("already joined".to_string())),
        }
    }

    /// 取消并在 `timeout` 内等待读线程退出
    pub fn stop(mut self, timeout: Duration) -> Result<StopReason, DriverError> {
        self.token.cancel();
        match self.thread.take() {
            Some(thread) => thread.join_timeout(timeout),
            None => Err(DriverError::ReaderThread("already joined".to_string())),
        }
    }
}

impl Drop for InterfaceHandle {
    fn drop(&mut self) {
        self.token.cancel();

        if let Some(thread) = self.thread.take()
            && let Err(e) = thread.join_timeout(DEFAULT_JOIN_TIMEOUT)
        {
            error!(
                "Reader thread for '{}' failed to shut down within {:?}: {}",
                self.interface, DEFAULT_JOIN_TIMEOUT, e
            );
        }
    }
}
