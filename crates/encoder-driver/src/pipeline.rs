//! 读循环（Read Loop）
//!
//! 单读者模型：读帧、分发、回调全部在同一线程上按到达顺序执行，
//! 唯一的挂起点是通道读取。

use crate::dispatch::TelemetryDispatcher;
use crate::metrics::DriverMetrics;
use crate::state::{AtomicLoopState, LoopState};
use encoder_can::{CanError, FrameChannel};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{error, info, trace, warn};

/// 取消令牌
///
/// 可克隆，可在任意线程或信号处理函数中调用 `cancel()`。
/// 读循环每次迭代开始时检查一次；阻塞在无超时的读取上时，
/// 需等到下一帧到达（或通道关闭）才会生效。
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        // Release: 取消之前的写入对读线程可见
        self.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
    }
}

/// 读循环参数
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReadLoopConfig {
    /// 单次读取超时（`None` 为无限阻塞）
    pub receive_timeout: Option<Duration>,
    /// 可恢复错误后的退避时间
    pub error_backoff: Option<Duration>,
}

/// 读循环退出原因
#[derive(Debug)]
pub enum StopReason {
    /// 取消令牌被触发
    Cancelled,
    /// 通道发生致命错误
    ChannelFailed(CanError),
}

impl StopReason {
    pub fn is_cancelled(&self) -> bool {
        matches!(self, StopReason::Cancelled)
    }
}

impl std::fmt::Display for StopReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StopReason::Cancelled => f.write_str("cancelled"),
            StopReason::ChannelFailed(e) => write!(f, "channel failed: {}", e),
        }
    }
}

/// 读循环
///
/// 退出时不关闭通道，由持有者决定（参见 `EncoderInterface::close`）。
pub struct ReadLoop<C> {
    channel: C,
    dispatcher: TelemetryDispatcher,
    config: ReadLoopConfig,
    token: CancellationToken,
    state: Arc<AtomicLoopState>,
    metrics: Arc<DriverMetrics>,
}

impl<C: FrameChannel> ReadLoop<C> {
    pub fn new(
        channel: C,
        dispatcher: TelemetryDispatcher,
        config: ReadLoopConfig,
        token: CancellationToken,
        state: Arc<AtomicLoopState>,
        metrics: Arc<DriverMetrics>,
    ) -> Self {
        Self {
            channel,
            dispatcher,
            config,
            token,
            state,
            metrics,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn dispatcher(&self) -> &TelemetryDispatcher {
        &self.dispatcher
    }

    pub fn dispatcher_mut(&mut self) -> &mut TelemetryDispatcher {
        &mut self.dispatcher
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// 运行直到取消或通道致命错误
    pub fn run(&mut self) -> StopReason {
        self.state.set(LoopState::Running);
        self.channel.set_receive_timeout(self.config.receive_timeout);
        info!("Read loop started");

        let reason = loop {
            if self.token.is_cancelled() {
                trace!("Read loop: cancellation requested, exiting");
                break StopReason::Cancelled;
            }

            let frame = match self.channel.receive() {
                Ok(frame) => {
                    DriverMetrics::incr(&self.metrics.frames_received);
                    frame
                },
                Err(CanError::Timeout) => {
                    DriverMetrics::incr(&self.metrics.receive_timeouts);
                    continue;
                },
                Err(e) if e.is_fatal() => {
                    error!("Read loop: fatal channel error: {}", e);
                    break StopReason::ChannelFailed(e);
                },
                Err(e) => {
                    DriverMetrics::incr(&self.metrics.transient_errors);
                    warn!("Read loop: transient channel error: {}", e);
                    if let Some(backoff) = self.config.error_backoff {
                        std::thread::sleep(backoff);
                    }
                    continue;
                },
            };

            self.dispatcher.dispatch(&frame);
        };

        self.state.set(LoopState::Stopped);
        info!("Read loop stopped: {}", reason);
        reason
    }
}
