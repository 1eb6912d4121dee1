//! Mock 帧通道（无硬件依赖）
//!
//! 按脚本顺序返回帧或错误，用于测试解码、分发与读循环。

use crate::{CanError, EncoderFrame, FrameChannel};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

type Script = Arc<Mutex<VecDeque<Result<EncoderFrame, CanError>>>>;

/// 脚本耗尽后的行为
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WhenExhausted {
    /// 返回 `CanError::Closed`（读循环随之停止）
    Close,
    /// 返回 `CanError::Timeout`（模拟静默总线，等待后续注入）
    Idle,
}

/// 脚本化的 Mock 通道
#[derive(Debug)]
pub struct MockChannel {
    script: Script,
    when_exhausted: WhenExhausted,
    read_timeout: Option<Duration>,
    open: bool,
    received: usize,
}

/// 向运行中的 `MockChannel` 注入帧（可跨线程）
#[derive(Debug, Clone)]
pub struct MockFeeder {
    script: Script,
}

fn lock(script: &Script) -> MutexGuard<'_, VecDeque<Result<EncoderFrame, CanError>>> {
    script.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockChannel {
    /// 依次返回给定帧，耗尽后关闭
    pub fn with_frames(frames: impl IntoIterator<Item = EncoderFrame>) -> Self {
        Self::with_script(frames.into_iter().map(Ok))
    }

    /// 依次返回给定结果（帧或错误），耗尽后关闭
    pub fn with_script(script: impl IntoIterator<Item = Result<EncoderFrame, CanError>>) -> Self {
        Self {
            script: Arc::new(Mutex::new(script.into_iter().collect())),
            when_exhausted: WhenExhausted::Close,
            read_timeout: None,
            open: true,
            received: 0,
        }
    }

    /// 空脚本、耗尽后空闲的通道，配合 `feeder()` 使用
    pub fn idle() -> Self {
        Self::with_script(std::iter::empty()).when_exhausted(WhenExhausted::Idle)
    }

    pub fn when_exhausted(mut self, behavior: WhenExhausted) -> Self {
        self.when_exhausted = behavior;
        self
    }

    pub fn feeder(&self) -> MockFeeder {
        MockFeeder {
            script: Arc::clone(&self.script),
        }
    }

    /// 已成功返回的帧数
    pub fn received(&self) -> usize {
        self.received
    }

    pub fn read_timeout(&self) -> Option<Duration> {
        self.read_timeout
    }
}

impl MockFeeder {
    pub fn push_frame(&self, frame: EncoderFrame) {
        lock(&self.script).push_back(Ok(frame));
    }

    pub fn push_error(&self, error: CanError) {
        lock(&self.script).push_back(Err(error));
    }

    /// 尚未被读取的条目数
    pub fn pending(&self) -> usize {
        lock(&self.script).len()
    }
}

impl FrameChannel for MockChannel {
    fn receive(&mut self) -> Result<EncoderFrame, CanError> {
        if !self.open {
            return Err(CanError::Closed);
        }

        let next = lock(&self.script).pop_front();
        match next {
            Some(Ok(frame)) => {
                self.received += 1;
                Ok(frame)
            },
            Some(Err(e)) => Err(e),
            None => match self.when_exhausted {
                WhenExhausted::Close => Err(CanError::Closed),
                WhenExhausted::Idle => {
                    // 避免空转
                    let wait = self
                        .read_timeout
                        .unwrap_or(Duration::from_millis(1))
                        .min(Duration::from_millis(5));
                    std::thread::sleep(wait);
                    Err(CanError::Timeout)
                },
            },
        }
    }

    fn set_receive_timeout(&mut self, timeout: Option<Duration>) {
        self.read_timeout = timeout;
    }

    fn receive_timeout(&mut self, timeout: Duration) -> Result<EncoderFrame, CanError> {
        let previous = self.read_timeout.replace(timeout);
        let result = self.receive();
        self.read_timeout = previous;
        result
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(id: u16) -> EncoderFrame {
        EncoderFrame::new_standard(id, &[0x55, 0x55, 0, 0, 0, 0, 0, 0])
    }

    #[test]
    fn test_script_order_then_closed() {
        let mut channel = MockChannel::with_script([
            Ok(frame(0x1)),
            Err(CanError::Timeout),
            Ok(frame(0x2)),
        ]);

        assert_eq!(channel.receive().unwrap().id, 0x1);
        assert!(matches!(channel.receive(), Err(CanError::Timeout)));
        assert_eq!(channel.receive().unwrap().id, 0x2);
        assert!(matches!(channel.receive(), Err(CanError::Closed)));
        assert_eq!(channel.received(), 2);
    }

    #[test]
    fn test_idle_channel_times_out_until_fed() {
        let mut channel = MockChannel::idle();
        let feeder = channel.feeder();

        assert!(matches!(channel.try_receive(), Ok(None)));

        feeder.push_frame(frame(0x7));
        assert_eq!(feeder.pending(), 1);
        assert_eq!(channel.try_receive().unwrap().unwrap().id, 0x7);
        assert_eq!(feeder.pending(), 0);
    }

    #[test]
    fn test_receive_timeout_restores_setting() {
        let mut channel = MockChannel::idle();
        channel.set_receive_timeout(Some(Duration::from_millis(3)));
        let _ = channel.receive_timeout(Duration::ZERO);
        assert_eq!(channel.read_timeout(), Some(Duration::from_millis(3)));
    }

    #[test]
    fn test_close_is_idempotent() {
        let mut channel = MockChannel::with_frames([frame(0x1)]);
        channel.close();
        channel.close();
        assert!(!channel.is_open());
        assert!(matches!(channel.receive(), Err(CanError::Closed)));
    }
}
