//! 读循环状态
//!
//! 读线程写入，其他线程通过 `AtomicLoopState` 观察。

use std::sync::atomic::{AtomicU8, Ordering};

/// 读循环状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum LoopState {
    /// 尚未运行
    #[default]
    Idle = 0,
    Running = 1,
    /// 已退出（取消或通道失败）
    Stopped = 2,
}

impl LoopState {
    /// 无效值视为 `Stopped`
    pub fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            _ => Self::Stopped,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// 原子读循环状态（线程间共享）
#[derive(Debug, Default)]
pub struct AtomicLoopState {
    inner: AtomicU8,
}

impl AtomicLoopState {
    pub fn get(&self) -> LoopState {
        LoopState::from_u8(self.inner.load(Ordering::Acquire))
    }

    pub fn set(&self, state: LoopState) {
        self.inner.store(state.as_u8(), Ordering::Release);
    }
}
