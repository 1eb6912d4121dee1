//! 相邻帧负载差分
//!
//! 对同一 CAN ID、同一消息类型的前后两帧比较负载，
//! 用于观察寄存器随时间的变化量（调试/标定用途）。

use crate::{MessageKind, register_at};

/// 两帧负载之间的差异
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct PayloadDelta {
    pub can_id: u32,
    pub kind: MessageKind,
    pub previous: [u8; 8],
    pub current: [u8; 8],
}

impl PayloadDelta {
    /// 构造差分（负载完全相同时返回 `None`）
    pub fn between(
        can_id: u32,
        kind: MessageKind,
        previous: [u8; 8],
        current: [u8; 8],
    ) -> Option<Self> {
        if previous == current {
            return None;
        }
        Some(Self {
            can_id,
            kind,
            previous,
            current,
        })
    }

    /// 三个寄存器（字节 2..8）的变化量：`current - previous`
    ///
    /// 温度帧只有第一个寄存器有意义，其余两项按原样比较保留字节。
    pub fn register_deltas(&self) -> [i32; 3] {
        [2usize, 4, 6].map(|offset| {
            register_at(&self.current, offset) as i32 - register_at(&self.previous, offset) as i32
        })
    }

    /// 发生变化的字节位掩码（bit i 对应 `data[i]`）
    pub fn changed_bytes(&self) -> u8 {
        self.previous
            .iter()
            .zip(self.current.iter())
            .enumerate()
            .fold(0u8, |mask, (i, (a, b))| {
                if a != b { mask | (1 << i) } else { mask }
            })
    }
}
