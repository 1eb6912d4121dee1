//! 分发属性测试
//!
//! 任意帧序列下：只有 8 字节帧到达订阅者，角度/温度回调次数与标记一致。

use encoder_can::MockChannel;
use encoder_driver::{EncoderBuilder, EncoderFrame};
use proptest::prelude::*;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

fn arb_frame() -> impl Strategy<Value = EncoderFrame> {
    let marker = prop_oneof![
        Just([0x55u8, 0x55]),
        Just([0x55u8, 0x56]),
        any::<[u8; 2]>(),
    ];
    (0u16..0x800, marker, any::<[u8; 6]>(), 0usize..=8).prop_map(|(id, marker, regs, len)| {
        let mut data = [0u8; 8];
        data[..2].copy_from_slice(&marker);
        data[2..].copy_from_slice(&regs);
        EncoderFrame::new_standard(id, &data[..len])
    })
}

proptest! {
    #[test]
    fn test_callback_counts_follow_markers(frames in prop::collection::vec(arb_frame(), 0..64)) {
        let full: Vec<&EncoderFrame> = frames.iter().filter(|f| f.len == 8).collect();
        let expected_angle = full.iter().filter(|f| f.data[..2] == [0x55, 0x55]).count();
        let expected_temp = full.iter().filter(|f| f.data[..2] == [0x55, 0x56]).count();
        let expected_raw = full.len();

        let mut encoder = EncoderBuilder::new()
            .build_with_channel(MockChannel::with_frames(frames.clone()))
            .unwrap();

        let angle = Arc::new(AtomicUsize::new(0));
        let temp = Arc::new(AtomicUsize::new(0));
        let raw = Arc::new(AtomicUsize::new(0));
        let a = Arc::clone(&angle);
        let _ = encoder.on_angle(move |_, deg, _, _| {
            assert!(deg >= 0.0 && deg < 720.0);
            a.fetch_add(1, Ordering::Relaxed);
        });
        let t = Arc::clone(&temp);
        let _ = encoder.on_temperature(move |_, _| {
            t.fetch_add(1, Ordering::Relaxed);
        });
        let r = Arc::clone(&raw);
        let _ = encoder.on_raw_frame(move |_| {
            r.fetch_add(1, Ordering::Relaxed);
        });

        encoder.run();

        prop_assert_eq!(angle.load(Ordering::Relaxed), expected_angle);
        prop_assert_eq!(temp.load(Ordering::Relaxed), expected_temp);
        prop_assert_eq!(raw.load(Ordering::Relaxed), expected_raw);

        let metrics = encoder.metrics();
        prop_assert_eq!(metrics.frames_received, frames.len() as u64);
        prop_assert_eq!(metrics.frames_rejected, (frames.len() - expected_raw) as u64);
        prop_assert_eq!(metrics.observer_panics, 0);
    }
}
