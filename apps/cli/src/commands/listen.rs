//! 监听命令
//!
//! 打开 SocketCAN 接口，订阅并打印遥测，Ctrl-C 通过取消令牌停止读循环。

use anyhow::{Context, Result};
use clap::Args;
use encoder_driver::{EncoderConfig, MessageFilter};
use std::path::PathBuf;

/// CLI 默认读超时：保证 Ctrl-C 在一个周期内生效
pub const DEFAULT_CLI_TIMEOUT_MS: u64 = 100;

/// 监听命令参数
#[derive(Args, Debug)]
pub struct ListenCommand {
    /// TOML 配置文件（命令行参数覆盖其中的值）
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// CAN 接口（默认 can0）
    #[arg(short, long)]
    pub interface: Option<String>,

    /// 只处理这些 CAN ID（可重复，支持 0x 前缀）
    #[arg(long = "can-id", value_parser = parse_can_id)]
    pub can_id: Vec<u32>,

    /// 角速度采样时间（秒）
    #[arg(short, long)]
    pub sample_time: Option<f64>,

    /// 消息过滤：all | angle | temperature
    #[arg(short, long)]
    pub filter: Option<MessageFilter>,

    /// 打印每一帧原始数据
    #[arg(long)]
    pub raw: bool,

    /// 打印原始寄存器值而不是换算后的物理量
    #[arg(long)]
    pub raw_values: bool,

    /// 打印寄存器变化量
    #[arg(long)]
    pub deltas: bool,

    /// 单次读取超时（毫秒）
    #[arg(long)]
    pub timeout_ms: Option<u64>,
}

/// 解析十进制或 `0x` 十六进制 CAN ID
fn parse_can_id(s: &str) -> Result<u32, String> {
    let s = s.trim();
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => s.parse::<u32>(),
    };
    parsed.map_err(|e| format!("invalid CAN ID '{}': {}", s, e))
}

impl ListenCommand {
    /// 合并配置文件与命令行参数
    pub fn resolve_config(&self) -> Result<EncoderConfig> {
        let mut config = match &self.config {
            Some(path) => EncoderConfig::load(path)
                .with_context(|| format!("failed to load config {}", path.display()))?,
            None => EncoderConfig::default(),
        };

        if let Some(interface) = &self.interface {
            config.interface = interface.clone();
        }
        if !self.can_id.is_empty() {
            config.can_ids = self.can_id.clone();
        }
        if let Some(sample_time) = self.sample_time {
            config.sample_time_s = sample_time;
        }
        if let Some(filter) = self.filter {
            config.message_filter = filter;
        }
        if self.deltas {
            config.track_deltas = true;
        }
        if let Some(timeout_ms) = self.timeout_ms {
            config.receive_timeout_ms = Some(timeout_ms);
        } else if config.receive_timeout_ms.is_none() {
            config.receive_timeout_ms = Some(DEFAULT_CLI_TIMEOUT_MS);
        }

        config.validate()?;
        Ok(config)
    }

    /// 执行监听
    #[cfg(target_os = "linux")]
    pub fn execute(&self) -> Result<()> {
        use encoder_driver::EncoderBuilder;
        use tracing::info;

        let config = self.resolve_config()?;

        println!("🔌 打开接口 {} ...", config.interface);
        let mut encoder = EncoderBuilder::from_config(&config)
            .build()
            .with_context(|| format!("failed to open {}", config.interface))?;

        if self.raw_values {
            let _ = encoder.on_angle_raw(|id, angle, vel, rot| {
                println!("[0x{:03X}] angle_raw={} velocity_raw={} rotations={}", id, angle, vel, rot);
            });
            let _ = encoder.on_temperature_raw(|id, raw| {
                println!("[0x{:03X}] temperature_raw={}", id, raw);
            });
        } else {
            let _ = encoder.on_angle(|id, angle, vel, rot| {
                println!("[0x{:03X}] angle={:.3}° velocity={:.3}°/s rotations={}", id, angle, vel, rot);
            });
            let _ = encoder.on_temperature(|id, celsius| {
                println!("[0x{:03X}] temperature={:.2} °C", id, celsius);
            });
        }

        if self.raw {
            let _ = encoder.on_raw_frame(|frame| {
                let bytes: Vec<String> =
                    frame.data_slice().iter().map(|b| format!("{:02X}", b)).collect();
                println!("[0x{:03X}] raw {}", frame.id, bytes.join(" "));
            });
        }

        if config.track_deltas {
            let _ = encoder.on_delta(|delta| {
                let [a, b, c] = delta.register_deltas();
                println!("[0x{:03X}] {:?} delta {:+} {:+} {:+}", delta.can_id, delta.kind, a, b, c);
            });
        }

        let token = encoder.cancellation_token();
        ctrlc::set_handler(move || {
            println!("\n收到退出信号，正在关闭...");
            token.cancel();
        })?;

        println!("✅ 开始监听（Ctrl-C 退出）");
        let reason = encoder.run();
        encoder.close();

        let metrics = encoder.metrics();
        info!("Read loop stopped: {}", reason);
        println!("📊 {}", metrics);

        if reason.is_cancelled() {
            Ok(())
        } else {
            Err(anyhow::anyhow!("read loop stopped: {}", reason))
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn execute(&self) -> Result<()> {
        anyhow::bail!("SocketCAN is only available on Linux")
    }
}
