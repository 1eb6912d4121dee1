//! # Encoder CLI
//!
//! 旋转编码器 CAN 遥测的命令行工具。
//!
//! ```bash
//! # 监听 can0 上 0x101 的全部消息，Ctrl-C 退出
//! encoder-cli listen --interface can0 --can-id 0x101
//!
//! # 只看温度，打印原始寄存器
//! encoder-cli listen --filter temperature --raw-values
//!
//! # 使用配置文件（命令行参数覆盖文件）
//! encoder-cli listen --config encoder.toml --deltas
//!
//! # 检查接口状态
//! encoder-cli check can0
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};

mod commands;

use commands::{CheckCommand, ListenCommand};

/// Encoder CLI - 编码器遥测命令行工具
#[derive(Parser, Debug)]
#[command(name = "encoder-cli")]
#[command(about = "Listen to rotary-encoder telemetry on a SocketCAN bus", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 监听并打印解码后的遥测数据
    Listen {
        #[command(flatten)]
        args: ListenCommand,
    },

    /// 检查 CAN 接口是否存在且已启动
    Check {
        #[command(flatten)]
        args: CheckCommand,
    },
}

fn main() -> Result<()> {
    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("encoder_cli=info".parse()?)
                .add_directive("encoder_driver=info".parse()?),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Listen { args } => args.execute(),
        Commands::Check { args } => args.execute(),
    }
}
