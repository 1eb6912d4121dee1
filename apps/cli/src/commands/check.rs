//! 接口检查命令

use anyhow::Result;
use clap::Args;

/// 接口检查参数
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// CAN 接口名
    pub interface: String,
}

impl CheckCommand {
    #[cfg(target_os = "linux")]
    pub fn execute(&self) -> Result<()> {
        let status = encoder_can::check_interface_status(&self.interface)?;

        if status.is_up {
            println!("✅ {} (index {}) is UP", status.name, status.index);
            Ok(())
        } else {
            println!("⚠️  {} (index {}) is DOWN", status.name, status.index);
            anyhow::bail!(
                "interface {} is down, bring it up with: sudo ip link set up {}",
                status.name,
                status.name
            )
        }
    }

    #[cfg(not(target_os = "linux"))]
    pub fn execute(&self) -> Result<()> {
        anyhow::bail!("SocketCAN is only available on Linux")
    }
}
