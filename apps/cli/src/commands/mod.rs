//! 命令定义和实现

pub mod check;
pub mod listen;

pub use check::CheckCommand;
pub use listen::ListenCommand;
