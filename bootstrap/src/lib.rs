//! plangate-bootstrap - 服务启动骨架
//!
//! 日志初始化、关闭信号与后台任务的停止控制

mod runtime;
mod shutdown;

pub use runtime::*;
pub use shutdown::*;
