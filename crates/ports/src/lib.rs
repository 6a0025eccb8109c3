//! ports - 抽象 trait 层
//!
//! 准入控制依赖的外部协作方与可替换存储

mod rate_window;
mod resource_count;
mod subscription;

pub use rate_window::*;
pub use resource_count::*;
pub use subscription::*;
