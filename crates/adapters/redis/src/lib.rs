//! plangate-adapter-redis - Redis 适配器
//!
//! 多实例部署时共享限流窗口、租户等级与资源计数镜像

mod connection;
mod rate_window;
mod resource_count;
mod subscription;

pub use connection::*;
pub use rate_window::*;
pub use resource_count::*;
pub use subscription::*;
