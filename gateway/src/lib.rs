//! plangate-gateway - 租户准入网关
//!
//! 按订阅等级执行请求预算、资源配额与功能开关

pub mod admission;
pub mod app;
pub mod metrics;
pub mod middleware;
pub mod routing;

pub use app::{AdmissionService, AppState, Collaborators};
pub use routing::build_router;
