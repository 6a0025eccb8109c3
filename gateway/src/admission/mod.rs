//! 租户准入控制
//!
//! 基于订阅等级的请求预算、资源配额与功能开关

pub mod check;
pub mod classifier;
pub mod limiter;
pub mod middleware;
pub mod quota;
pub mod store;
pub mod sweeper;
pub mod tier;
pub mod types;

pub use check::{AdmissionCheck, FailOpen, PlanAdmission};
pub use classifier::OperationClassifier;
pub use limiter::RateLimiter;
pub use middleware::{AdmissionState, admission_middleware, apply_rate_limit_headers};
pub use quota::{CountSource, QuotaEnforcer};
pub use store::{InMemoryResourceCounter, InMemoryWindowStore, StaticSubscriptionStore};
pub use sweeper::spawn_window_sweeper;
pub use tier::TierPolicyResolver;
pub use types::{
    Admitted, Denied, Enforcement, Operation, QuotaCheckResult, RateLimitResult, Stage, WINDOW,
};
