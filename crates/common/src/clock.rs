//! 时钟抽象
//!
//! 限流窗口按毫秒计时，测试中可替换为手动时钟

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// 时钟
pub trait Clock: Send + Sync {
    /// 当前 Unix 时间（毫秒）
    fn now_millis(&self) -> u64;

    /// 当前 Unix 时间（秒）
    fn now_secs(&self) -> u64 {
        self.now_millis() / 1000
    }
}

/// 系统时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        chrono::Utc::now().timestamp_millis().max(0) as u64
    }
}

/// 手动推进的时钟
#[derive(Debug, Default)]
pub struct ManualClock {
    millis: AtomicU64,
}

impl ManualClock {
    pub fn new(start_millis: u64) -> Self {
        Self {
            millis: AtomicU64::new(start_millis),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis
            .fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set(&self, millis: u64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.millis.load(Ordering::SeqCst)
    }
}
