//! 限流器
//!
//! 每租户固定 60 秒窗口，窗口从租户第一次请求开始计时

use crate::admission::types::{RateLimitResult, WINDOW};
use plangate_common::{Clock, Limit, TenantId};
use plangate_errors::AppResult;
use plangate_ports::RateWindowStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 限流器
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateWindowStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateWindowStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// 计数并判断是否允许
    ///
    /// 被拒绝的请求同样计数；不限量时不访问存储
    pub async fn check_and_increment(
        &self,
        tenant_id: &TenantId,
        limit: Limit,
    ) -> AppResult<RateLimitResult> {
        let now_ms = self.clock.now_millis();

        let limit = match limit {
            Limit::Unlimited => return Ok(RateLimitResult::unmetered(now_ms)),
            Limit::Limited(n) => n,
        };

        let snapshot = self
            .store
            .check_and_increment(tenant_id, now_ms, WINDOW)
            .await?;
        let result = RateLimitResult::from_snapshot(limit, snapshot, now_ms);

        debug!(
            tenant_id = %tenant_id,
            count = result.count,
            limit,
            allowed = result.allowed,
            "Rate limit check result"
        );

        Ok(result)
    }

    /// 清理空闲窗口
    ///
    /// 空闲阈值不小于窗口长度，避免清掉仍在计数的窗口
    pub async fn evict_idle(&self, idle_after: Duration) -> AppResult<usize> {
        let idle_after = idle_after.max(WINDOW);
        self.store
            .evict_idle(self.clock.now_millis(), idle_after)
            .await
    }

    pub async fn ping(&self) -> AppResult<()> {
        self.store.ping().await
    }
}
