//! 进程内存储
//!
//! 单实例部署与测试使用；多实例部署使用 Redis 适配器

use async_trait::async_trait;
use dashmap::DashMap;
use plangate_common::TenantId;
use plangate_errors::AppResult;
use plangate_ports::{
    RateWindowStore, ResourceCountProvider, TenantSubscriptionStore, WindowSnapshot,
};
use std::collections::HashMap;
use std::time::Duration;
use tracing::debug;

/// 单个租户的窗口状态
#[derive(Debug, Clone, Copy)]
struct RateWindow {
    window_start_ms: u64,
    count: u64,
    last_seen_ms: u64,
}

impl RateWindow {
    fn fresh(now_ms: u64) -> Self {
        Self {
            window_start_ms: now_ms,
            count: 1,
            last_seen_ms: now_ms,
        }
    }

    fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            window_start_ms: self.window_start_ms,
            count: self.count,
        }
    }
}

/// 进程内限流窗口存储
///
/// DashMap 按分片加锁，`entry` 持有分片写锁期间完成“取出/替换/递增”，
/// 不同租户的请求互不阻塞
#[derive(Debug, Default)]
pub struct InMemoryWindowStore {
    windows: DashMap<TenantId, RateWindow>,
}

impl InMemoryWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// 当前跟踪的租户数
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

#[async_trait]
impl RateWindowStore for InMemoryWindowStore {
    async fn check_and_increment(
        &self,
        tenant_id: &TenantId,
        now_ms: u64,
        window: Duration,
    ) -> AppResult<WindowSnapshot> {
        let entry = self
            .windows
            .entry(tenant_id.clone())
            .and_modify(|w| {
                let next = WindowSnapshot::advance(Some(w.snapshot()), now_ms, window);
                w.window_start_ms = next.window_start_ms;
                w.count = next.count;
                w.last_seen_ms = w.last_seen_ms.max(now_ms);
            })
            .or_insert_with(|| RateWindow::fresh(now_ms));

        Ok(entry.snapshot())
    }

    async fn evict_idle(&self, now_ms: u64, idle_after: Duration) -> AppResult<usize> {
        let idle_ms = idle_after.as_millis() as u64;
        let before = self.windows.len();

        self.windows
            .retain(|_, w| now_ms.saturating_sub(w.last_seen_ms) < idle_ms);

        let evicted = before.saturating_sub(self.windows.len());
        if evicted > 0 {
            debug!(evicted, remaining = self.windows.len(), "Evicted idle rate windows");
        }
        Ok(evicted)
    }
}

/// 静态租户订阅（来自配置文件）
#[derive(Debug, Default)]
pub struct StaticSubscriptionStore {
    assignments: DashMap<TenantId, String>,
}

impl StaticSubscriptionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_assignments(assignments: &HashMap<String, String>) -> Self {
        let store = Self::new();
        for (tenant, tier) in assignments {
            store.assign(TenantId::new(tenant.as_str()), tier.as_str());
        }
        store
    }

    /// 设置租户等级
    pub fn assign(&self, tenant_id: TenantId, tier: impl Into<String>) {
        self.assignments.insert(tenant_id, tier.into());
    }

    pub fn remove(&self, tenant_id: &TenantId) {
        self.assignments.remove(tenant_id);
    }
}

#[async_trait]
impl TenantSubscriptionStore for StaticSubscriptionStore {
    async fn get_tier(&self, tenant_id: &TenantId) -> AppResult<Option<String>> {
        Ok(self.assignments.get(tenant_id).map(|t| t.value().clone()))
    }
}

/// 进程内资源计数
#[derive(Debug, Default)]
pub struct InMemoryResourceCounter {
    counts: DashMap<TenantId, u64>,
}

impl InMemoryResourceCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, tenant_id: TenantId, count: u64) {
        self.counts.insert(tenant_id, count);
    }

    pub fn increment(&self, tenant_id: TenantId) -> u64 {
        let mut entry = self.counts.entry(tenant_id).or_insert(0);
        *entry = entry.saturating_add(1);
        *entry
    }
}

#[async_trait]
impl ResourceCountProvider for InMemoryResourceCounter {
    async fn count(&self, tenant_id: &TenantId) -> AppResult<u64> {
        Ok(self.counts.get(tenant_id).map(|c| *c).unwrap_or(0))
    }
}
