//! 等级策略解析
//!
//! 租户 → 等级策略，本地 TTL 缓存；查询失败或超时时返回最严格的策略

use crate::metrics;
use moka::future::Cache;
use plangate_common::{TenantId, TierCatalog, TierPolicy};
use plangate_errors::{AppError, AppResult};
use plangate_ports::TenantSubscriptionStore;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// 等级策略解析器
#[derive(Clone)]
pub struct TierPolicyResolver {
    catalog: Arc<TierCatalog>,
    store: Arc<dyn TenantSubscriptionStore>,
    cache: Cache<TenantId, Arc<TierPolicy>>,
    lookup_timeout: Duration,
}

impl TierPolicyResolver {
    pub fn new(
        catalog: Arc<TierCatalog>,
        store: Arc<dyn TenantSubscriptionStore>,
        cache_ttl: Duration,
        cache_capacity: u64,
        lookup_timeout: Duration,
    ) -> Self {
        let cache = Cache::builder()
            .max_capacity(cache_capacity)
            .time_to_live(cache_ttl)
            .build();

        Self {
            catalog,
            store,
            cache,
            lookup_timeout,
        }
    }

    /// 解析租户的等级策略，从不失败
    ///
    /// 同一租户并发未命中时只查询一次存储；失败结果不缓存
    pub async fn resolve(&self, tenant_id: &TenantId) -> Arc<TierPolicy> {
        match self
            .cache
            .try_get_with(tenant_id.clone(), self.lookup(tenant_id))
            .await
        {
            Ok(policy) => policy,
            Err(e) => {
                let fallback = self.catalog.fallback();
                warn!(
                    tenant_id = %tenant_id,
                    error = %e,
                    fallback_tier = %fallback.name,
                    "Tier lookup failed, using most restrictive tier"
                );
                metrics::record_tier_fallback(match e.as_ref() {
                    AppError::Timeout(_) => "timeout",
                    _ => "error",
                });
                fallback
            }
        }
    }

    /// 使缓存失效，下一次解析重新查询
    pub async fn invalidate(&self, tenant_id: &TenantId) {
        self.cache.invalidate(tenant_id).await;
    }

    pub fn catalog(&self) -> &TierCatalog {
        &self.catalog
    }

    async fn lookup(&self, tenant_id: &TenantId) -> AppResult<Arc<TierPolicy>> {
        let tier = match tokio::time::timeout(self.lookup_timeout, self.store.get_tier(tenant_id))
            .await
        {
            Ok(Ok(tier)) => tier,
            Ok(Err(e)) => {
                metrics::record_tier_lookup("error");
                return Err(e);
            }
            Err(_) => {
                metrics::record_tier_lookup("timeout");
                return Err(AppError::timeout(format!(
                    "subscription lookup exceeded {}ms",
                    self.lookup_timeout.as_millis()
                )));
            }
        };

        let Some(tier) = tier else {
            metrics::record_tier_lookup("not_found");
            debug!(tenant_id = %tenant_id, "No subscription found, using default tier");
            return Ok(self.catalog.fallback());
        };

        match self.catalog.get(&tier) {
            Some(policy) => {
                metrics::record_tier_lookup("found");
                debug!(tenant_id = %tenant_id, tier = %tier, "Tier policy resolved");
                Ok(policy)
            }
            None => {
                metrics::record_tier_lookup("unknown_tier");
                metrics::record_tier_fallback("unknown_tier");
                warn!(
                    tenant_id = %tenant_id,
                    tier = %tier,
                    "Subscription references unknown tier, using most restrictive tier"
                );
                Ok(self.catalog.fallback())
            }
        }
    }
}
