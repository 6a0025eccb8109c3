//! 准入检查
//!
//! `PlanAdmission` 按 限流 → 配额 → 功能 的顺序检查；
//! `FailOpen` 包装任意检查，把内部错误转换为放行

use crate::admission::limiter::RateLimiter;
use crate::admission::quota::QuotaEnforcer;
use crate::admission::tier::TierPolicyResolver;
use crate::admission::types::{Admitted, Denied, Operation, Stage};
use crate::metrics;
use async_trait::async_trait;
use plangate_common::TenantId;
use tracing::{error, info};

/// 准入检查
///
/// 返回 `Err` 时，业务拒绝（`Denied::is_rejection`）面向调用方，其余为内部错误
#[async_trait]
pub trait AdmissionCheck: Send + Sync {
    async fn check(&self, tenant_id: &TenantId, operation: &Operation)
    -> Result<Admitted, Denied>;
}

/// 基于等级策略的准入检查
#[derive(Clone)]
pub struct PlanAdmission {
    resolver: TierPolicyResolver,
    limiter: RateLimiter,
    quota: QuotaEnforcer,
}

impl PlanAdmission {
    pub fn new(resolver: TierPolicyResolver, limiter: RateLimiter, quota: QuotaEnforcer) -> Self {
        Self {
            resolver,
            limiter,
            quota,
        }
    }
}

#[async_trait]
impl AdmissionCheck for PlanAdmission {
    async fn check(
        &self,
        tenant_id: &TenantId,
        operation: &Operation,
    ) -> Result<Admitted, Denied> {
        let policy = self.resolver.resolve(tenant_id).await;

        let rate = self
            .limiter
            .check_and_increment(tenant_id, policy.requests_per_minute)
            .await
            .map_err(|e| Denied::new(Stage::Rate, e))?;
        if !rate.allowed {
            info!(
                tenant_id = %tenant_id,
                tier = %policy.name,
                count = rate.count,
                "Rate limit exceeded"
            );
            metrics::record_admission("rate_limited");
            return Err(Denied::new(Stage::Rate, rate.to_rejection(&policy.name)).after(&rate));
        }

        let quota = match operation.resource {
            Some(resource) => {
                let result = self
                    .quota
                    .check_against(&policy, tenant_id, resource)
                    .await
                    .map_err(|e| Denied::new(Stage::Quota, e).after(&rate))?;
                if !result.allowed {
                    info!(
                        tenant_id = %tenant_id,
                        tier = %policy.name,
                        resource = %resource,
                        current_count = ?result.current_count,
                        "Resource quota exceeded"
                    );
                    metrics::record_admission("quota_exceeded");
                    return Err(Denied::new(Stage::Quota, result.to_rejection()).after(&rate));
                }
                Some(result)
            }
            None => None,
        };

        if let Some(feature) = operation.feature {
            if let Err(e) = QuotaEnforcer::feature_gate(&policy, feature) {
                info!(
                    tenant_id = %tenant_id,
                    tier = %policy.name,
                    feature = %feature,
                    "Feature not available on tier"
                );
                metrics::record_admission("feature_denied");
                return Err(Denied::new(Stage::Feature, e).after(&rate));
            }
        }

        metrics::record_admission("admitted");
        Ok(Admitted {
            tier: Some(policy.name.clone()),
            rate: Some(rate),
            quota,
        })
    }
}

/// 失败放行装饰器
///
/// 业务拒绝原样返回；其他错误记录日志与指标后放行，并保留已计数的限流结果
pub struct FailOpen<C> {
    inner: C,
}

impl<C> FailOpen<C> {
    pub fn new(inner: C) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<C: AdmissionCheck> AdmissionCheck for FailOpen<C> {
    async fn check(
        &self,
        tenant_id: &TenantId,
        operation: &Operation,
    ) -> Result<Admitted, Denied> {
        match self.inner.check(tenant_id, operation).await {
            Err(denied) if !denied.is_rejection() => {
                error!(
                    tenant_id = %tenant_id,
                    stage = denied.stage.as_str(),
                    error = %denied.error,
                    "Admission check failed, allowing request (fail-open)"
                );
                metrics::record_fail_open(denied.stage.as_str());
                metrics::record_admission("fail_open");
                Ok(Admitted::fail_open(denied.rate))
            }
            other => other,
        }
    }
}
