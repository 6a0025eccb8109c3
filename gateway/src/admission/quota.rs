//! 资源配额检查

use crate::admission::tier::TierPolicyResolver;
use crate::admission::types::{Enforcement, QuotaCheckResult, Stage};
use crate::metrics;
use plangate_common::{Feature, Limit, ResourceKind, TenantId, TierPolicy};
use plangate_errors::{AppError, AppResult};
use plangate_ports::ResourceCountProvider;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

/// 资源计数来源
#[derive(Clone)]
pub enum CountSource {
    /// 本系统可读取的计数
    Local(Arc<dyn ResourceCountProvider>),
    /// 计数在外部系统中，暂不强制
    External,
}

/// 配额检查器
#[derive(Clone)]
pub struct QuotaEnforcer {
    resolver: TierPolicyResolver,
    sources: HashMap<ResourceKind, CountSource>,
}

impl QuotaEnforcer {
    pub fn new(resolver: TierPolicyResolver) -> Self {
        Self {
            resolver,
            sources: HashMap::new(),
        }
    }

    /// 注册本地计数
    pub fn with_provider(
        mut self,
        kind: ResourceKind,
        provider: Arc<dyn ResourceCountProvider>,
    ) -> Self {
        self.sources.insert(kind, CountSource::Local(provider));
        self
    }

    /// 标记为外部计数
    pub fn with_external(mut self, kind: ResourceKind) -> Self {
        self.sources.insert(kind, CountSource::External);
        self
    }

    /// 检查是否还能创建一个资源（无副作用）
    pub async fn can_create(
        &self,
        tenant_id: &TenantId,
        resource: ResourceKind,
    ) -> AppResult<QuotaCheckResult> {
        let policy = self.resolver.resolve(tenant_id).await;
        self.check_against(&policy, tenant_id, resource).await
    }

    /// 按已解析的策略检查
    pub async fn check_against(
        &self,
        policy: &TierPolicy,
        tenant_id: &TenantId,
        resource: ResourceKind,
    ) -> AppResult<QuotaCheckResult> {
        let limit = policy.cap(resource);
        let unchecked = |enforcement: Enforcement| QuotaCheckResult {
            resource,
            tier: policy.name.clone(),
            allowed: true,
            current_count: None,
            limit,
            enforcement,
        };

        let cap = match limit {
            Limit::Unlimited => return Ok(unchecked(Enforcement::Unlimited)),
            Limit::Limited(cap) => cap,
        };

        let provider = match self.sources.get(&resource) {
            Some(CountSource::Local(provider)) => provider,
            Some(CountSource::External) => {
                debug!(
                    tenant_id = %tenant_id,
                    resource = %resource,
                    "Resource counted externally, quota not enforced"
                );
                return Ok(unchecked(Enforcement::ExternalUnenforced));
            }
            None => {
                return Err(AppError::internal(format!(
                    "no count provider registered for {}",
                    resource
                )));
            }
        };

        let current_count = provider.count(tenant_id).await?;

        Ok(QuotaCheckResult {
            resource,
            tier: policy.name.clone(),
            allowed: current_count < cap,
            current_count: Some(current_count),
            limit,
            enforcement: Enforcement::Enforced,
        })
    }

    /// 配额预检
    ///
    /// 计数读取失败时按放行返回，标记为 `Enforcement::Unavailable`
    pub async fn preflight(
        &self,
        tenant_id: &TenantId,
        resource: ResourceKind,
    ) -> QuotaCheckResult {
        let policy = self.resolver.resolve(tenant_id).await;
        match self.check_against(&policy, tenant_id, resource).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    tenant_id = %tenant_id,
                    resource = %resource,
                    error = %e,
                    "Resource count unavailable, reporting quota as unenforced"
                );
                metrics::record_fail_open(Stage::Quota.as_str());
                QuotaCheckResult {
                    resource,
                    tier: policy.name.clone(),
                    allowed: true,
                    current_count: None,
                    limit: policy.cap(resource),
                    enforcement: Enforcement::Unavailable,
                }
            }
        }
    }

    /// 超出配额时返回 `QuotaExceeded`
    pub async fn enforce(
        &self,
        tenant_id: &TenantId,
        resource: ResourceKind,
    ) -> AppResult<QuotaCheckResult> {
        let result = self.can_create(tenant_id, resource).await?;
        if result.allowed {
            Ok(result)
        } else {
            Err(result.to_rejection())
        }
    }

    pub async fn has_feature(&self, tenant_id: &TenantId, feature: Feature) -> bool {
        self.resolver.resolve(tenant_id).await.has_feature(feature)
    }

    /// 等级不含该功能时返回 `FeatureNotAvailable`
    pub async fn enforce_feature(&self, tenant_id: &TenantId, feature: Feature) -> AppResult<()> {
        let policy = self.resolver.resolve(tenant_id).await;
        Self::feature_gate(&policy, feature)
    }

    pub fn feature_gate(policy: &TierPolicy, feature: Feature) -> AppResult<()> {
        if policy.has_feature(feature) {
            Ok(())
        } else {
            Err(AppError::FeatureNotAvailable {
                tier: policy.name.clone(),
                feature: feature.to_string(),
            })
        }
    }
}
