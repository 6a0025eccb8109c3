//! 组装准入服务
//!
//! 外部协作方（订阅存储、窗口存储、资源计数、时钟）由调用方注入

use crate::admission::{
    AdmissionState, FailOpen, InMemoryResourceCounter, InMemoryWindowStore, OperationClassifier,
    PlanAdmission, QuotaEnforcer, RateLimiter, StaticSubscriptionStore, TierPolicyResolver,
};
use metrics_exporter_prometheus::PrometheusHandle;
use plangate_common::{Clock, ResourceKind, SystemClock};
use plangate_config::AppConfig;
use plangate_errors::{AppError, AppResult};
use plangate_ports::{RateWindowStore, ResourceCountProvider, TenantSubscriptionStore};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// 外部协作方
pub struct Collaborators {
    pub subscriptions: Arc<dyn TenantSubscriptionStore>,
    pub window_store: Arc<dyn RateWindowStore>,
    pub counters: HashMap<ResourceKind, Arc<dyn ResourceCountProvider>>,
    pub clock: Arc<dyn Clock>,
}

impl Collaborators {
    /// 单实例部署：全部使用进程内实现
    ///
    /// 租户等级取自配置的 `tenants` 表；资源计数从 0 开始
    pub fn in_memory(config: &AppConfig) -> Self {
        let counters = ResourceKind::ALL
            .into_iter()
            .filter(|kind| !config.admission.external_count_kinds.contains(kind))
            .map(|kind| {
                let counter: Arc<dyn ResourceCountProvider> =
                    Arc::new(InMemoryResourceCounter::new());
                (kind, counter)
            })
            .collect();

        Self {
            subscriptions: Arc::new(StaticSubscriptionStore::from_assignments(&config.tenants)),
            window_store: Arc::new(InMemoryWindowStore::new()),
            counters,
            clock: Arc::new(SystemClock),
        }
    }
}

/// 准入服务
#[derive(Clone)]
pub struct AdmissionService {
    pub resolver: TierPolicyResolver,
    pub limiter: RateLimiter,
    pub quota: QuotaEnforcer,
    pub state: AdmissionState,
}

impl AdmissionService {
    pub fn build(config: &AppConfig, collaborators: Collaborators) -> AppResult<Self> {
        let admission = &config.admission;
        let catalog = config
            .tier_catalog()
            .map_err(|e| AppError::validation(e.to_string()))?;

        let resolver = TierPolicyResolver::new(
            Arc::new(catalog),
            collaborators.subscriptions,
            admission.policy_cache_ttl(),
            admission.policy_cache_capacity,
            admission.lookup_timeout(),
        );
        let limiter = RateLimiter::new(collaborators.window_store, collaborators.clock);

        let mut quota = QuotaEnforcer::new(resolver.clone());
        for kind in ResourceKind::ALL {
            if admission.external_count_kinds.contains(&kind) {
                quota = quota.with_external(kind);
            } else if let Some(counter) = collaborators.counters.get(&kind) {
                quota = quota.with_provider(kind, counter.clone());
            } else {
                warn!(resource = %kind, "No count provider registered for resource");
            }
        }

        let classifier = OperationClassifier::from_rules(&admission.rules)?;
        info!(
            rules = classifier.len(),
            fallback_tier = %resolver.catalog().fallback().name,
            enabled = admission.enabled,
            "Admission control configured"
        );

        let check = FailOpen::new(PlanAdmission::new(
            resolver.clone(),
            limiter.clone(),
            quota.clone(),
        ));
        let mut state = AdmissionState::new(Arc::new(check), Arc::new(classifier));
        if !admission.enabled {
            warn!("Admission control disabled, all requests pass unchecked");
            state = state.disabled();
        }

        Ok(Self {
            resolver,
            limiter,
            quota,
            state,
        })
    }
}

/// 路由共享状态
#[derive(Clone)]
pub struct AppState {
    pub admission: AdmissionService,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(admission: AdmissionService) -> Self {
        Self {
            admission,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
