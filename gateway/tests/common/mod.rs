//! 集成测试公共设施
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
    middleware,
    response::Response,
    routing::{any, post, put},
};
use figment::{
    Figment,
    providers::{Format, Toml},
};
use plangate_common::{ManualClock, ResourceKind, TenantId};
use plangate_config::AppConfig;
use plangate_errors::{AppError, AppResult};
use plangate_gateway::admission::{
    InMemoryResourceCounter, InMemoryWindowStore, StaticSubscriptionStore, admission_middleware,
};
use plangate_gateway::middleware::{TENANT_HEADER, tenant_header_middleware};
use plangate_gateway::{AdmissionService, AppState, Collaborators, build_router};
use plangate_ports::{
    RateWindowStore, ResourceCountProvider, TenantSubscriptionStore, WindowSnapshot,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

pub const T0: u64 = 1_700_000_000_000;

pub const TEST_CONFIG: &str = r#"
app_name = "plangate-test"
app_env = "test"

[server]
host = "127.0.0.1"
port = 0

[admission]
lookup_timeout_ms = 100
fallback_tier = "Starter"
external_count_kinds = ["external_guest"]

[[admission.rules]]
method = "POST"
path = "^/api/client-spaces/?$"
resource = "client_space"

[[admission.rules]]
method = "POST"
path = "^/api/client-spaces/[^/]+/guests/?$"
resource = "external_guest"

[[admission.rules]]
method = "PUT"
path = "^/api/branding/?$"
feature = "custom_branding"

[tiers.Starter]
requests_per_minute = 300
features = ["api_access"]

[tiers.Starter.resource_caps]
client_space = 5
team_member = 3
external_guest = 10

[tiers.Professional]
requests_per_minute = 1000
features = ["api_access", "custom_branding"]

[tiers.Professional.resource_caps]
client_space = 50

[tiers.Enterprise]
requests_per_minute = "unlimited"
features = ["api_access", "custom_branding", "audit_log"]

[tiers.Enterprise.resource_caps]
client_space = "unlimited"

[tiers.Tiny]
requests_per_minute = 20

[tenants]
starter = "Starter"
pro = "Professional"
enterprise = "Enterprise"
tiny = "Tiny"
"#;

pub fn test_config(extra: &str) -> AppConfig {
    AppConfig::from_figment(
        Figment::new()
            .merge(Toml::string(TEST_CONFIG))
            .merge(Toml::string(extra)),
    )
    .unwrap()
}

/// 订阅存储始终失败
pub struct FailingSubscriptionStore;

#[async_trait]
impl TenantSubscriptionStore for FailingSubscriptionStore {
    async fn get_tier(&self, _tenant_id: &TenantId) -> AppResult<Option<String>> {
        Err(AppError::external_service("subscription store unavailable"))
    }
}

/// 订阅存储响应超过查询超时
pub struct SlowSubscriptionStore(pub Duration);

#[async_trait]
impl TenantSubscriptionStore for SlowSubscriptionStore {
    async fn get_tier(&self, _tenant_id: &TenantId) -> AppResult<Option<String>> {
        tokio::time::sleep(self.0).await;
        Ok(Some("Enterprise".to_string()))
    }
}

/// 窗口存储始终失败
pub struct FailingWindowStore;

#[async_trait]
impl RateWindowStore for FailingWindowStore {
    async fn check_and_increment(
        &self,
        _tenant_id: &TenantId,
        _now_ms: u64,
        _window: Duration,
    ) -> AppResult<WindowSnapshot> {
        Err(AppError::internal("window store unavailable"))
    }

    async fn evict_idle(&self, _now_ms: u64, _idle_after: Duration) -> AppResult<usize> {
        Err(AppError::internal("window store unavailable"))
    }

    async fn ping(&self) -> AppResult<()> {
        Err(AppError::external_service("window store unavailable"))
    }
}

/// 资源计数读取失败
pub struct FailingCounter;

#[async_trait]
impl ResourceCountProvider for FailingCounter {
    async fn count(&self, _tenant_id: &TenantId) -> AppResult<u64> {
        Err(AppError::external_service("resource counter unavailable"))
    }
}

pub struct Harness {
    pub service: AdmissionService,
    pub clock: Arc<ManualClock>,
    pub subscriptions: Arc<StaticSubscriptionStore>,
    pub counters: HashMap<ResourceKind, Arc<InMemoryResourceCounter>>,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(test_config(""), None, None, None)
    }

    pub fn with_config(extra: &str) -> Self {
        Self::build(test_config(extra), None, None, None)
    }

    pub fn with_subscriptions(store: Arc<dyn TenantSubscriptionStore>) -> Self {
        Self::build(test_config(""), Some(store), None, None)
    }

    pub fn with_window_store(store: Arc<dyn RateWindowStore>) -> Self {
        Self::build(test_config(""), None, Some(store), None)
    }

    /// 指定资源的计数读取失败
    pub fn with_failing_counter(kind: ResourceKind) -> Self {
        Self::build(test_config(""), None, None, Some(kind))
    }

    pub fn build(
        config: AppConfig,
        subscriptions: Option<Arc<dyn TenantSubscriptionStore>>,
        window_store: Option<Arc<dyn RateWindowStore>>,
        failing_counter: Option<ResourceKind>,
    ) -> Self {
        let clock = Arc::new(ManualClock::new(T0));
        let static_subscriptions =
            Arc::new(StaticSubscriptionStore::from_assignments(&config.tenants));

        let counters: HashMap<ResourceKind, Arc<InMemoryResourceCounter>> = ResourceKind::ALL
            .into_iter()
            .filter(|kind| !config.admission.external_count_kinds.contains(kind))
            .map(|kind| (kind, Arc::new(InMemoryResourceCounter::new())))
            .collect();
        let providers = counters
            .iter()
            .map(|(kind, counter)| {
                let provider: Arc<dyn ResourceCountProvider> = if failing_counter == Some(*kind) {
                    Arc::new(FailingCounter)
                } else {
                    counter.clone()
                };
                (*kind, provider)
            })
            .collect();

        let collaborators = Collaborators {
            subscriptions: match subscriptions {
                Some(store) => store,
                None => static_subscriptions.clone(),
            },
            window_store: match window_store {
                Some(store) => store,
                None => Arc::new(InMemoryWindowStore::new()),
            },
            counters: providers,
            clock: clock.clone(),
        };

        Self {
            service: AdmissionService::build(&config, collaborators).unwrap(),
            clock,
            subscriptions: static_subscriptions,
            counters,
        }
    }

    pub fn set_count(&self, tenant: &str, kind: ResourceKind, count: u64) {
        self.counters[&kind].set(TenantId::new(tenant), count);
    }

    /// 网关自身路由
    pub fn router(&self) -> Router {
        build_router(AppState::new(self.service.clone()))
    }

    /// 受准入中间件保护的业务路由
    pub fn business_router(&self) -> Router {
        Router::new()
            .route("/api/client-spaces", post(created))
            .route("/api/client-spaces/{id}/guests", post(created))
            .route("/api/branding", put(ok))
            .route("/api/projects", any(ok))
            .layer(middleware::from_fn_with_state(
                self.service.state.clone(),
                admission_middleware,
            ))
            .layer(middleware::from_fn(tenant_header_middleware))
    }
}

async fn ok() -> StatusCode {
    StatusCode::OK
}

async fn created() -> StatusCode {
    StatusCode::CREATED
}

pub fn request(method: Method, path: &str, tenant: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(tenant) = tenant {
        builder = builder.header(TENANT_HEADER, tenant);
    }
    builder.body(Body::empty()).unwrap()
}

pub async fn json_body(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

pub fn header<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}
