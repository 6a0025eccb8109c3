//! API 路由

use crate::admission::{QuotaCheckResult, admission_middleware, apply_rate_limit_headers};
use crate::app::AppState;
use crate::middleware::{AuthTenant, tenant_header_middleware};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderMap, Method, StatusCode, Uri},
    middleware,
    response::{IntoResponse, Response},
    routing::{any, get},
};
use plangate_common::{Feature, Limit, ResourceKind};
use plangate_errors::{AppError, AppResult};
use plangate_telemetry::HealthStatus;
use serde::Serialize;
use std::collections::BTreeMap;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub const FORWARDED_METHOD_HEADER: &str = "x-forwarded-method";
pub const FORWARDED_URI_HEADER: &str = "x-forwarded-uri";

/// 组装完整路由
pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/plan", get(current_plan))
        .route("/api/quota/{resource}", get(quota_preflight))
        .route("/api/features/{feature}", get(feature_availability))
        .route_layer(middleware::from_fn_with_state(
            state.admission.state.clone(),
            admission_middleware,
        ))
        .route_layer(middleware::from_fn(tenant_header_middleware));

    let verify = Router::new()
        .route("/admission/verify", any(verify_forwarded))
        .route_layer(middleware::from_fn(tenant_header_middleware));

    ops_routes()
        .merge(api)
        .merge(verify)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// 运维路由，不经过准入控制
pub fn ops_routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_export))
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<HealthStatus>) {
    let mut status = HealthStatus::new();
    match state.admission.limiter.ping().await {
        Ok(()) => status.add_check("rate_window_store", true, None),
        Err(e) => status.add_check("rate_window_store", false, Some(e.to_string())),
    }

    let code = if status.healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (code, Json(status))
}

async fn metrics_export(State(state): State<AppState>) -> Response {
    match &state.metrics {
        Some(handle) => handle.render().into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}

/// 租户当前生效的等级策略
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanView {
    pub tenant_id: String,
    pub tier: String,
    pub requests_per_minute: Limit,
    pub resource_caps: BTreeMap<&'static str, Limit>,
    pub features: Vec<Feature>,
}

async fn current_plan(
    State(state): State<AppState>,
    AuthTenant(tenant_id): AuthTenant,
) -> Json<PlanView> {
    let policy = state.admission.resolver.resolve(&tenant_id).await;

    let resource_caps = policy
        .resource_caps
        .iter()
        .map(|(kind, limit)| (kind.as_str(), *limit))
        .collect();
    let mut features: Vec<Feature> = policy.features.iter().copied().collect();
    features.sort_by_key(|f| f.as_str());

    Json(PlanView {
        tenant_id: tenant_id.to_string(),
        tier: policy.name.clone(),
        requests_per_minute: policy.requests_per_minute,
        resource_caps,
        features,
    })
}

async fn quota_preflight(
    State(state): State<AppState>,
    AuthTenant(tenant_id): AuthTenant,
    Path(resource): Path<String>,
) -> AppResult<Json<QuotaCheckResult>> {
    let resource: ResourceKind = resource
        .parse()
        .map_err(|e: plangate_common::PlanError| AppError::validation(e.to_string()))?;

    let result = state.admission.quota.preflight(&tenant_id, resource).await;
    Ok(Json(result))
}

#[derive(Debug, Serialize)]
pub struct FeatureView {
    pub feature: Feature,
    pub available: bool,
}

async fn feature_availability(
    State(state): State<AppState>,
    AuthTenant(tenant_id): AuthTenant,
    Path(feature): Path<String>,
) -> AppResult<Json<FeatureView>> {
    let feature: Feature = feature
        .parse()
        .map_err(|e: plangate_common::PlanError| AppError::validation(e.to_string()))?;

    let available = state.admission.quota.has_feature(&tenant_id, feature).await;
    Ok(Json(FeatureView { feature, available }))
}

/// 反向代理前置校验（forward auth）
///
/// 代理通过 `x-forwarded-method` / `x-forwarded-uri` 传递原始请求，
/// 放行返回 204 与限流头，拒绝时返回与中间件一致的错误响应
async fn verify_forwarded(
    State(state): State<AppState>,
    AuthTenant(tenant_id): AuthTenant,
    headers: HeaderMap,
) -> Response {
    let admission = &state.admission.state;
    if !admission.enabled {
        return StatusCode::NO_CONTENT.into_response();
    }

    let (method, uri) = match forwarded_request(&headers) {
        Ok(forwarded) => forwarded,
        Err(e) => {
            warn!(tenant_id = %tenant_id, error = %e, "Malformed forward-auth request");
            return e.into_response();
        }
    };

    let operation = admission.classifier.classify(&method, &uri);
    match admission.check.check(&tenant_id, &operation).await {
        Ok(admitted) => {
            let mut response = StatusCode::NO_CONTENT.into_response();
            if let Some(rate) = &admitted.rate {
                apply_rate_limit_headers(response.headers_mut(), rate);
            }
            response
        }
        Err(denied) => denied.error.into_response(),
    }
}

/// 读取代理转发的原始方法与路径，缺失或无法解析时为校验错误
fn forwarded_request(headers: &HeaderMap) -> AppResult<(Method, Uri)> {
    let method = headers
        .get(FORWARDED_METHOD_HEADER)
        .ok_or_else(|| AppError::validation(format!("missing {}", FORWARDED_METHOD_HEADER)))?;
    let method = Method::from_bytes(method.as_bytes())
        .map_err(|e| AppError::validation(format!("invalid {}: {}", FORWARDED_METHOD_HEADER, e)))?;

    let uri = headers
        .get(FORWARDED_URI_HEADER)
        .ok_or_else(|| AppError::validation(format!("missing {}", FORWARDED_URI_HEADER)))?;
    let uri = uri
        .to_str()
        .map_err(|e| AppError::validation(format!("invalid {}: {}", FORWARDED_URI_HEADER, e)))?
        .parse::<Uri>()
        .map_err(|e| AppError::validation(format!("invalid {}: {}", FORWARDED_URI_HEADER, e)))?;

    Ok((method, uri))
}
