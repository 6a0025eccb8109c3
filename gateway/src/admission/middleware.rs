//! 准入中间件
//!
//! 租户 → 等级策略 → 限流 → 配额/功能 → 放行并附加限流头，或拒绝

use crate::admission::check::AdmissionCheck;
use crate::admission::classifier::OperationClassifier;
use crate::admission::types::RateLimitResult;
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue},
    middleware::Next,
    response::{IntoResponse, Response},
};
use plangate_common::{Limit, TenantContext};
use plangate_errors::AppError;
use std::sync::Arc;
use tracing::debug;

pub const HEADER_LIMIT: &str = "X-RateLimit-Limit";
pub const HEADER_REMAINING: &str = "X-RateLimit-Remaining";
pub const HEADER_RESET: &str = "X-RateLimit-Reset";

/// 准入中间件状态
#[derive(Clone)]
pub struct AdmissionState {
    pub check: Arc<dyn AdmissionCheck>,
    pub classifier: Arc<OperationClassifier>,
    pub enabled: bool,
}

impl AdmissionState {
    pub fn new(check: Arc<dyn AdmissionCheck>, classifier: Arc<OperationClassifier>) -> Self {
        Self {
            check,
            classifier,
            enabled: true,
        }
    }

    pub fn disabled(mut self) -> Self {
        self.enabled = false;
        self
    }
}

/// Axum 中间件函数
///
/// 必须挂在写入 `TenantContext` 的认证中间件之后
pub async fn admission_middleware(
    State(state): State<AdmissionState>,
    mut request: Request,
    next: Next,
) -> Response {
    if !state.enabled {
        return next.run(request).await;
    }

    let Some(tenant_id) = request
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant_id.clone())
    else {
        return AppError::unauthorized("missing tenant context").into_response();
    };

    let operation = state.classifier.classify(request.method(), request.uri());

    let admitted = match state.check.check(&tenant_id, &operation).await {
        Ok(admitted) => admitted,
        Err(denied) => return denied.error.into_response(),
    };

    debug!(
        tenant_id = %tenant_id,
        endpoint = %request.uri().path(),
        method = %request.method(),
        tier = ?admitted.tier,
        "Request admitted"
    );

    let rate = admitted.rate.clone();
    request.extensions_mut().insert(admitted);

    let mut response = next.run(request).await;
    if let Some(rate) = rate {
        apply_rate_limit_headers(response.headers_mut(), &rate);
    }
    response
}

/// 添加限流信息头，不限量时取值为 `unlimited`
pub fn apply_rate_limit_headers(headers: &mut HeaderMap, result: &RateLimitResult) {
    let (limit, remaining) = match result.limit {
        Limit::Unlimited => (
            HeaderValue::from_static("unlimited"),
            HeaderValue::from_static("unlimited"),
        ),
        Limit::Limited(n) => (
            HeaderValue::from(n),
            HeaderValue::from(result.remaining.unwrap_or(0)),
        ),
    };

    headers.insert(HEADER_LIMIT, limit);
    headers.insert(HEADER_REMAINING, remaining);
    headers.insert(HEADER_RESET, HeaderValue::from(result.reset_at));
}
