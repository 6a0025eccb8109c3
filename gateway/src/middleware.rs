//! 中间件

use axum::{
    extract::{FromRequestParts, Request},
    middleware::Next,
    response::Response,
};
use plangate_common::{TenantContext, TenantId};
use plangate_errors::AppError;
use tracing::debug;

/// 上游认证网关写入的租户头
pub const TENANT_HEADER: &str = "x-tenant-id";

/// 租户提取器
///
/// 用于从请求中获取已认证的租户，应该在 `tenant_header_middleware` 之后使用
pub struct AuthTenant(pub TenantId);

impl<S> FromRequestParts<S> for AuthTenant
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut axum::http::request::Parts,
        _state: &S,
    ) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<TenantContext>()
            .map(|ctx| AuthTenant(ctx.tenant_id.clone()))
            .ok_or_else(|| AppError::unauthorized("missing tenant context"))
    }
}

/// 可信租户头中间件
///
/// 认证在上游完成，这里只把 `x-tenant-id` 转换为 `TenantContext`；
/// 缺失或为空时不写入，由准入中间件返回 401
pub async fn tenant_header_middleware(mut request: Request, next: Next) -> Response {
    let tenant = request
        .headers()
        .get(TENANT_HEADER)
        .and_then(|h| h.to_str().ok())
        .and_then(TenantId::parse);

    match tenant {
        Some(tenant_id) => {
            debug!(tenant_id = %tenant_id, "Tenant context attached");
            request
                .extensions_mut()
                .insert(TenantContext::new(tenant_id));
        }
        None => debug!("Request carries no tenant header"),
    }

    next.run(request).await
}
