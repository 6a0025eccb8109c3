//! 资源计数 trait 定义

use async_trait::async_trait;
use plangate_common::TenantId;
use plangate_errors::AppResult;

/// 资源计数提供方（每种受管控资源一个）
#[async_trait]
pub trait ResourceCountProvider: Send + Sync {
    /// 租户当前持有的资源数量
    async fn count(&self, tenant_id: &TenantId) -> AppResult<u64>;
}
