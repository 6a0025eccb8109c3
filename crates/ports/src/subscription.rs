//! 租户订阅存储 trait 定义

use async_trait::async_trait;
use plangate_common::TenantId;
use plangate_errors::AppResult;

/// 租户订阅存储
///
/// 只被等级策略解析器调用
#[async_trait]
pub trait TenantSubscriptionStore: Send + Sync {
    /// 查询租户当前的等级名，租户不存在时返回 `None`
    async fn get_tier(&self, tenant_id: &TenantId) -> AppResult<Option<String>>;
}
