//! Redis 租户订阅存储

use async_trait::async_trait;
use plangate_common::TenantId;
use plangate_errors::{AppError, AppResult};
use plangate_ports::TenantSubscriptionStore;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::connection::prefixed_key;

/// 从 `{prefix}:tenant:{id}:tier` 读取租户等级
///
/// 键由计费系统写入，本适配器只读
#[derive(Clone)]
pub struct RedisSubscriptionStore {
    conn: ConnectionManager,
    key_prefix: String,
}

impl RedisSubscriptionStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            key_prefix: "plangate".to_string(),
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn tier_key(&self, tenant_id: &TenantId) -> String {
        prefixed_key(&self.key_prefix, &["tenant", tenant_id.as_str(), "tier"])
    }
}

#[async_trait]
impl TenantSubscriptionStore for RedisSubscriptionStore {
    async fn get_tier(&self, tenant_id: &TenantId) -> AppResult<Option<String>> {
        let mut conn = self.conn.clone();
        let tier: Option<String> = conn
            .get(self.tier_key(tenant_id))
            .await
            .map_err(|e| AppError::external_service(format!("Redis tier lookup failed: {}", e)))?;

        Ok(tier.filter(|t| !t.trim().is_empty()))
    }
}
