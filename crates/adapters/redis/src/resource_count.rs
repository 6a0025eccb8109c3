//! Redis 资源计数镜像

use async_trait::async_trait;
use plangate_common::{ResourceKind, TenantId};
use plangate_errors::{AppError, AppResult};
use plangate_ports::ResourceCountProvider;
use redis::AsyncCommands;
use redis::aio::ConnectionManager;

use crate::connection::prefixed_key;

/// 读取 `{prefix}:tenant:{id}:count:{kind}`
///
/// 计数由业务服务在创建/删除资源时维护
#[derive(Clone)]
pub struct RedisResourceCounter {
    conn: ConnectionManager,
    key_prefix: String,
    kind: ResourceKind,
}

impl RedisResourceCounter {
    pub fn new(conn: ConnectionManager, kind: ResourceKind) -> Self {
        Self {
            conn,
            key_prefix: "plangate".to_string(),
            kind,
        }
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn count_key(&self, tenant_id: &TenantId) -> String {
        prefixed_key(
            &self.key_prefix,
            &["tenant", tenant_id.as_str(), "count", self.kind.as_str()],
        )
    }
}

#[async_trait]
impl ResourceCountProvider for RedisResourceCounter {
    async fn count(&self, tenant_id: &TenantId) -> AppResult<u64> {
        let mut conn = self.conn.clone();
        let count: Option<i64> = conn.get(self.count_key(tenant_id)).await.map_err(|e| {
            AppError::external_service(format!(
                "Redis {} count lookup failed: {}",
                self.kind, e
            ))
        })?;

        Ok(count.unwrap_or(0).max(0) as u64)
    }
}
