//! Redis 限流窗口存储
//!
//! 固定窗口，Lua 脚本保证“取出/替换/递增”在单个键上原子执行

use async_trait::async_trait;
use plangate_common::TenantId;
use plangate_errors::{AppError, AppResult};
use plangate_ports::{RateWindowStore, WindowSnapshot};
use redis::Script;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::connection::{check_connection, prefixed_key};

/// Lua 脚本：固定窗口计数
///
/// # 参数
/// - KEYS[1]: 租户窗口键（hash: start, count）
/// - ARGV[1]: 当前时间（毫秒）
/// - ARGV[2]: 窗口长度（毫秒）
///
/// # 返回值
/// - array[0]: 窗口起始时间
/// - array[1]: 包含本次请求的计数
static FIXED_WINDOW_SCRIPT: &str = r#"
local key = KEYS[1]
local now = tonumber(ARGV[1])
local window_ms = tonumber(ARGV[2])

local start = tonumber(redis.call('HGET', key, 'start'))
local count

-- 无窗口或窗口已过期：整体替换
if (not start) or (now - start >= window_ms) then
    start = now
    count = 1
    redis.call('HSET', key, 'start', start, 'count', count)
else
    count = redis.call('HINCRBY', key, 'count', 1)
end

-- 空闲租户的键由过期时间回收
redis.call('PEXPIRE', key, window_ms * 2)

return {start, count}
"#;

/// Redis 限流窗口存储
#[derive(Clone)]
pub struct RedisRateWindowStore {
    conn: ConnectionManager,
    script: Arc<Script>,
    key_prefix: String,
}

impl RedisRateWindowStore {
    pub fn new(conn: ConnectionManager) -> Self {
        Self {
            conn,
            script: Arc::new(Script::new(FIXED_WINDOW_SCRIPT)),
            key_prefix: "plangate".to_string(),
        }
    }

    /// 设置键前缀
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    fn window_key(&self, tenant_id: &TenantId) -> String {
        prefixed_key(&self.key_prefix, &["rl", tenant_id.as_str()])
    }
}

#[async_trait]
impl RateWindowStore for RedisRateWindowStore {
    async fn check_and_increment(
        &self,
        tenant_id: &TenantId,
        now_ms: u64,
        window: Duration,
    ) -> AppResult<WindowSnapshot> {
        let mut conn = self.conn.clone();
        let key = self.window_key(tenant_id);

        let values: Vec<i64> = self
            .script
            .key(&key)
            .arg(now_ms)
            .arg(window.as_millis() as u64)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| AppError::internal(format!("Rate window script failed: {}", e)))?;

        if values.len() != 2 {
            return Err(AppError::internal(format!(
                "Unexpected rate window script result length: {}",
                values.len()
            )));
        }

        let snapshot = WindowSnapshot {
            window_start_ms: values[0].max(0) as u64,
            count: values[1].max(0) as u64,
        };

        debug!(
            key,
            window_start_ms = snapshot.window_start_ms,
            count = snapshot.count,
            "Rate window incremented"
        );

        Ok(snapshot)
    }

    async fn evict_idle(&self, _now_ms: u64, _idle_after: Duration) -> AppResult<usize> {
        // 键自带 PEXPIRE，无需主动清理
        Ok(0)
    }

    async fn ping(&self) -> AppResult<()> {
        let mut conn = self.conn.clone();
        check_connection(&mut conn).await
    }
}
