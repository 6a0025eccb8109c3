//! 限流窗口存储 trait 定义

use async_trait::async_trait;
use plangate_common::TenantId;
use plangate_errors::AppResult;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// 一次计数后的窗口快照
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowSnapshot {
    /// 窗口起始时间（Unix 毫秒）
    pub window_start_ms: u64,
    /// 包含本次请求在内的计数
    pub count: u64,
}

impl WindowSnapshot {
    /// 计入一次请求后的窗口
    ///
    /// 无窗口或 `now_ms - window_start_ms >= window` 时以 `(now_ms, 1)` 开启新窗口，
    /// 否则在原窗口上计数。各存储实现（含 Redis 脚本）都遵循这一规则
    pub fn advance(previous: Option<Self>, now_ms: u64, window: Duration) -> Self {
        let window_ms = window.as_millis() as u64;
        match previous {
            Some(prev) if now_ms.saturating_sub(prev.window_start_ms) < window_ms => Self {
                window_start_ms: prev.window_start_ms,
                count: prev.count.saturating_add(1),
            },
            _ => Self {
                window_start_ms: now_ms,
                count: 1,
            },
        }
    }

    /// 窗口重置时间（Unix 毫秒）
    pub fn reset_at_ms(&self, window: Duration) -> u64 {
        self.window_start_ms + window.as_millis() as u64
    }
}

/// 租户限流窗口存储
///
/// 实现必须保证同一租户的“取出/替换/递增”对并发调用原子，
/// 且不同租户之间不共享同一把锁
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// 原子地取出或创建窗口并计数
    ///
    /// 当 `now_ms - window_start_ms >= window` 时用 `(now_ms, 1)` 替换旧窗口
    async fn check_and_increment(
        &self,
        tenant_id: &TenantId,
        now_ms: u64,
        window: Duration,
    ) -> AppResult<WindowSnapshot>;

    /// 清理空闲超过 `idle_after` 的窗口，返回清理数量
    async fn evict_idle(&self, now_ms: u64, idle_after: Duration) -> AppResult<usize>;

    /// 存储连通性检查
    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const WINDOW: Duration = Duration::from_secs(60);
    const T0: u64 = 1_000_000;

    fn open(count: u64) -> Option<WindowSnapshot> {
        Some(WindowSnapshot {
            window_start_ms: T0,
            count,
        })
    }

    #[test]
    fn test_first_request_opens_window() {
        let snapshot = WindowSnapshot::advance(None, T0, WINDOW);
        assert_eq!(
            snapshot,
            WindowSnapshot {
                window_start_ms: T0,
                count: 1
            }
        );
    }

    #[test]
    fn test_counts_inside_window() {
        let snapshot = WindowSnapshot::advance(open(7), T0 + 59_999, WINDOW);
        assert_eq!(snapshot.window_start_ms, T0);
        assert_eq!(snapshot.count, 8);
    }

    #[test]
    fn test_window_replaced_at_exact_length() {
        let snapshot = WindowSnapshot::advance(open(300), T0 + 60_000, WINDOW);
        assert_eq!(
            snapshot,
            WindowSnapshot {
                window_start_ms: T0 + 60_000,
                count: 1
            }
        );
    }

    #[test]
    fn test_reset_at() {
        assert_eq!(open(1).unwrap().reset_at_ms(WINDOW), T0 + 60_000);
    }
}
