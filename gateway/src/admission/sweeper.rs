//! 空闲窗口清理

use crate::admission::limiter::RateLimiter;
use crate::metrics;
use plangate_bootstrap::ShutdownController;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// 启动后台清理任务，收到关闭信号后退出
pub fn spawn_window_sweeper(
    limiter: RateLimiter,
    interval: Duration,
    idle_after: Duration,
    shutdown: ShutdownController,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // interval 的第一次 tick 立即返回
        ticker.tick().await;

        let stopped = shutdown.wait();
        tokio::pin!(stopped);

        info!(
            interval_secs = interval.as_secs(),
            idle_secs = idle_after.as_secs(),
            "Rate window sweeper started"
        );

        loop {
            tokio::select! {
                _ = &mut stopped => break,
                _ = ticker.tick() => {
                    match limiter.evict_idle(idle_after).await {
                        Ok(0) => {}
                        Ok(evicted) => {
                            debug!(evicted, "Idle rate windows evicted");
                            metrics::record_windows_evicted(evicted);
                        }
                        Err(e) => warn!(error = %e, "Rate window sweep failed"),
                    }
                }
            }
        }

        info!("Rate window sweeper stopped");
    })
}
