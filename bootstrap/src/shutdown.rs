//! Graceful Shutdown

use std::future::Future;
use tokio::sync::watch;
use tracing::info;

/// Shutdown 控制器
///
/// 关闭状态是电平而非边沿：触发后再开始等待的任务也会立即返回
#[derive(Clone)]
pub struct ShutdownController {
    tx: watch::Sender<bool>,
    rx: watch::Receiver<bool>,
}

impl ShutdownController {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self { tx, rx }
    }

    /// 触发关闭
    pub fn shutdown(&self) {
        info!("Triggering shutdown");
        self.tx.send_replace(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.rx.borrow()
    }

    /// 等待关闭信号
    pub fn wait(&self) -> impl Future<Output = ()> + Send + 'static {
        let mut rx = self.rx.clone();
        async move {
            // 发送端随控制器存活，wait_for 只在关闭后返回
            let _ = rx.wait_for(|stopped| *stopped).await;
        }
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_wait_returns_after_shutdown() {
        let controller = ShutdownController::new();
        let waiter = tokio::spawn(controller.wait());

        controller.shutdown();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("waiter should finish")
            .unwrap();
        assert!(controller.is_shutdown());
    }

    #[tokio::test]
    async fn test_late_waiter_sees_shutdown() {
        let controller = ShutdownController::new();
        controller.shutdown();

        tokio::time::timeout(Duration::from_millis(100), controller.wait())
            .await
            .expect("shutdown already triggered");
    }
}
