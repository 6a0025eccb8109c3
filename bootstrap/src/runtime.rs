//! 服务运行时

use plangate_config::AppConfig;
use plangate_telemetry::{TelemetryError, init_tracing};
use tracing::{info, warn};

/// 初始化服务运行时
///
/// 生产环境强制 JSON 日志
pub fn init_runtime(config: &AppConfig) -> Result<(), TelemetryError> {
    let json = config.telemetry.json || config.is_production();
    init_tracing(&config.telemetry.log_level, json)?;

    info!(
        app_name = %config.app_name,
        app_env = %config.app_env,
        json_logs = json,
        "Runtime initialized"
    );
    Ok(())
}

/// 等待关闭信号
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
