//! Well Billing Service entry point.

use service_core::observability::init_tracing;
use tokio::signal;
use well_billing_service::config::BillingConfig;
use well_billing_service::services::init_metrics;
use well_billing_service::startup::Application;

/// Resolves on Ctrl+C or SIGTERM. A handler that cannot be installed never
/// fires, leaving the other one in charge.
async fn wait_for_stop() {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Ctrl+C handler unavailable");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "SIGTERM handler unavailable");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => tracing::info!(signal = "interrupt", "Stopping well-billing-service"),
        _ = terminate => tracing::info!(signal = "terminate", "Stopping well-billing-service"),
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = BillingConfig::from_env().map_err(|e| {
        eprintln!("well-billing-service configuration is invalid: {}", e);
        std::io::Error::other(e.to_string())
    })?;

    init_tracing(
        &config.service_name,
        &config.log_level,
        config.otlp_endpoint.as_deref(),
    );
    init_metrics();

    // The database URL carries credentials and stays out of the logs
    tracing::info!(
        version = %config.service_version,
        listen = %format!("{}:{}", config.common.host, config.common.port),
        db_pool = %format!(
            "{}..{}",
            config.database.min_connections, config.database.max_connections
        ),
        unowned_field_policy = ?config.distribution.unowned_field_policy,
        payment_terms_days = config.distribution.payment_terms_days,
        tracing_export = config.otlp_endpoint.is_some(),
        "Starting well-billing-service"
    );

    let app = Application::build(config).await.map_err(|e| {
        tracing::error!(error = %e, "well-billing-service failed to start");
        std::io::Error::other(e.to_string())
    })?;

    tokio::select! {
        served = app.run_until_stopped() => served?,
        _ = wait_for_stop() => {}
    }

    tracing::info!("well-billing-service stopped");
    Ok(())
}
