//! admission-registry - A Kubernetes admission webhook for image registries and annotations.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Parses flags and builds the immutable registry whitelist
//! - Starts the health server and the TLS webhook server

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::signal;
use tokio::task::JoinError;
use tracing::{error, info, warn};

use admission_registry::health::{HealthState, run_health_server};
use admission_registry::{Config, WebhookState, run_webhook_server};

/// Grace period for in-flight reviews to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("admission_registry=info".parse()?),
        )
        .json()
        .init();

    let config = Config::parse();
    let whitelist = Arc::new(config.whitelist());
    if whitelist.is_empty() {
        warn!("No whitelisted registries configured, every pod will be denied");
    }

    info!(
        port = config.port,
        health_port = config.health_port,
        registries = ?whitelist.registries(),
        "Starting admission-registry"
    );

    // Create shared health state
    let health_state = Arc::new(HealthState::new());

    // Start health server immediately so liveness works while TLS loads
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move { run_health_server(health_state, port).await })
    };

    // Failing to load the key pair is fatal
    let webhook_handle = {
        let state = Arc::new(WebhookState::new(whitelist, health_state.clone()));
        let config = config.clone();
        tokio::spawn(async move {
            run_webhook_server(state, config.port, &config.tls_cert_file, &config.tls_key_file)
                .await
        })
    };

    tokio::select! {
        result = webhook_handle => server_exit("Webhook", result)?,
        result = health_handle => server_exit("Health", result)?,
        // Handle graceful shutdown on SIGTERM or SIGINT
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            // Mark as not ready so the Service stops routing reviews here
            health_state.set_ready(false).await;
            info!("Marked webhook as not ready");

            info!(
                "Waiting {}s for in-flight reviews to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Admission webhook stopped");
    Ok(())
}

/// Turn the outcome of a finished server task into the process result.
///
/// A server error or a panicked task fails the process so the pod restarts.
fn server_exit<E>(
    name: &str,
    result: Result<Result<(), E>, JoinError>,
) -> Result<(), Box<dyn std::error::Error>>
where
    E: std::error::Error + 'static,
{
    match result {
        Ok(Ok(())) => {
            warn!("{} server stopped", name);
            Ok(())
        }
        Ok(Err(e)) => {
            error!("{} server error: {}", name, e);
            Err(e.into())
        }
        Err(e) => {
            error!("{} server task panicked: {}", name, e);
            Err(e.into())
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal - the webhook cannot shut down
/// gracefully without them. Using expect() here is intentional.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
