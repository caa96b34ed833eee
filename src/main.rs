//! Tailing Sidecar Kubernetes Operator
//!
//! Main entry point for the operator. Sets up the Kubernetes client, starts
//! the admission webhook and metrics servers, and waits for shutdown.

use clap::Parser;
use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tailing_sidecar_operator::{
    config::{Config, LogFormat},
    metrics,
    webhook::{server, tls, PodExtender},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    // Initialize tracing
    init_tracing(config.log_format);

    config.validate()?;

    info!("Starting Tailing Sidecar Operator");

    let tls_config = match (&config.tls_cert_file, &config.tls_key_file) {
        (Some(cert), Some(key)) => Some(tls::load_server_config(cert, key)?),
        _ => None,
    };

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes API server");

    let settings = config.injection_settings();
    info!(
        image = %settings.image,
        host_path_root = %settings.host_path_root,
        "Tailing sidecar settings"
    );
    let extender = PodExtender::new(client, settings);

    let shutdown = CancellationToken::new();

    // Start metrics server
    let metrics_handle = tokio::spawn(metrics::serve(config.metrics_port, shutdown.clone()));
    info!("Metrics server starting on port {}", config.metrics_port);

    // Run the webhook server
    let webhook_handle = tokio::spawn(server::serve(
        extender,
        config.webhook_port,
        tls_config,
        shutdown.clone(),
    ));

    // Handle graceful shutdown
    tokio::select! {
        res = webhook_handle => {
            error!("Webhook server exited unexpectedly: {:?}", res);
        }
        res = metrics_handle => {
            error!("Metrics server exited unexpectedly: {:?}", res);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, stopping operator");
        }
    }
    shutdown.cancel();

    info!("Tailing Sidecar Operator stopped");
    Ok(())
}

/// Initialize tracing subscriber
fn init_tracing(format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info,tailing_sidecar_operator=debug,kube=warn,hyper=warn")
    });

    let registry = tracing_subscriber::registry().with(env_filter);
    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install CTRL+C handler");
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
        _ = ctrl_c => {
            info!("Received CTRL+C signal");
        }
        _ = terminate => {
            info!("Received SIGTERM signal");
        }
    }
}
