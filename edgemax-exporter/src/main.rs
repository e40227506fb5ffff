//! Prometheus exporter for EdgeMAX appliances.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::sync::watch;
use tracing::{error, info};

use edgemax_client::{ApplianceAuthenticator, WebSocketConnector};
use edgemax_exporter::{
    ExporterConfig, Exposition, HttpServer, ReconnectSupervisor, StatsAggregator,
};

/// Prometheus exporter for EdgeMAX appliances.
#[derive(Parser, Debug)]
#[command(name = "edgemax-exporter")]
#[command(about = "Export EdgeMAX appliance statistics as Prometheus metrics")]
#[command(version)]
struct Args {
    /// Path to configuration file (JSON5 format).
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address (overrides config).
    #[arg(long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Appliance URL.
    #[arg(long, env = "EDGEMAX_HOST")]
    host: Option<String>,

    /// Login username.
    #[arg(long, env = "EDGEMAX_USER")]
    user: Option<String>,

    /// Login password.
    #[arg(long, env = "EDGEMAX_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Disable verification of TLS certificates (discouraged).
    #[arg(long, env = "EDGEMAX_SKIP_VERIFY")]
    tls_skip_verify: bool,

    /// PEM-encoded CA certificate used to verify the appliance.
    #[arg(long, env = "EDGEMAX_CACERT")]
    ca_cert: Option<PathBuf>,
}

impl Args {
    /// Apply command line and environment overrides on top of the file.
    fn apply(self, config: &mut ExporterConfig) {
        if let Some(listen) = self.listen {
            config.prometheus.listen = listen;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(host) = self.host {
            config.appliance.host = host;
        }
        if let Some(user) = self.user {
            config.appliance.username = user;
        }
        if let Some(password) = self.password {
            config.appliance.password = password;
        }
        if self.tls_skip_verify {
            config.appliance.tls.skip_verify = true;
        }
        if let Some(ca_cert) = self.ca_cert {
            config.appliance.tls.ca_cert = Some(ca_cert);
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Both the login client and the stream use the ring provider.
    let _ = rustls::crypto::ring::default_provider().install_default();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => ExporterConfig::load_from_file(path)?,
        None => ExporterConfig::default(),
    };
    args.apply(&mut config);
    config.validate()?;

    edgemax_common::init_tracing(&config.logging)?;

    info!(host = %config.appliance.host, "Starting EdgeMAX exporter");

    // Create shutdown signal
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let aggregator = Arc::new(StatsAggregator::new());

    // Parse listen address
    let listen_addr = config
        .prometheus
        .listen
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid listen address: {}", e))?;

    // Create components
    let authenticator = ApplianceAuthenticator::new(&config.appliance)?;
    let connector = WebSocketConnector::new(&config.appliance)?;
    let supervisor =
        ReconnectSupervisor::new(authenticator, connector, aggregator.clone(), &config.appliance);
    let http_server = HttpServer::bind(
        listen_addr,
        aggregator.clone(),
        Exposition::new(&config.prometheus, &config.appliance.host),
        config.prometheus.path.clone(),
    )
    .await?;

    // Start supervisor
    let supervisor_task = tokio::spawn(supervisor.run(shutdown_rx.clone()));

    // Start HTTP server
    let http_shutdown = shutdown_rx.clone();
    let http_task = tokio::spawn(async move {
        if let Err(e) = http_server.run(http_shutdown).await {
            error!("HTTP server error: {}", e);
        }
    });

    wait_for_signal().await?;

    // Signal shutdown
    shutdown_tx.send(true)?;

    // Wait for tasks to complete
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = supervisor_task.await;
        let _ = http_task.await;
    })
    .await;

    // Print final stats
    let stats = aggregator.stats();
    info!(
        events_applied = stats.events_applied,
        sessions_started = stats.sessions_started,
        session_failures = stats.session_failures,
        interfaces = aggregator.interface_count(),
        "Final statistics"
    );

    info!("Exporter stopped");
    Ok(())
}

async fn wait_for_signal() -> anyhow::Result<()> {
    #[cfg(unix)]
    {
        let mut sigterm =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                result?;
                info!("Received Ctrl+C, shutting down...");
            }
            _ = sigterm.recv() => {
                info!("Received SIGTERM, shutting down...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        tokio::signal::ctrl_c().await?;
        info!("Received Ctrl+C, shutting down...");
    }

    Ok(())
}
