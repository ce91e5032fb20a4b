use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{info, warn};
use vigil_controller::{Controller, Supervisor};
use vigil_core::metrics::{MetricsRecorder, Recorder};
use vigil_core::Registry;
use vigil_pipeline::{build_chain, register_builtin, ResourcePipeline};

mod config;

use config::Config;

#[derive(Parser, Debug)]
#[command(name = "vigilctl", version, about = "Watch Kubernetes resources and report what changed")]
struct Cli {
    /// Namespace to watch (default: all namespaces)
    #[arg(short = 'n', long, env = "VIGIL_NAMESPACE")]
    namespace: Option<String>,

    /// Path to a kubeconfig; in-cluster or default config otherwise
    #[arg(short = 'k', long, env = "VIGIL_KUBECONFIG")]
    kubeconfig: Option<PathBuf>,

    /// Configuration file
    #[arg(short = 'c', long = "config", env = "VIGIL_CONFIG_FILE", default_value = "./config.yaml")]
    config: PathBuf,

    /// Label selector applied to every watched resource
    #[arg(short = 'l', long, env = "VIGIL_LABEL_SELECTOR")]
    label_selector: Option<String>,

    /// Log level when VIGIL_LOG is unset
    #[arg(short = 'z', long, default_value = "info")]
    log_level: String,

    /// Serve Prometheus metrics on host:port
    #[arg(long, env = "VIGIL_METRICS_ADDR")]
    metrics_addr: Option<String>,
}

fn init_tracing(default_level: &str) {
    let env = std::env::var("VIGIL_LOG").unwrap_or_else(|_| default_level.to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(true).init();
}

fn init_metrics(addr: Option<&str>) {
    let Some(addr) = addr else { return };
    match addr.parse::<std::net::SocketAddr>() {
        Ok(sock) => {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => warn!(error = %e, "failed to install metrics exporter"),
            }
        }
        Err(_) => warn!(addr = %addr, "invalid metrics address; expected host:port"),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!(error = %e, "cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };
    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut s) => {
                s.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Ctrl-C received; shutting down"),
        _ = terminate => info!("SIGTERM received; shutting down"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);
    init_metrics(cli.metrics_addr.as_deref());

    let cfg = Config::load(&cli.config)?;
    info!(config = %cli.config.display(), handlers = cfg.handlers.len(), resources = cfg.resources.len(), "config loaded");

    let client = vigil_kubehub::client(cli.kubeconfig.as_deref()).await?;
    let registry = Registry::new();
    register_builtin(&registry);
    vigil_kubehub::register_resources(&registry, client, cli.namespace.clone(), cli.label_selector.clone());

    let recorder: Arc<dyn Recorder> = Arc::new(MetricsRecorder);
    let mut supervisor = Supervisor::new(cfg.controller.shutdown_timeout());
    for res in &cfg.resources {
        let source = registry.build_source(res).with_context(|| format!("resource {}", res.kind))?;
        // one chain per resource so diff state is never shared across kinds
        let chain = build_chain(&registry, &cfg.handlers).context("building handler chain")?;
        let pipeline = Arc::new(ResourcePipeline::new(res.kind.clone(), chain));
        let controller =
            Controller::new(cfg.controller.controller_config(&res.kind), source, pipeline, Arc::clone(&recorder));
        supervisor.add(controller);
    }

    let supervisor = Arc::new(supervisor);
    {
        let supervisor = Arc::clone(&supervisor);
        tokio::spawn(async move {
            shutdown_signal().await;
            supervisor.shutdown();
        });
    }
    info!(controllers = supervisor.len(), namespace = ?cli.namespace, "vigil running");
    supervisor.run().await.context("controller failed")?;
    info!("vigil stopped");
    Ok(())
}
