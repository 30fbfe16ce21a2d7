use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use resref_kubehub::KubeDiscovery;
use resref_mapper::{render, Mapper, OutputFormat};
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(name = "resrefctl", version, about = "Resolve a resource argument and object name into a fully-qualified reference")]
struct Cli {
    /// Output format
    #[arg(short = 'o', long = "output", value_enum, default_value_t = OutputFormat::Yaml)]
    output: OutputFormat,

    /// Budget for client setup and for the discovery fetch, in seconds
    #[arg(long = "timeout-secs", env = "RESREF_TIMEOUT_SECS", default_value_t = 10)]
    timeout_secs: u64,

    /// Kubeconfig context (default: current context or in-cluster config)
    #[arg(long = "context", env = "RESREF_CONTEXT")]
    context: Option<String>,

    /// Resource argument: `pods`, `po`, `deploy.apps`, `deployments.v1.apps`
    resource: String,

    /// Object name
    name: String,
}

/// Await `fut`, giving up once `budget` elapses.
async fn within<T>(budget: Duration, what: &str, fut: impl Future<Output = Result<T>>) -> Result<T> {
    match tokio::time::timeout(budget, fut).await {
        Ok(res) => res,
        Err(_) => Err(anyhow!("{} timed out after {:?}", what, budget)),
    }
}

fn init_tracing() {
    let env = std::env::var("RESREF_LOG").unwrap_or_else(|_| "info".to_string());
    let filter = tracing_subscriber::EnvFilter::from_str(&env).unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .init();
}

fn init_metrics() {
    if let Ok(addr) = std::env::var("RESREF_METRICS_ADDR") {
        if let Ok(sock) = addr.parse::<std::net::SocketAddr>() {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            match builder.with_http_listener(sock).install() {
                Ok(_) => tracing::info!(addr = %addr, "Prometheus metrics exporter listening"),
                Err(e) => tracing::warn!(error = %e, "failed to install metrics exporter"),
            }
        } else {
            tracing::warn!(addr = %addr, "invalid RESREF_METRICS_ADDR; expected host:port");
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    init_metrics();
    let cli = Cli::parse();
    debug!(?cli, "args");

    let budget = Duration::from_secs(cli.timeout_secs);
    let source = within(budget, "loading kube config", KubeDiscovery::for_context(cli.context.as_deref()))
        .await
        .context("new discovery client")?;
    let mapper = Mapper::from_source(Arc::new(source), budget);

    info!(resource = %cli.resource, name = %cli.name, "mapping");
    let mapping = mapper.mapping_for(&cli.resource, &cli.name).await.context("mapping for")?;

    let out = render(&mapping, &cli.name, cli.output)?;
    if out.ends_with('\n') {
        print!("{}", out);
    } else {
        println!("{}", out);
    }
    Ok(())
}
