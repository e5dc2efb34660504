//! Bucketgate - entry point.

use std::path::PathBuf;

use anyhow::Context;
use tracing::info;

use bucketgate_proxy::{GateConfig, GateServer};
use bucketgate_telemetry::init_telemetry;

/// Command-line arguments.
struct Args {
    /// Path to configuration file.
    config: Option<PathBuf>,
}

impl Args {
    fn parse() -> Self {
        let mut args = std::env::args().skip(1);
        let mut config = None;

        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--config" | "-c" => {
                    config = args.next().map(PathBuf::from);
                }
                "--help" | "-h" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("bucketgate {}", bucketgate_proxy::VERSION);
                    std::process::exit(0);
                }
                other => {
                    eprintln!("Unknown argument: {other}");
                    eprintln!("Use --help for usage information");
                    std::process::exit(1);
                }
            }
        }

        Self { config }
    }
}

fn print_help() {
    println!(
        r"Bucketgate - authorizing object storage gateway

USAGE:
    bucketgate [OPTIONS]

OPTIONS:
    -c, --config <PATH>    Path to configuration file (TOML or JSON)
    -h, --help             Print help information
    -v, --version          Print version information

ENVIRONMENT VARIABLES:
    BUCKETGATE_LISTEN_PORT       Listen port (default: 8080)
    BUCKETGATE_LISTEN_ADDR       Bind address (default: 0.0.0.0)
    BUCKETGATE_REQUEST_TIMEOUT   Per-request deadline, e.g. 30s or 500ms
    BUCKETGATE_LOG_LEVEL         Log filter, e.g. info or bucketgate_authz=debug
    BUCKETGATE_OTLP_ENDPOINT     OpenTelemetry collector endpoint
    BUCKETGATE_METRICS_ADDR      Prometheus listener address, e.g. 0.0.0.0:9090

EXAMPLES:
    bucketgate --config /etc/bucketgate/gate.toml
    BUCKETGATE_LISTEN_PORT=9000 bucketgate -c gate.toml
"
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => GateConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => GateConfig::default(),
    }
    .with_env_overrides();
    config.validate().context("invalid configuration")?;

    let _telemetry =
        init_telemetry(config.telemetry.clone()).context("failed to initialize telemetry")?;

    info!(
        version = bucketgate_proxy::VERSION,
        listen_addr = %config.server.listen_addr,
        listen_port = config.server.listen_port,
        targets = config.targets.len(),
        "starting bucketgate"
    );

    let server = GateServer::new(config).context("failed to build gateway")?;
    server.run().await.context("server error")?;

    info!("bucketgate stopped");
    Ok(())
}
