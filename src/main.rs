//! `preview-relay` binary.
//!
//! Speaks JSON lines on stdin/stdout; logs go to stderr.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use tokio::io::BufReader;
use tracing::info;
use tracing_subscriber::EnvFilter;

use preview_relay::config::{DEFAULT_PORT, DEFAULT_TEMPLATES_DIR};
use preview_relay::{HostOutput, RelayConfig, RelayServer, Result};

#[derive(Parser)]
#[command(name = "preview-relay")]
#[command(about = "Relay between a host process and browser preview pages")]
struct Args {
    /// Port for WebSocket and HTTP (0 = auto-select)
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Host to bind to
    #[arg(short = 'b', long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Directory holding viewer.html, export.html and print.html
    #[arg(long, default_value = DEFAULT_TEMPLATES_DIR)]
    templates: PathBuf,

    /// Seconds a page gets to answer an export (0 = wait forever)
    #[arg(long, default_value_t = 30)]
    export_timeout_secs: u64,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_tracing(args.debug);

    let export_timeout =
        (args.export_timeout_secs > 0).then(|| Duration::from_secs(args.export_timeout_secs));

    let config = RelayConfig::builder()
        .ip(args.host)
        .port(args.port)
        .templates_dir(args.templates)
        .export_timeout(export_timeout)
        .build()?;

    let (host, _writer) = HostOutput::spawn_writer(tokio::io::stdout());
    let server = RelayServer::bind(config, host).await?;

    info!("Server running at http://localhost:{}", server.port());

    server.attach_host(BufReader::new(tokio::io::stdin()));

    tokio::signal::ctrl_c().await?;
    info!("Received shutdown signal, cleaning up...");

    server.shutdown().await;
    Ok(())
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `--debug`.
fn init_tracing(debug: bool) {
    let default_directive = if debug {
        "preview_relay=debug,tower_http=debug"
    } else {
        "preview_relay=info"
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}
