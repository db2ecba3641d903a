use std::path::PathBuf;

use clap::Parser;
use dgs_bridge::{
    Acquisition, BoundedLog, Config, HttpForwarder, LinkManager, SerialConnector, SessionEnd,
};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "dgs-bridge")]
#[command(about = "Forwards DGS2 gas sensor readings from a serial port to the collection backend")]
struct Cli {
    /// Serial device the sensor is attached to
    #[arg(short, long)]
    port: Option<String>,

    /// Endpoint readings are POSTed to
    #[arg(short, long)]
    backend_url: Option<String>,

    /// CSV file for the local reading log
    #[arg(short, long)]
    log_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;

    let filter =
        std::env::var("RUST_LOG").unwrap_or_else(|_| "dgs_bridge=info,dgs_core=info".to_owned());
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    let mut config = Config::default();
    if let Some(port) = cli.port {
        config.serial.port = port;
    }
    if let Some(url) = cli.backend_url {
        config.backend.url = url;
    }
    if let Some(path) = cli.log_file {
        config.log.path = path;
    }

    info!(
        port = %config.serial.port,
        baud_rate = config.serial.baud_rate,
        backend_url = %config.backend.url,
        log_file = ?config.log.path,
        "DGS2 sensor bridge starting"
    );

    let forwarder = HttpForwarder::new(&config.backend)?;
    let link = LinkManager::new(SerialConnector, config.serial.clone());
    let log = BoundedLog::new(&config.log);
    let mut session = Acquisition::new(link, forwarder, log, config.poll_interval);

    let cancel = CancellationToken::new();
    let cancel_on_signal = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl+C, shutting down...");
                cancel_on_signal.cancel();
            }
            Err(e) => warn!(error = %e, "Unable to listen for Ctrl+C"),
        }
    });

    let summary = session.run(cancel).await;
    match summary.end {
        SessionEnd::Interrupted => info!(readings = summary.readings, "Stopped"),
        SessionEnd::LinkLost => warn!(readings = summary.readings, "Sensor link lost"),
        SessionEnd::ConnectFailed => warn!("Sensor never came online"),
    }

    Ok(())
}
