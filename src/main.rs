//! CLI for TrackBridge
//!
//! Opens the serial port and the broker websocket, then bridges the two until
//! Ctrl-C or a fatal error.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, info};

use trackbridge::bridge::Bridge;
use trackbridge::broker::BrokerClient;
use trackbridge::config::{Settings, load_config_from};
use trackbridge::device::{DeviceWriter, SensorFanout, open_serial, spawn_line_reader};
use trackbridge::transport;
use trackbridge::utils::shutdown::{self, ShutdownSignal};
use trackbridge::utils::{BridgeError, logging};

#[derive(Parser)]
#[command(name = "trackbridge", about = "Bridge broker topics to a model-railway controller")]
struct Cli {
    /// Configuration file, without extension
    #[arg(long, default_value = "config/default")]
    config: String,
    /// Overrides the configured log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let settings = match load_config_from(&cli.config) {
        Ok(settings) => settings,
        Err(e) => {
            logging::init(cli.log_level.as_deref().unwrap_or("info"));
            error!("Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };
    logging::init(cli.log_level.as_deref().unwrap_or(&settings.logging.level));

    let (trigger, signal) = shutdown::channel();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Ctrl+C pressed, shutting down");
            trigger.trigger();
        }
    });

    match run(settings, signal).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Bridge stopped: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(settings: Settings, shutdown: ShutdownSignal) -> Result<(), BridgeError> {
    let policy = settings.delivery.policy();

    info!("Opening connection to serial port {}", settings.device.port);
    let (reader, writer) = open_serial(&settings.device)?;
    let (device, _writer_thread) = DeviceWriter::spawn(writer, policy.capacity)?;
    let (lines, _reader_thread) = spawn_line_reader(reader, policy.capacity, shutdown.clone())?;

    info!("Opening connection to broker at {}", settings.broker.url);
    let ws_stream = transport::connect(&settings.broker.url).await?;
    let (client, inbound) =
        BrokerClient::new(ws_stream, policy, settings.broker.accept_version.clone());

    let fanout = Arc::new(SensorFanout::new(policy));
    let bridge = Bridge::new(Arc::new(client), device, fanout, settings.topics.clone());
    bridge.run(inbound, lines, shutdown).await
}
