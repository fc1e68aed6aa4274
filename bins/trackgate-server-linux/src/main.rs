use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use trackgate_core::config::GatewayConfig;
use trackgate_core::PositionRecord;
use trackgate_protocol::{DeviceSessionRegistry, MemoryDeviceDirectory};
use trackgate_server::TrackerServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "info,trackgate_server=debug".into()),
        ))
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Trackgate gateway starting...");

    let config = load_config()?;
    if config.protocols.is_empty() {
        anyhow::bail!("no protocols configured");
    }

    // Device directory seeded from the config file
    let mut directory = MemoryDeviceDirectory::new();
    if config.register_unknown {
        directory = directory.with_register_unknown();
    }
    for device in &config.devices {
        directory.register(device.id, &device.unique_id);
        tracing::debug!("registered device {} ({})", device.id, device.unique_id);
    }
    let sessions = Arc::new(DeviceSessionRegistry::new(Arc::new(directory)));

    // All servers feed one position sink
    let (position_tx, position_rx) = tokio::sync::mpsc::channel::<PositionRecord>(1024);
    let sink_handle = tokio::spawn(log_positions(position_rx));

    let mut server_handles = Vec::new();
    for protocol in &config.protocols {
        let Some(plugin) = trackgate_plugins::create(&protocol.name) else {
            anyhow::bail!(
                "unknown protocol {:?}, available: {}",
                protocol.name,
                trackgate_plugins::available().join(", ")
            );
        };
        let server = TrackerServer::new(
            plugin,
            protocol.clone(),
            sessions.clone(),
            position_tx.clone(),
        );
        server_handles.push(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                tracing::error!("Server error: {}", e);
            }
        }));
    }
    drop(position_tx);

    tracing::info!("Trackgate gateway ready, {} listener(s)", server_handles.len());

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received Ctrl+C, shutting down...");
        }
        _ = sink_handle => {
            tracing::warn!("Position sink stopped");
        }
        _ = futures::future::join_all(server_handles) => {
            tracing::warn!("All servers stopped");
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Load the gateway configuration from the path given as the first argument,
/// falling back to `trackgate.json` in the working directory.
fn load_config() -> anyhow::Result<GatewayConfig> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "trackgate.json".to_string());
    let text = std::fs::read_to_string(&path)
        .map_err(|e| anyhow::anyhow!("cannot read config {:?}: {}", path, e))?;
    let config: GatewayConfig = serde_json::from_str(&text)
        .map_err(|e| anyhow::anyhow!("cannot parse config {:?}: {}", path, e))?;
    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Terminal sink: log every decoded position.
async fn log_positions(mut rx: tokio::sync::mpsc::Receiver<PositionRecord>) {
    while let Some(position) = rx.recv().await {
        tracing::info!(
            "position device={} protocol={} time={} lat={:.6} lon={:.6} speed={:.1}kn valid={}",
            position.device_id,
            position.protocol,
            position.fix_time.to_rfc3339_opts(chrono::SecondsFormat::Secs, true),
            position.latitude,
            position.longitude,
            position.speed,
            position.valid,
        );
    }
}
