//! Per-protocol TCP server.
//!
//! The pipeline for each connection:
//! - socket bytes are fed to the plugin's frame decoder,
//! - complete frames go through `plugin.decode`,
//! - decoded records are sent to the position sink,
//! - queued replies are flushed back to the socket.
//!
//! A fatal frame error (oversized buffer) or EOF ends the connection; the
//! connection context closes its device session when dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use trackgate_core::{config::ProtocolConfig, PositionRecord};
use trackgate_protocol::{ConnectionContext, DeviceSessionRegistry, ProtocolPlugin};

/// Connection ids are unique across all servers in the process.
static NEXT_CONNECTION_ID: AtomicU64 = AtomicU64::new(1);

/// TCP server for a single protocol.
pub struct TrackerServer {
    plugin: Arc<dyn ProtocolPlugin>,
    config: ProtocolConfig,
    sessions: Arc<DeviceSessionRegistry>,
    positions: mpsc::Sender<PositionRecord>,
}

impl TrackerServer {
    pub fn new(
        plugin: Arc<dyn ProtocolPlugin>,
        config: ProtocolConfig,
        sessions: Arc<DeviceSessionRegistry>,
        positions: mpsc::Sender<PositionRecord>,
    ) -> Self {
        Self {
            plugin,
            config,
            sessions,
            positions,
        }
    }

    /// Bind the configured address and serve until the process exits.
    pub async fn run(self) -> std::io::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        info!(
            "{} server listening on {}",
            self.plugin.name(),
            self.config.bind_addr()
        );
        self.serve(listener).await
    }

    /// Accept connections on an already bound listener.
    pub async fn serve(self, listener: TcpListener) -> std::io::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    let plugin = self.plugin.clone();
                    let sessions = self.sessions.clone();
                    let positions = self.positions.clone();
                    let max_frame_size = self.config.max_frame_size;

                    tokio::spawn(async move {
                        let connection = NEXT_CONNECTION_ID.fetch_add(1, Ordering::Relaxed);
                        info!("{} connection {} from {}", plugin.name(), connection, addr);
                        if let Err(e) = handle_connection(
                            stream,
                            connection,
                            plugin.clone(),
                            sessions,
                            positions,
                            max_frame_size,
                        )
                        .await
                        {
                            warn!("{} connection {} error: {}", plugin.name(), connection, e);
                        }
                        debug!("{} connection {} closed", plugin.name(), connection);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }
}

/// Drive one connection until EOF, a socket error or a fatal frame error.
async fn handle_connection(
    mut stream: TcpStream,
    connection: u64,
    plugin: Arc<dyn ProtocolPlugin>,
    sessions: Arc<DeviceSessionRegistry>,
    positions: mpsc::Sender<PositionRecord>,
    max_frame_size: usize,
) -> std::io::Result<()> {
    // Dropping the context closes the device session.
    let mut ctx = ConnectionContext::new(connection, sessions);
    let mut decoder = plugin.frame_decoder(max_frame_size);
    let mut buf = vec![0u8; 2048];

    loop {
        let n = stream.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }

        let frames = match decoder.feed(&buf[..n]) {
            Ok(frames) => frames,
            Err(e) => {
                warn!("{} connection {}: {}", plugin.name(), connection, e);
                return Ok(());
            }
        };

        for frame in frames {
            let records = plugin.decode(&mut ctx, &frame);
            for record in records {
                if positions.send(record).await.is_err() {
                    // Sink gone; nothing left to ingest for.
                    return Ok(());
                }
            }
            for reply in ctx.take_replies() {
                stream.write_all(&reply).await?;
            }
        }
    }
}
