//! TCP ingestion listener.
//!
//! Each accepted connection runs on its own task: bytes are decoded into
//! events and submitted to the store task in arrival order. Connection
//! lifecycle is broadcast as [`Notification`]s for display clients.

use std::net::SocketAddr;

use metrics::counter;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::bridge::Notification;
use crate::config::IngestConfig;
use crate::error::{ErrorCode, ReqlensError, Result};
use crate::events::{StoreHandle, TelemetryEvent};
use crate::telemetry::IngestConnectionsGauge;

use super::decoder::EventDecoder;

/// Accepts producer connections and feeds the store.
pub struct IngestListener {
    listener: TcpListener,
    store: StoreHandle,
    notifications: broadcast::Sender<Notification>,
    read_buffer_bytes: usize,
    max_payload_bytes: usize,
}

impl IngestListener {
    /// Bind the configured address.
    pub async fn bind(
        config: &IngestConfig,
        store: StoreHandle,
        notifications: broadcast::Sender<Notification>,
    ) -> Result<Self> {
        let addr = config.addr();
        let listener = TcpListener::bind(&addr).await.map_err(|e| {
            ReqlensError::with_internal(ErrorCode::IngestIo, "Failed to bind ingestion listener", format!("{}: {}", addr, e))
                .with_source(e)
        })?;

        Ok(Self {
            listener,
            store,
            notifications,
            read_buffer_bytes: config.read_buffer_bytes.max(1),
            max_payload_bytes: config.max_payload_bytes,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections until `shutdown` fires. Open connections are
    /// cancelled with it.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        let local = self.local_addr()?;
        info!(addr = %local, "Ingestion listener started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            let connection = Connection {
                                peer,
                                store: self.store.clone(),
                                notifications: self.notifications.clone(),
                                decoder: EventDecoder::new(self.max_payload_bytes),
                                read_buffer_bytes: self.read_buffer_bytes,
                            };
                            tokio::spawn(connection.run(stream, shutdown.child_token()));
                        }
                        Err(e) => {
                            // Per-accept failures (e.g. fd exhaustion) are not fatal.
                            warn!(error = %e, "Failed to accept ingestion connection");
                        }
                    }
                }
            }
        }

        info!(addr = %local, "Ingestion listener stopped");
        Ok(())
    }
}

struct Connection {
    peer: SocketAddr,
    store: StoreHandle,
    notifications: broadcast::Sender<Notification>,
    decoder: EventDecoder,
    read_buffer_bytes: usize,
}

impl Connection {
    async fn run(mut self, mut stream: TcpStream, shutdown: CancellationToken) {
        let peer = self.peer.to_string();
        info!(peer = %peer, "Producer connected");
        IngestConnectionsGauge::increment();
        self.notify(Notification::ClientConnected { peer: peer.clone() });

        let mut buf = vec![0u8; self.read_buffer_bytes];
        loop {
            let read = tokio::select! {
                _ = shutdown.cancelled() => break,
                read = stream.read(&mut buf) => read,
            };

            match read {
                Ok(0) => {
                    self.decoder.finish();
                    break;
                }
                Ok(n) => {
                    trace!(peer = %peer, bytes = n, payload = %String::from_utf8_lossy(&buf[..n]), "Received");
                    if let Err(e) = self.forward(&buf[..n]).await {
                        error!(peer = %peer, error = %e, "Store unavailable; closing connection");
                        break;
                    }
                }
                Err(e) => {
                    warn!(peer = %peer, error = %e, "Producer connection error");
                    self.notify(Notification::ClientError {
                        peer: peer.clone(),
                        message: e.to_string(),
                    });
                    break;
                }
            }
        }

        IngestConnectionsGauge::decrement();
        self.notify(Notification::ClientDisconnected { peer: peer.clone() });
        info!(peer = %peer, failures = self.decoder.failures(), "Producer disconnected");
    }

    async fn forward(&mut self, bytes: &[u8]) -> Result<()> {
        for value in self.decoder.push(bytes) {
            match TelemetryEvent::from_value(value) {
                Ok(event) => self.store.submit(event).await?,
                Err(e) => {
                    let err = ReqlensError::from(e);
                    counter!("reqlens_events_rejected_total", "reason" => err.code().to_string())
                        .increment(1);
                    warn!(peer = %self.peer, error_code = %err.code(), error = %err.user_message(), "Discarding event");
                }
            }
        }
        Ok(())
    }

    fn notify(&self, notification: Notification) {
        if self.notifications.send(notification).is_err() {
            debug!("No display clients listening");
        }
    }
}
