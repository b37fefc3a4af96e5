//! # Broker Session
//!
//! Per-connection handler on the broker. One task per accepted socket:
//!
//! 1. Register with the [`ClientRegistry`] (before authentication, so even a
//!    half-open session receives broadcasts).
//! 2. Read the credential frame and extract the client id; a malformed one
//!    leaves the id as `Unknown` but never closes the connection.
//! 3. Acknowledge with `[SERVER]Connected\n`.
//! 4. Treat every further chunk as one message: relay it verbatim to every
//!    other session and, if it carries `LED@<value>`, drive the LEDs and tell
//!    everyone (originator included) with `[SERVER]LED_UPDATE@0x<hh>\n`.
//! 5. On EOF, read error or a failed write, unregister and close.
//!
//! The broker never reconnects a session; that is the client's job.

use bytes::Bytes;
use log::{debug, error, info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

use crate::common::connection::{ChunkReader, ChunkWriter, Connection};
use crate::common::error::{RelayError, Result};
use crate::common::frame::{self, SERVER_ACK};
use crate::server::actuator::LedDriver;
use crate::server::registry::{ClientHandle, ClientRegistry, SessionId};

/// How long a session's writer may keep flushing after the session ended.
const WRITER_LINGER: Duration = Duration::from_millis(500);

/// Tunables shared by every session of a broker.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// How long to wait for the rest of a partially received credential frame
    pub handshake_timeout: Duration,
    /// Largest handshake accumulated before giving up on finding its end
    pub handshake_limit: usize,
    /// Frames buffered per client before broadcasts to it are dropped
    pub outbound_buffer: usize,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            handshake_timeout: Duration::from_millis(2000),
            handshake_limit: 1024,
            outbound_buffer: 64,
        }
    }
}

/// Owns one accepted connection end-to-end.
pub struct BrokerSession {
    conn: Connection,
    registry: Arc<ClientRegistry>,
    leds: LedDriver,
    settings: SessionSettings,
}

impl BrokerSession {
    pub fn new(
        conn: Connection,
        registry: Arc<ClientRegistry>,
        leds: LedDriver,
        settings: SessionSettings,
    ) -> Self {
        Self {
            conn,
            registry,
            leds,
            settings,
        }
    }

    /// Serve the connection until it closes.
    pub async fn run(self) {
        let peer = self.conn.peer_addr();
        let (handle, outbound_rx) = ClientHandle::new(peer, self.settings.outbound_buffer);
        let id = handle.id;
        let outbound = handle.clone();

        if let Err(e) = self.registry.add(handle).await {
            warn!("🚫 Refusing {}: {}", display_peer(peer), e);
            return;
        }
        info!("🔗 Client connected ({})", display_peer(peer));

        let (reader, writer) = self.conn.into_split();
        let (write_failed_tx, write_failed) = oneshot::channel();
        let writer = tokio::spawn(write_loop(writer, outbound_rx, write_failed_tx));
        let writer_abort = writer.abort_handle();

        let mut active = ActiveSession {
            id,
            client_id: frame::UNKNOWN_CLIENT.to_string(),
            peer,
            reader,
            outbound,
            write_failed,
            registry: self.registry.clone(),
            leds: self.leds,
            settings: self.settings,
        };

        if let Err(e) = active.serve().await {
            debug!("❌ Session {} ended with error: {}", active.client_id, e);
        }

        self.registry.remove(&id).await;
        info!(
            "🔌 Client disconnected ({}, ID: {})",
            display_peer(peer),
            active.client_id
        );

        // Dropping the last sender lets the writer flush what is queued and stop.
        drop(active);
        if tokio::time::timeout(WRITER_LINGER, writer).await.is_err() {
            writer_abort.abort();
        }
    }
}

fn display_peer(peer: Option<SocketAddr>) -> String {
    peer.map(|p| p.to_string())
        .unwrap_or_else(|| "unknown peer".to_string())
}

/// Drain the session's outbound channel onto the socket.
async fn write_loop(
    mut writer: ChunkWriter,
    mut outbound: mpsc::Receiver<Bytes>,
    failed: oneshot::Sender<()>,
) {
    while let Some(payload) = outbound.recv().await {
        if let Err(e) = writer.write_frame(&payload).await {
            debug!("❌ Write to client failed: {}", e);
            let _ = failed.send(());
            return;
        }
    }
    let _ = writer.shutdown().await;
}

/// State of a registered, running session.
struct ActiveSession {
    id: SessionId,
    client_id: String,
    peer: Option<SocketAddr>,
    reader: ChunkReader,
    outbound: ClientHandle,
    write_failed: oneshot::Receiver<()>,
    registry: Arc<ClientRegistry>,
    leds: LedDriver,
    settings: SessionSettings,
}

impl ActiveSession {
    async fn serve(&mut self) -> Result<()> {
        let Some(first) = self.reader.read_chunk().await? else {
            return Ok(());
        };
        let remainder = self.authenticate(first).await?;

        if !self.outbound.deliver(Bytes::from_static(SERVER_ACK.as_bytes())).await {
            return Ok(());
        }

        if let Some(chunk) = remainder {
            self.handle_message(chunk).await;
        }

        loop {
            let chunk = tokio::select! {
                chunk = self.reader.read_chunk() => chunk?,
                _ = &mut self.write_failed => return Ok(()),
            };
            match chunk {
                Some(chunk) => self.handle_message(chunk).await,
                None => return Ok(()),
            }
        }
    }

    /// Read until the credential frame can be scanned, then record the id.
    ///
    /// Returns any bytes that followed the credential in the same reads.
    async fn authenticate(&mut self, first: Bytes) -> Result<Option<Bytes>> {
        let mut buf = first.to_vec();

        while !frame::credential_complete(&buf) && buf.len() < self.settings.handshake_limit {
            match tokio::time::timeout(self.settings.handshake_timeout, self.reader.read_chunk())
                .await
            {
                Ok(Ok(Some(more))) => buf.extend_from_slice(&more),
                Ok(Ok(None)) => return Err(closed_during_handshake()),
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    debug!("⏳ Credential frame incomplete after timeout, using what arrived");
                    break;
                }
            }
        }

        let scan = frame::scan_credential(&buf);
        if scan.client_id == frame::UNKNOWN_CLIENT {
            warn!(
                "⚠️  No client id in login from {}, continuing as '{}'",
                display_peer(self.peer),
                scan.client_id
            );
        } else {
            info!("🔑 Login from {}: '{}'", display_peer(self.peer), scan.client_id);
        }

        self.client_id = scan.client_id;
        self.registry.set_client_id(&self.id, &self.client_id).await;

        let rest = &buf[scan.consumed..];
        Ok((!rest.is_empty()).then(|| Bytes::copy_from_slice(rest)))
    }

    /// Relay one message and act on an LED command if it carries one.
    async fn handle_message(&mut self, chunk: Bytes) {
        let text = String::from_utf8_lossy(&chunk).into_owned();
        info!("📨 [FROM {}]: {}", self.client_id, text.trim_end());

        self.registry.broadcast(chunk, Some(self.id)).await;

        let value = match frame::parse_led_command(&text) {
            Ok(Some(value)) => value,
            Ok(None) => return,
            Err(e) => {
                debug!("⚠️  Ignoring LED command from {}: {}", self.client_id, e);
                return;
            }
        };

        match self.leds.actuate(value).await {
            Ok(_) => {
                let notify = frame::led_update_notification(value);
                self.registry.broadcast(Bytes::from(notify), None).await;
            }
            Err(e) => error!("❌ LED update for {} failed: {}", self.client_id, e),
        }
    }
}

fn closed_during_handshake() -> RelayError {
    RelayError::Network(std::io::Error::new(
        std::io::ErrorKind::UnexpectedEof,
        "connection closed during handshake",
    ))
}
