//! # Sender Session
//!
//! Owns the single outbound connection from a producer to the broker and keeps
//! it alive for as long as the session runs.
//!
//! ## State Machine
//!
//! ```text
//! Disconnected -> Connecting -> Authenticated -> Delivering
//!      ^              |                              |
//!      |   (backoff)  |                              |
//!      +--------------+------- I/O failure ----------+
//!
//! any state -- stop() --> Terminated
//! ```
//!
//! Failed connection attempts sleep for the current backoff (200ms doubling up
//! to 3s); a successful handshake resets it. There is never more than one
//! socket open per session, and values queued while the link is down stay in
//! the [`OutboundQueue`] (bounded, drop-oldest) until the next connection.
//!
//! ## Usage
//!
//! ```rust,ignore
//! let config: SenderConfig = load_config("config/sender.toml")?;
//! let handle = SenderSession::spawn(config);
//!
//! handle.submit(128);   // never blocks
//! handle.stop();
//! handle.join().await;
//! ```

use bytes::Bytes;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::task::JoinHandle;

use crate::client::backoff::{Backoff, BackoffConfig};
use crate::client::queue::{OutboundQueue, DEFAULT_CAPACITY};
use crate::common::connection::{ChunkWriter, Connection};
use crate::common::error::{RelayError, Result};
use crate::common::frame::{Credential, Frame, Recipient, SERVER_ACK};
use crate::common::value::{Producer, Value};

/// Frames received from the broker that are buffered per observer.
const INBOUND_BUFFER: usize = 64;

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Sender configuration loaded from TOML.
///
/// # Example TOML
///
/// ```toml
/// [sender]
/// address = "127.0.0.1:5000"
/// client_id = "3"
/// password = "PASSWD"
/// recipient_id = "2"
/// queue_capacity = 200
///
/// [backoff]
/// initial_ms = 200
/// max_ms = 3000
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderConfig {
    pub sender: SenderInfo,
    #[serde(default)]
    pub backoff: BackoffConfig,
}

/// Endpoint and identity of this producer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SenderInfo {
    /// Broker address, e.g. "127.0.0.1:5000"
    pub address: String,
    pub client_id: String,
    pub password: String,
    /// Recipient every value frame is addressed to
    pub recipient_id: String,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
}

fn default_queue_capacity() -> usize {
    DEFAULT_CAPACITY
}

// ============================================================================
// STATE
// ============================================================================

/// Where the session currently is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Disconnected,
    Connecting,
    Authenticated,
    Delivering,
    Terminated,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SenderState::Disconnected => "disconnected",
            SenderState::Connecting => "connecting",
            SenderState::Authenticated => "authenticated",
            SenderState::Delivering => "delivering",
            SenderState::Terminated => "terminated",
        };
        f.write_str(name)
    }
}

/// An authenticated connection: our write half plus the task draining the
/// broker's traffic. `lost` fires when that task sees EOF or an error;
/// `acked` is set once the broker's `[SERVER]Connected` arrives.
struct Link {
    writer: ChunkWriter,
    reader: JoinHandle<()>,
    lost: oneshot::Receiver<()>,
    acked: Arc<AtomicBool>,
}

impl Link {
    fn acked(&self) -> bool {
        self.acked.load(Ordering::Acquire)
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

// ============================================================================
// SESSION
// ============================================================================

/// Resilient outbound connection that drains an [`OutboundQueue`].
pub struct SenderSession {
    config: SenderInfo,
    queue: Arc<OutboundQueue>,
    backoff: Backoff,
    stop: watch::Receiver<bool>,
    state: watch::Sender<SenderState>,
    inbound: broadcast::Sender<Bytes>,
}

impl SenderSession {
    /// Start the session on the current tokio runtime.
    pub fn spawn(config: SenderConfig) -> SenderHandle {
        let queue = Arc::new(OutboundQueue::new(config.sender.queue_capacity));
        let (stop_tx, stop_rx) = watch::channel(false);
        let (state_tx, state_rx) = watch::channel(SenderState::Disconnected);
        let (inbound, _) = broadcast::channel(INBOUND_BUFFER);

        let session = SenderSession {
            backoff: Backoff::from(&config.backoff),
            config: config.sender,
            queue: queue.clone(),
            stop: stop_rx,
            state: state_tx,
            inbound: inbound.clone(),
        };
        let task = tokio::spawn(session.run());

        SenderHandle {
            queue,
            stop: stop_tx,
            state: state_rx,
            inbound,
            task,
        }
    }

    fn set_state(&self, state: SenderState) {
        self.state.send_replace(state);
    }

    fn is_stopped(&self) -> bool {
        *self.stop.borrow()
    }

    /// Supervising loop; returns once stopped.
    async fn run(mut self) {
        info!(
            "🔵 Sender '{}' starting, target {} (recipient '{}')",
            self.config.client_id, self.config.address, self.config.recipient_id
        );

        let recipient = Recipient::from_id(&self.config.recipient_id);
        let mut link: Option<Link> = None;

        while !self.is_stopped() {
            if link.is_none() {
                self.set_state(SenderState::Connecting);
                let mut stop = self.stop.clone();

                let attempt = tokio::select! {
                    biased;
                    _ = stop.wait_for(|&stopped| stopped) => break,
                    attempt = connect_and_authenticate(&self.config, &self.inbound) => attempt,
                };

                match attempt {
                    Ok(new_link) => {
                        info!("🤝 Sender '{}' connected & authenticated", self.config.client_id);
                        self.set_state(SenderState::Authenticated);
                        link = Some(new_link);
                    }
                    Err(e) => {
                        self.set_state(SenderState::Disconnected);
                        let delay = self.backoff.next_delay();
                        debug!(
                            "⏳ Connect to {} failed ({}), retrying in {}ms",
                            self.config.address,
                            e,
                            delay.as_millis()
                        );
                        if self.sleep_unless_stopped(delay).await {
                            break;
                        }
                    }
                }
                continue;
            }

            let Some(active) = link.as_mut() else {
                continue;
            };

            self.set_state(SenderState::Delivering);
            let mut stop = self.stop.clone();

            let next = tokio::select! {
                biased;
                _ = stop.wait_for(|&stopped| stopped) => break,
                _ = &mut active.lost => None,
                value = self.queue.pop() => Some(value),
            };

            let value = match next {
                Some(Some(value)) => value,
                // Queue closed and drained.
                Some(None) => break,
                None => {
                    warn!("⚠️  Broker closed the connection, reconnecting...");
                    if let Some(dead) = link.take() {
                        if self.drop_link(dead).await {
                            break;
                        }
                    }
                    continue;
                }
            };

            let wire = Frame::value(recipient.clone(), value).encode();
            if let Err(e) = active.writer.write_frame(wire.as_bytes()).await {
                warn!("⚠️  Send failed ({}), reconnecting...", e);
                if let Some(dead) = link.take() {
                    if self.drop_link(dead).await {
                        break;
                    }
                }
            }
        }

        if let Some(mut active) = link.take() {
            let _ = active.writer.shutdown().await;
        }
        self.set_state(SenderState::Terminated);
        info!("🛑 Sender '{}' exited", self.config.client_id);
    }

    /// Tear down a dead link and wait out the backoff before reconnecting.
    ///
    /// The backoff only resets if the broker acknowledged the link, so a
    /// broker that accepts and immediately closes is retried at a growing
    /// interval. Returns `true` if stopped while waiting.
    async fn drop_link(&mut self, link: Link) -> bool {
        if link.acked() {
            self.backoff.reset();
        }
        drop(link);
        self.set_state(SenderState::Disconnected);

        let delay = self.backoff.next_delay();
        debug!("⏳ Reconnecting to {} in {}ms", self.config.address, delay.as_millis());
        self.sleep_unless_stopped(delay).await
    }

    /// Returns `true` if the stop signal arrived before the delay elapsed.
    async fn sleep_unless_stopped(&self, delay: Duration) -> bool {
        let mut stop = self.stop.clone();
        tokio::select! {
            _ = stop.wait_for(|&stopped| stopped) => true,
            _ = tokio::time::sleep(delay) => false,
        }
    }
}

/// Open the TCP connection and write the credential frame in a single write.
async fn connect_and_authenticate(
    config: &SenderInfo,
    inbound: &broadcast::Sender<Bytes>,
) -> Result<Link> {
    let mut conn = Connection::connect(config.address.as_str()).await?;

    let credential = Credential::new(&config.client_id, &config.password).encode();
    let written = conn.write_once(credential.as_bytes()).await?;
    if written != credential.len() {
        return Err(RelayError::Handshake {
            written,
            expected: credential.len(),
        });
    }

    let (mut reader, writer) = conn.into_split();
    let (lost_tx, lost) = oneshot::channel();
    let inbound = inbound.clone();
    let acked = Arc::new(AtomicBool::new(false));
    let reader_acked = acked.clone();

    let reader = tokio::spawn(async move {
        loop {
            match reader.read_chunk().await {
                Ok(Some(chunk)) => {
                    debug!("📥 {}", String::from_utf8_lossy(&chunk).trim_end());
                    if !reader_acked.load(Ordering::Acquire)
                        && chunk
                            .windows(SERVER_ACK.len())
                            .any(|w| w == SERVER_ACK.as_bytes())
                    {
                        reader_acked.store(true, Ordering::Release);
                    }
                    // No observers is fine.
                    let _ = inbound.send(chunk);
                }
                Ok(None) => break,
                Err(e) => {
                    debug!("❌ Read from broker failed: {}", e);
                    break;
                }
            }
        }
        let _ = lost_tx.send(());
    });

    Ok(Link {
        writer,
        reader,
        lost,
        acked,
    })
}

// ============================================================================
// HANDLE
// ============================================================================

/// Control handle for a running [`SenderSession`].
///
/// Acts as the [`Producer`] the perception side submits values to.
pub struct SenderHandle {
    queue: Arc<OutboundQueue>,
    stop: watch::Sender<bool>,
    state: watch::Receiver<SenderState>,
    inbound: broadcast::Sender<Bytes>,
    task: JoinHandle<()>,
}

impl SenderHandle {
    pub fn queue(&self) -> &Arc<OutboundQueue> {
        &self.queue
    }

    pub fn state(&self) -> SenderState {
        *self.state.borrow()
    }

    /// Wait until the session reaches `target`.
    pub async fn wait_for_state(&self, target: SenderState) {
        let mut state = self.state.clone();
        let _ = state.wait_for(|s| *s == target).await;
    }

    /// Chunks received from the broker (acknowledgement, relayed frames,
    /// LED notifications) from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Bytes> {
        self.inbound.subscribe()
    }

    /// Signal the session to exit. A write already in flight completes; no
    /// further queued values are sent.
    pub fn stop(&self) {
        self.stop.send_replace(true);
        self.queue.close();
    }

    /// Wait for the session task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            warn!("⚠️  Sender task ended abnormally: {}", e);
        }
    }
}

impl Producer for SenderHandle {
    fn submit(&self, value: i64) {
        self.queue.push(Value::clamped(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio::time::timeout;

    fn config_for(address: String) -> SenderConfig {
        SenderConfig {
            sender: SenderInfo {
                address,
                client_id: "3".to_string(),
                password: "PASSWD".to_string(),
                recipient_id: "2".to_string(),
                queue_capacity: 16,
            },
            backoff: BackoffConfig {
                initial_ms: 10,
                max_ms: 40,
            },
        }
    }

    #[test]
    fn test_config_defaults() {
        let config: SenderConfig = toml::from_str(
            r#"
            [sender]
            address = "127.0.0.1:5000"
            client_id = "3"
            password = "PASSWD"
            recipient_id = "2"
            "#,
        )
        .unwrap();

        assert_eq!(config.sender.queue_capacity, 200);
        assert_eq!(config.backoff.initial_ms, 200);
        assert_eq!(config.backoff.max_ms, 3000);
    }

    #[tokio::test]
    async fn test_handshake_then_value_frames() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let handle = SenderSession::spawn(config_for(address));
        handle.submit(7);
        handle.submit(300);

        let (mut socket, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();

        let expected = b"[3:PASSWD]2:7\n2:255\n";
        let mut received = Vec::new();
        let mut buf = [0u8; 64];
        while received.len() < expected.len() {
            let n = timeout(Duration::from_secs(2), socket.read(&mut buf))
                .await
                .unwrap()
                .unwrap();
            assert!(n > 0, "sender closed early");
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, expected);

        handle.stop();
        timeout(Duration::from_secs(2), handle.join()).await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_interrupts_backoff() {
        // Bind then drop to get a port nobody listens on.
        let address = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().to_string()
        };

        let mut config = config_for(address);
        config.backoff = BackoffConfig {
            initial_ms: 60_000,
            max_ms: 60_000,
        };
        let handle = SenderSession::spawn(config);
        handle.wait_for_state(SenderState::Disconnected).await;

        handle.stop();
        timeout(Duration::from_secs(2), handle.join())
            .await
            .expect("stop should cut the backoff sleep short");
    }

    #[tokio::test]
    async fn test_unacknowledged_links_are_retried_with_backoff() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let accepts = Arc::new(std::sync::atomic::AtomicUsize::new(0));
        let acceptor = {
            let accepts = accepts.clone();
            tokio::spawn(async move {
                while let Ok((socket, _)) = listener.accept().await {
                    accepts.fetch_add(1, Ordering::SeqCst);
                    drop(socket);
                }
            })
        };

        let mut config = config_for(address);
        config.backoff = BackoffConfig::default();
        let handle = SenderSession::spawn(config);

        tokio::time::sleep(Duration::from_secs(1)).await;
        handle.stop();
        timeout(Duration::from_secs(2), handle.join()).await.unwrap();
        acceptor.abort();

        // 0ms, 200ms, 600ms; the next attempt is due at 1400ms.
        let count = accepts.load(Ordering::SeqCst);
        assert!((1..=4).contains(&count), "reconnected {count} times in 1s");
    }

    #[tokio::test]
    async fn test_reconnects_after_broker_drops_link() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();

        let handle = SenderSession::spawn(config_for(address));

        let (first, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .unwrap()
            .unwrap();
        drop(first);

        let (mut second, _) = timeout(Duration::from_secs(2), listener.accept())
            .await
            .expect("sender should reconnect")
            .unwrap();

        let mut buf = [0u8; 10];
        timeout(Duration::from_secs(2), second.read_exact(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(&buf, b"[3:PASSWD]");

        handle.stop();
        timeout(Duration::from_secs(2), handle.join()).await.unwrap();
    }
}
