//! # Broker
//!
//! Accept loop of the relay. Every accepted socket gets its own
//! [`BrokerSession`] task; the only state those tasks share is the
//! [`ClientRegistry`] and the [`LedDriver`], both internally locked.
//!
//! Stopping the accept loop leaves running sessions alone: they end when their
//! peers disconnect.

use log::{error, info, warn};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::common::connection::Connection;
use crate::common::error::Result;
use crate::server::actuator::LedDriver;
use crate::server::config::BrokerConfig;
use crate::server::pattern::LedPattern;
use crate::server::registry::ClientRegistry;
use crate::server::session::BrokerSession;

/// Multi-client relay and LED actuator.
pub struct Broker {
    config: BrokerConfig,
    registry: Arc<ClientRegistry>,
    leds: LedDriver,
}

impl Broker {
    /// Create a broker driving the device named in the config (or a simulation).
    pub fn new(config: BrokerConfig) -> Self {
        let leds = LedDriver::open(config.device.path.as_deref());
        Self::with_driver(config, leds)
    }

    pub fn with_driver(config: BrokerConfig, leds: LedDriver) -> Self {
        let registry = Arc::new(ClientRegistry::new(config.broker.max_clients));
        Self {
            config,
            registry,
            leds,
        }
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        self.registry.clone()
    }

    pub fn leds(&self) -> LedDriver {
        self.leds.clone()
    }

    /// Bind the configured address and serve until `shutdown` resolves.
    pub async fn run_until(&self, shutdown: impl Future<Output = ()>) -> Result<()> {
        let listener = TcpListener::bind(self.config.broker.address.as_str()).await?;
        self.serve(listener, shutdown).await;
        Ok(())
    }

    /// Serve on `listener` until `shutdown` resolves.
    pub async fn serve(&self, listener: TcpListener, shutdown: impl Future<Output = ()>) {
        let local = listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| self.config.broker.address.clone());

        self.switch_off().await;

        info!("===== LED Control Broker =====");
        info!("📡 Listening on {}", local);
        info!("💡 LED output: {}", self.leds.describe());
        info!("👥 Up to {} clients, messages are broadcast to all others", self.registry.capacity());

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("🛑 Broker stopped accepting connections");
                    return;
                }
                accepted = listener.accept() => match accepted {
                    Ok((socket, addr)) => {
                        info!("🔗 New connection from {}", addr);
                        if let Err(e) = socket.set_nodelay(true) {
                            warn!("⚠️  Could not set TCP_NODELAY for {}: {}", addr, e);
                        }
                        let conn = Connection::with_buffer(socket, self.config.broker.read_buffer_size);
                        let session = BrokerSession::new(
                            conn,
                            self.registry.clone(),
                            self.leds.clone(),
                            self.config.session_settings(),
                        );
                        tokio::spawn(session.run());
                    }
                    Err(e) => error!("❌ Accept error: {}", e),
                },
            }
        }
    }

    /// All LEDs off, as the device is put into a known state on startup.
    async fn switch_off(&self) {
        let leds = self.leds.clone();
        let result = tokio::task::spawn_blocking(move || leds.write_pattern(LedPattern::OFF)).await;
        match result {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("⚠️  Could not reset LEDs: {}", e),
            Err(e) => warn!("⚠️  LED reset task failed: {}", e),
        }
    }
}
