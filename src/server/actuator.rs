//! # Actuation Port
//!
//! Boundary to the physical LED bank. Everything below "write one 8-bit
//! pattern" belongs to the kernel driver; this module only decides which port
//! to talk to and makes sure writes never overlap.
//!
//! - [`DevicePort`] writes single bytes to a character device (`/dev/ledkey`).
//! - [`SimulatedLeds`] is used when no device is available; it keeps a
//!   history of what would have been written.
//! - [`LedDriver`] is the shared, cloneable front end the broker sessions use.
//!   It serialises every write behind one lock.

use log::{info, warn};
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::common::error::{RelayError, Result};
use crate::common::value::Value;
use crate::server::pattern::{self, LedPattern};

/// Anything that can display an 8-bit LED pattern.
pub trait ActuationPort: Send {
    fn write(&mut self, pattern: LedPattern) -> Result<()>;

    /// Short description for logs.
    fn describe(&self) -> String;
}

// ============================================================================
// DEVICE
// ============================================================================

/// LED character device.
pub struct DevicePort {
    file: File,
    path: PathBuf,
}

impl DevicePort {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| RelayError::Actuation(format!("open {}: {}", path.display(), e)))?;
        Ok(Self { file, path })
    }
}

impl ActuationPort for DevicePort {
    fn write(&mut self, pattern: LedPattern) -> Result<()> {
        self.file
            .write_all(&[pattern.bits()])
            .map_err(|e| RelayError::Actuation(format!("write {}: {}", self.path.display(), e)))
    }

    fn describe(&self) -> String {
        format!("device {}", self.path.display())
    }
}

// ============================================================================
// SIMULATION
// ============================================================================

/// Stand-in port that records patterns instead of lighting anything.
#[derive(Clone, Default)]
pub struct SimulatedLeds {
    history: Arc<Mutex<Vec<LedPattern>>>,
}

impl SimulatedLeds {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every pattern written so far, oldest first.
    pub fn history(&self) -> Vec<LedPattern> {
        self.history
            .lock()
            .map(|h| h.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

impl ActuationPort for SimulatedLeds {
    fn write(&mut self, pattern: LedPattern) -> Result<()> {
        self.history
            .lock()
            .map_err(|_| RelayError::Actuation("simulation history poisoned".into()))?
            .push(pattern);
        Ok(())
    }

    fn describe(&self) -> String {
        "simulation".to_string()
    }
}

// ============================================================================
// DRIVER
// ============================================================================

/// Shared handle that serialises writes to a single [`ActuationPort`].
#[derive(Clone)]
pub struct LedDriver {
    port: Arc<Mutex<Box<dyn ActuationPort>>>,
}

impl LedDriver {
    pub fn new(port: impl ActuationPort + 'static) -> Self {
        Self {
            port: Arc::new(Mutex::new(Box::new(port))),
        }
    }

    /// Open the configured device, falling back to simulation when there is no
    /// device configured or it cannot be opened.
    pub fn open(device: Option<&Path>) -> Self {
        match device.map(DevicePort::open) {
            Some(Ok(port)) => {
                info!("💡 Device opened: {}", port.describe());
                Self::new(port)
            }
            Some(Err(e)) => {
                warn!("⚠️  {} - running without hardware (simulation mode)", e);
                Self::new(SimulatedLeds::new())
            }
            None => {
                info!("💡 No LED device configured, simulation mode");
                Self::new(SimulatedLeds::new())
            }
        }
    }

    pub fn describe(&self) -> String {
        match self.port.lock() {
            Ok(port) => port.describe(),
            Err(_) => "unavailable".to_string(),
        }
    }

    /// Write a raw pattern. Blocks the calling thread while the port is busy.
    pub fn write_pattern(&self, pattern: LedPattern) -> Result<()> {
        let mut port = self
            .port
            .lock()
            .map_err(|_| RelayError::Actuation("LED port lock poisoned".into()))?;
        port.write(pattern)
    }

    /// Encode `value` and write it, off the async runtime.
    ///
    /// Returns the pattern that was written.
    pub async fn actuate(&self, value: Value) -> Result<LedPattern> {
        let pattern = pattern::encode(value);
        info!(
            "💡 Value: {:3} (0x{:02X}) -> {} LEDs: {}",
            value.get(),
            value.get(),
            pattern.lit_count(),
            pattern
        );

        let driver = self.clone();
        tokio::task::spawn_blocking(move || driver.write_pattern(pattern))
            .await
            .map_err(|e| RelayError::Actuation(format!("LED write task panicked: {}", e)))??;

        Ok(pattern)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FailingPort;

    impl ActuationPort for FailingPort {
        fn write(&mut self, _pattern: LedPattern) -> Result<()> {
            Err(RelayError::Actuation("device unplugged".into()))
        }

        fn describe(&self) -> String {
            "failing".to_string()
        }
    }

    #[tokio::test]
    async fn test_actuate_writes_encoded_pattern() {
        let leds = SimulatedLeds::new();
        let driver = LedDriver::new(leds.clone());

        let written = driver.actuate(Value::new(128)).await.unwrap();
        assert_eq!(written, pattern::encode(Value::new(128)));
        assert_eq!(leds.history(), vec![LedPattern::from_bits(0b1111_1000)]);
    }

    #[tokio::test]
    async fn test_actuate_surfaces_port_failure() {
        let driver = LedDriver::new(FailingPort);
        let result = driver.actuate(Value::new(10)).await;
        assert!(matches!(result, Err(RelayError::Actuation(_))));
    }

    #[test]
    fn test_missing_device_falls_back_to_simulation() {
        let driver = LedDriver::open(Some(Path::new("/nonexistent/ledkey")));
        assert_eq!(driver.describe(), "simulation");
    }

    #[test]
    fn test_device_port_writes_single_byte() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let mut port = DevicePort::open(file.path()).unwrap();
        port.write(LedPattern::from_bits(0xC0)).unwrap();
        port.write(LedPattern::OFF).unwrap();

        assert_eq!(std::fs::read(file.path()).unwrap(), vec![0xC0, 0x00]);
    }
}
