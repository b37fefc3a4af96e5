//! # Configuration Utilities
//!
//! Shared configuration loading used by both the broker and the sender binaries.

use serde::Deserialize;
use std::fs;
use std::path::Path;

use super::error::{RelayError, Result};

/// Load a TOML configuration file and deserialize it into the specified type.
///
/// # Arguments
/// - `path`: Path to the TOML configuration file
///
/// # Returns
/// - `Ok(T)`: Successfully loaded and parsed configuration
/// - `Err(RelayError::Config)`: File I/O or parsing error
///
/// # Example
/// ```ignore
/// let config: BrokerConfig = load_config("config/broker.toml")?;
/// ```
pub fn load_config<T>(path: impl AsRef<Path>) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let path = path.as_ref();
    let content = fs::read_to_string(path)
        .map_err(|e| RelayError::Config(format!("{}: {}", path.display(), e)))?;
    toml::from_str(&content).map_err(|e| RelayError::Config(format!("{}: {}", path.display(), e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::io::Write;

    #[derive(Debug, Deserialize)]
    struct Sample {
        name: String,
        port: u16,
    }

    #[test]
    fn test_load_config_parses_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = \"relay\"\nport = 5000").unwrap();

        let sample: Sample = load_config(file.path()).unwrap();
        assert_eq!(sample.name, "relay");
        assert_eq!(sample.port, 5000);
    }

    #[test]
    fn test_load_config_reports_missing_file() {
        let result: Result<Sample> = load_config("/nonexistent/relay.toml");
        assert!(matches!(result, Err(RelayError::Config(_))));
    }

    #[test]
    fn test_load_config_reports_bad_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "name = ").unwrap();

        let result: Result<Sample> = load_config(file.path());
        assert!(matches!(result, Err(RelayError::Config(_))));
    }
}
