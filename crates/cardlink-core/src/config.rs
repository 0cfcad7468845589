//! Reader and session configuration.
//!
//! Configuration is plain serde data with defaults matching common CCID
//! readers. It can be built in code or loaded from a TOML file:
//!
//! ```toml
//! backend = "usb"
//!
//! [session]
//! io_timeout_ms = 5000
//! settle_delay_ms = 150
//! ```

use crate::constants::*;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Which reader stack services `connect`/`transmit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Direct USB CCID over bulk endpoints.
    Usb,

    /// Platform smart-card service (PC/SC).
    Pcsc,
}

impl Backend {
    /// The backend normally used on the current target.
    pub fn platform_default() -> Self {
        if cfg!(any(target_os = "macos", target_os = "windows")) {
            Self::Pcsc
        } else {
            Self::Usb
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Usb => "usb",
            Self::Pcsc => "pcsc",
        }
    }
}

impl Default for Backend {
    fn default() -> Self {
        Self::platform_default()
    }
}

impl std::str::FromStr for Backend {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "usb" | "ccid" => Ok(Self::Usb),
            "pcsc" | "native" => Ok(Self::Pcsc),
            other => Err(Error::config(format!("unknown backend '{other}'"))),
        }
    }
}

/// Tuning for a CCID session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Timeout for each bulk write and read.
    pub io_timeout_ms: u64,

    /// Wait after power-on before APDUs are accepted.
    pub settle_delay_ms: u64,

    /// Bytes requested when reading the power-on acknowledgement.
    pub power_on_response_len: usize,

    /// Bytes requested when reading an XfrBlock response.
    pub max_response_len: usize,

    /// XfrBlock block waiting time integer.
    pub block_waiting_integer: u8,

    /// Reject responses whose sequence byte differs from the command's.
    pub verify_sequence: bool,

    /// Time-extension responses tolerated before giving up on a command.
    pub max_time_extensions: u32,

    /// Send IccPowerOff before releasing the transport.
    pub power_off_on_close: bool,
}

impl SessionConfig {
    pub fn io_timeout(&self) -> Duration {
        Duration::from_millis(self.io_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    /// Check values the session relies on.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if a read size cannot hold a CCID header or the
    /// I/O timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.io_timeout_ms == 0 {
            return Err(Error::config("io_timeout_ms must be greater than zero"));
        }
        if self.power_on_response_len < CCID_HEADER_LEN {
            return Err(Error::config(format!(
                "power_on_response_len must be at least {CCID_HEADER_LEN}, got {}",
                self.power_on_response_len
            )));
        }
        if self.max_response_len < CCID_HEADER_LEN {
            return Err(Error::config(format!(
                "max_response_len must be at least {CCID_HEADER_LEN}, got {}",
                self.max_response_len
            )));
        }
        Ok(())
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            io_timeout_ms: DEFAULT_IO_TIMEOUT_MS,
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            power_on_response_len: DEFAULT_POWER_ON_RESPONSE_LEN,
            max_response_len: DEFAULT_MAX_RESPONSE_LEN,
            block_waiting_integer: DEFAULT_BLOCK_WAITING_INTEGER,
            verify_sequence: true,
            max_time_extensions: DEFAULT_MAX_TIME_EXTENSIONS,
            power_off_on_close: true,
        }
    }
}

/// Top-level reader configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderConfig {
    /// Reader stack to use.
    pub backend: Backend,

    /// CCID session tuning (ignored by the PC/SC backend).
    pub session: SessionConfig,
}

impl ReaderConfig {
    /// Parse and validate a TOML document.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` on malformed TOML or invalid values.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ReaderConfig = toml::from_str(content)
            .map_err(|e| Error::config(format!("failed to parse configuration: {e}")))?;
        config.session.validate()?;
        Ok(config)
    }

    /// Load and validate a TOML configuration file.
    ///
    /// # Errors
    ///
    /// Returns `Error::Io` if the file cannot be read and `Error::Config` if
    /// its content is invalid.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&content)
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if serialization fails.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| Error::config(format!("failed to serialize configuration: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::Write;

    #[test]
    fn test_session_defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.io_timeout(), Duration::from_secs(5));
        assert_eq!(config.settle_delay(), Duration::from_millis(150));
        assert_eq!(config.power_on_response_len, 64);
        assert_eq!(config.max_response_len, 1024);
        assert_eq!(config.block_waiting_integer, 4);
        assert!(config.verify_sequence);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = ReaderConfig::from_toml_str(
            r#"
            backend = "usb"

            [session]
            settle_delay_ms = 300
            "#,
        )
        .unwrap();

        assert_eq!(config.backend, Backend::Usb);
        assert_eq!(config.session.settle_delay_ms, 300);
        assert_eq!(config.session.io_timeout_ms, DEFAULT_IO_TIMEOUT_MS);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let result = ReaderConfig::from_toml_str("backend = 42");
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[rstest]
    #[case("[session]\nio_timeout_ms = 0")]
    #[case("[session]\nmax_response_len = 9")]
    #[case("[session]\npower_on_response_len = 4")]
    fn test_invalid_values_rejected(#[case] content: &str) {
        let result = ReaderConfig::from_toml_str(content);
        assert!(matches!(result, Err(Error::Config(_))));
    }

    #[rstest]
    #[case("usb", Backend::Usb)]
    #[case("CCID", Backend::Usb)]
    #[case("pcsc", Backend::Pcsc)]
    #[case("native", Backend::Pcsc)]
    fn test_backend_parse(#[case] input: &str, #[case] expected: Backend) {
        assert_eq!(input.parse::<Backend>().unwrap(), expected);
    }

    #[test]
    fn test_backend_parse_unknown() {
        assert!("nfc".parse::<Backend>().is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = ReaderConfig::default();
        config.backend = Backend::Pcsc;
        config.session.max_time_extensions = 3;

        let rendered = config.to_toml_string().unwrap();
        let parsed = ReaderConfig::from_toml_str(&rendered).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "backend = \"pcsc\"\n[session]\nio_timeout_ms = 1000").unwrap();

        let config = ReaderConfig::load(file.path()).unwrap();
        assert_eq!(config.backend, Backend::Pcsc);
        assert_eq!(config.session.io_timeout(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_missing_file() {
        let result = ReaderConfig::load("/nonexistent/cardlink.toml");
        assert!(matches!(result, Err(Error::Io(_))));
    }
}
