//! Relay configuration.
//!
//! # Example
//!
//! ```
//! use std::time::Duration;
//!
//! use preview_relay::RelayConfig;
//!
//! # fn example() -> preview_relay::Result<()> {
//! let config = RelayConfig::builder()
//!     .port(9000)
//!     .templates_dir("./templates")
//!     .export_timeout(Some(Duration::from_secs(10)))
//!     .build()?;
//!
//! assert_eq!(config.port, 9000);
//! # Ok(())
//! # }
//! ```

// ============================================================================
// Imports
// ============================================================================

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{Error, Result};

// ============================================================================
// Constants
// ============================================================================

/// Port used when none is given.
pub const DEFAULT_PORT: u16 = 8088;

/// Directory holding the preview pages.
pub const DEFAULT_TEMPLATES_DIR: &str = "templates";

/// Time a page gets to answer `requestSvg`.
pub const DEFAULT_EXPORT_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// RelayConfig
// ============================================================================

/// Validated relay settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelayConfig {
    /// Address to bind.
    pub ip: IpAddr,
    /// Port to bind. `0` lets the OS choose.
    pub port: u16,
    /// Directory the page routes serve from.
    pub templates_dir: PathBuf,
    /// Export expiry. `None` waits forever.
    pub export_timeout: Option<Duration>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            ip: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: DEFAULT_PORT,
            templates_dir: PathBuf::from(DEFAULT_TEMPLATES_DIR),
            export_timeout: Some(DEFAULT_EXPORT_TIMEOUT),
        }
    }
}

impl RelayConfig {
    /// Creates a builder starting from the defaults.
    #[inline]
    #[must_use]
    pub fn builder() -> RelayConfigBuilder {
        RelayConfigBuilder::new()
    }

    /// Returns the socket address to bind.
    #[inline]
    #[must_use]
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::new(self.ip, self.port)
    }
}

// ============================================================================
// RelayConfigBuilder
// ============================================================================

/// Builder for [`RelayConfig`].
#[derive(Debug, Default, Clone)]
pub struct RelayConfigBuilder {
    ip: Option<IpAddr>,
    port: Option<u16>,
    templates_dir: Option<PathBuf>,
    export_timeout: Option<Option<Duration>>,
}

impl RelayConfigBuilder {
    /// Creates a builder with nothing set.
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the bind address.
    #[inline]
    #[must_use]
    pub fn ip(mut self, ip: IpAddr) -> Self {
        self.ip = Some(ip);
        self
    }

    /// Sets the port.
    #[inline]
    #[must_use]
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Sets the templates directory.
    #[inline]
    #[must_use]
    pub fn templates_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.templates_dir = Some(path.into());
        self
    }

    /// Sets the export expiry. `None` disables it.
    #[inline]
    #[must_use]
    pub fn export_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.export_timeout = Some(timeout);
        self
    }

    /// Builds the configuration with validation.
    ///
    /// # Errors
    ///
    /// - [`Error::Config`] if the export timeout is zero
    /// - [`Error::Config`] if the templates path is empty
    pub fn build(self) -> Result<RelayConfig> {
        let defaults = RelayConfig::default();

        let export_timeout = self.validate_export_timeout()?;
        let templates_dir = self.validate_templates_dir()?;

        Ok(RelayConfig {
            ip: self.ip.unwrap_or(defaults.ip),
            port: self.port.unwrap_or(defaults.port),
            templates_dir: templates_dir.unwrap_or(defaults.templates_dir),
            export_timeout: export_timeout.unwrap_or(defaults.export_timeout),
        })
    }
}

// ============================================================================
// Validation
// ============================================================================

impl RelayConfigBuilder {
    fn validate_export_timeout(&self) -> Result<Option<Option<Duration>>> {
        if let Some(Some(timeout)) = self.export_timeout
            && timeout.is_zero()
        {
            return Err(Error::config(
                "Export timeout must be greater than zero.\n\
                 Use export_timeout(None) to wait indefinitely.",
            ));
        }

        Ok(self.export_timeout)
    }

    fn validate_templates_dir(&self) -> Result<Option<PathBuf>> {
        if let Some(path) = &self.templates_dir
            && path.as_os_str().is_empty()
        {
            return Err(Error::config("Templates directory path is empty"));
        }

        Ok(self.templates_dir.clone())
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = RelayConfig::builder().build().expect("defaults are valid");

        assert_eq!(config.port, 8088);
        assert_eq!(config.ip, IpAddr::V4(Ipv4Addr::LOCALHOST));
        assert_eq!(config.templates_dir, PathBuf::from("templates"));
        assert_eq!(config.export_timeout, Some(Duration::from_secs(30)));
        assert_eq!(config, RelayConfig::default());
    }

    #[test]
    fn test_overrides() {
        let config = RelayConfig::builder()
            .ip(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
            .port(0)
            .templates_dir("/srv/pages")
            .export_timeout(None)
            .build()
            .expect("valid");

        assert_eq!(config.socket_addr().to_string(), "0.0.0.0:0");
        assert_eq!(config.templates_dir, PathBuf::from("/srv/pages"));
        assert_eq!(config.export_timeout, None);
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err = RelayConfig::builder()
            .export_timeout(Some(Duration::ZERO))
            .build()
            .unwrap_err();

        assert!(matches!(err, Error::Config { .. }));
        assert!(err.to_string().contains("greater than zero"));
    }

    #[test]
    fn test_empty_templates_dir_rejected() {
        let err = RelayConfig::builder().templates_dir("").build().unwrap_err();
        assert!(matches!(err, Error::Config { .. }));
    }

    #[test]
    fn test_missing_templates_dir_is_allowed() {
        let config = RelayConfig::builder()
            .templates_dir("/nonexistent/templates")
            .build();
        assert!(config.is_ok());
    }
}
