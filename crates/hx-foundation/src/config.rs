//! Configuration traits and utilities.
//!
//! This module provides a common configuration trait together with the
//! environment-derived settings used by the HTTP layer.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Configuration trait that all configuration types should implement.
///
/// This trait provides a common interface for configuration objects,
/// ensuring they can be serialized/deserialized and validated.
pub trait Config: for<'de> Deserialize<'de> + Serialize + fmt::Debug {
    /// Validate the configuration.
    ///
    /// Returns `Ok(())` if the configuration is valid, or an error
    /// describing what is invalid.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}

/// Outbound proxy and certificate settings, loaded from the environment.
///
/// Recognised variables:
/// - `HX_PROXY_HTTP` — proxy URL for plain HTTP requests
/// - `HX_PROXY_HTTPS` — proxy URL for HTTPS requests
/// - `HX_CA_BUNDLE` — path to a PEM bundle to trust for TLS
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProxySettings {
    pub http_proxy: Option<String>,
    pub https_proxy: Option<String>,
    pub ca_bundle: Option<String>,
}

impl ProxySettings {
    /// Read the settings from the process environment.
    pub fn from_env() -> Self {
        Self {
            http_proxy: std::env::var("HX_PROXY_HTTP").ok().filter(|v| !v.is_empty()),
            https_proxy: std::env::var("HX_PROXY_HTTPS")
                .ok()
                .filter(|v| !v.is_empty()),
            ca_bundle: std::env::var("HX_CA_BUNDLE").ok().filter(|v| !v.is_empty()),
        }
    }

    /// True when no proxy or certificate overrides are configured.
    pub fn is_empty(&self) -> bool {
        self.http_proxy.is_none() && self.https_proxy.is_none() && self.ca_bundle.is_none()
    }
}

impl Config for ProxySettings {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings_are_empty() {
        let settings = ProxySettings::default();
        assert!(settings.is_empty());
        assert!(settings.validate().is_ok());
    }
}
