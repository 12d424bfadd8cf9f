use crate::domain::ConnectivityConfig;
use crate::ports::ConfigProvider;

// ============================================================================
// StaticConfigProvider - Hardcoded config for testing/development
// ============================================================================

/// Static configuration provider.
///
/// Useful for tests and embedding. For deployments, use `TomlConfigProvider`.
#[derive(Debug, Clone, Default)]
pub struct StaticConfigProvider {
    config: ConnectivityConfig,
}

impl StaticConfigProvider {
    /// Create with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Use the given configuration.
    #[must_use]
    pub fn with_config(mut self, config: ConnectivityConfig) -> Self {
        self.config = config;
        self
    }
}

impl ConfigProvider for StaticConfigProvider {
    fn connectivity_config(&self) -> ConnectivityConfig {
        self.config.clone()
    }
}

// ============================================================================
// TomlConfigProvider - File-based config (requires "network" feature)
// ============================================================================

#[cfg(feature = "network")]
mod toml_config {
    use super::*;
    use crate::domain::DeliveryModel;
    use serde::Deserialize;
    use std::fs;
    use std::path::Path;
    use thiserror::Error;

    #[derive(Debug, Deserialize, Default)]
    struct ConfigFile {
        #[serde(default)]
        dispatch: DispatchSection,
        #[serde(default)]
        network: NetworkSection,
    }

    #[derive(Debug, Deserialize, Default)]
    struct DispatchSection {
        delivery_model: Option<String>,
        event_queue_capacity: Option<usize>,
        token_length: Option<usize>,
    }

    #[derive(Debug, Deserialize, Default)]
    struct NetworkSection {
        local_address: Option<String>,
        unicast_port: Option<u16>,
        force_start: Option<bool>,
        ip_multicast_group: Option<String>,
        multicast_port: Option<u16>,
        link_layer_broadcast: Option<String>,
    }

    /// TOML-based configuration provider.
    ///
    /// Missing keys fall back to [`ConnectivityConfig::default`].
    ///
    /// # Config File Format
    ///
    /// ```toml
    /// [dispatch]
    /// delivery_model = "threaded"   # or "cooperative"
    /// event_queue_capacity = 1024
    /// token_length = 8
    ///
    /// [network]
    /// local_address = "0.0.0.0"
    /// unicast_port = 5683
    /// force_start = false
    /// ip_multicast_group = "224.0.1.187"
    /// multicast_port = 5683
    /// link_layer_broadcast = "FF:FF:FF:FF:FF:FF"
    /// ```
    #[derive(Debug, Clone)]
    pub struct TomlConfigProvider {
        config: ConnectivityConfig,
    }

    impl TomlConfigProvider {
        /// Load configuration from a TOML file.
        ///
        /// # Errors
        ///
        /// Returns error if the file cannot be read, parsed or validated.
        pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
            let content = fs::read_to_string(path.as_ref()).map_err(|e| ConfigError::Io {
                path: path.as_ref().display().to_string(),
                error: e.to_string(),
            })?;
            Self::parse(&content)
        }

        /// Parse configuration from a TOML string.
        ///
        /// # Errors
        ///
        /// Returns error on malformed TOML, an unknown delivery model or
        /// values that fail validation.
        pub fn parse(content: &str) -> Result<Self, ConfigError> {
            let file: ConfigFile =
                toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;

            let defaults = ConnectivityConfig::default();
            let d = file.dispatch;
            let n = file.network;

            let delivery_model = match d.delivery_model.as_deref() {
                None => defaults.delivery_model,
                Some(m) if m.eq_ignore_ascii_case("threaded") => DeliveryModel::Threaded,
                Some(m) if m.eq_ignore_ascii_case("cooperative") => DeliveryModel::Cooperative,
                Some(other) => return Err(ConfigError::Invalid(format!(
                    "unknown delivery_model {other:?}"
                ))),
            };

            let config = ConnectivityConfig {
                delivery_model,
                event_queue_capacity: d.event_queue_capacity.unwrap_or(defaults.event_queue_capacity),
                token_length: d.token_length.unwrap_or(defaults.token_length),
                local_address: n.local_address.unwrap_or(defaults.local_address),
                unicast_port: n.unicast_port.unwrap_or(defaults.unicast_port),
                force_start: n.force_start.unwrap_or(defaults.force_start),
                ip_multicast_group: n.ip_multicast_group.unwrap_or(defaults.ip_multicast_group),
                multicast_port: n.multicast_port.unwrap_or(defaults.multicast_port),
                link_layer_broadcast: n
                    .link_layer_broadcast
                    .unwrap_or(defaults.link_layer_broadcast),
            };
            config
                .validate()
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;

            Ok(Self { config })
        }
    }

    impl ConfigProvider for TomlConfigProvider {
        fn connectivity_config(&self) -> ConnectivityConfig {
            self.config.clone()
        }
    }

    /// Errors that can occur during config loading.
    #[derive(Debug, Clone, PartialEq, Eq, Error)]
    pub enum ConfigError {
        #[error("failed to read {path}: {error}")]
        Io { path: String, error: String },

        #[error("failed to parse config: {0}")]
        Parse(String),

        #[error("invalid config: {0}")]
        Invalid(String),
    }
}

#[cfg(feature = "network")]
pub use toml_config::{ConfigError, TomlConfigProvider};
