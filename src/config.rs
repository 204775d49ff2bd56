//! # Configuration Management
//!
//! Centralized configuration for the RPC protocol library.
//!
//! The wire protocol itself has no configuration file; everything here feeds the
//! outer layers: which host to connect to, which protocol dialect the remote
//! speaks, which authentication mechanism to negotiate, and how to log.
//!
//! ## Configuration Sources
//! - TOML files via `from_file()`
//! - Direct instantiation with defaults
//! - Environment-specific overrides via `from_env()`

use crate::error::{Result, RpcError};
use crate::protocol::dialect::ProtocolDialect;
use crate::utils::timeout;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;
use tracing::Level;

/// Magic bytes opening every packet ("!rpc")
pub const MAGIC_BYTES: [u8; 4] = *b"!rpc";

/// Header length: magic plus four hex digits of payload length
pub const HEADER_LEN: usize = 8;

/// Max payload size representable by the four hex digit length field
pub const MAX_PAYLOAD_SIZE: usize = 0xFFFF;

/// Bytes drained from the stream after a bad header, for the diagnostic
pub const MISMATCH_DRAIN_LIMIT: usize = 502;

/// Default TCP port of an RPC server
pub const DEFAULT_PORT: u16 = 10875;

/// Default authentication service name
pub const DEFAULT_SERVICE: &str = "host";

/// Default authentication mechanism
pub const DEFAULT_MECHANISM: &str = "GSSAPI";

/// Main configuration structure that contains all configurable settings
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct RpcConfig {
    /// Connection settings
    #[serde(default)]
    pub client: ClientConfig,

    /// Authentication negotiation settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl RpcConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut file = File::open(path)
            .map_err(|e| RpcError::ConfigError(format!("Failed to open config file: {e}")))?;

        let mut contents = String::new();
        file.read_to_string(&mut contents)
            .map_err(|e| RpcError::ConfigError(format!("Failed to read config file: {e}")))?;

        Self::from_toml(&contents)
    }

    /// Load configuration from TOML string
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str::<Self>(content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to parse TOML: {e}")))
    }

    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(host) = std::env::var("RPC_PROTOCOL_HOST") {
            config.client.host = host;
        }

        if let Ok(port) = std::env::var("RPC_PROTOCOL_PORT") {
            config.client.port = port
                .parse::<u16>()
                .map_err(|e| RpcError::ConfigError(format!("Invalid RPC_PROTOCOL_PORT: {e}")))?;
        }

        if let Ok(dialect) = std::env::var("RPC_PROTOCOL_DIALECT") {
            config.client.dialect = dialect.parse()?;
        }

        if let Ok(timeout) = std::env::var("RPC_PROTOCOL_CONNECT_TIMEOUT_MS") {
            if let Ok(val) = timeout.parse::<u64>() {
                config.client.connect_timeout = Duration::from_millis(val);
            }
        }

        if let Ok(mechanism) = std::env::var("RPC_PROTOCOL_MECHANISM") {
            config.auth.mechanism = mechanism;
        }

        if let Ok(service) = std::env::var("RPC_PROTOCOL_SERVICE") {
            config.auth.service = service;
        }

        if let Ok(helper) = std::env::var("RPC_PROTOCOL_AUTH_HELPER") {
            config.auth.helper_path = Some(helper);
        }

        Ok(config)
    }

    /// Apply overrides to the default configuration
    pub fn default_with_overrides<F>(mutator: F) -> Self
    where
        F: FnOnce(&mut Self),
    {
        let mut config = Self::default();
        mutator(&mut config);
        config
    }

    /// Generate example configuration file content
    pub fn example_config() -> String {
        toml::to_string_pretty(&Self::default())
            .unwrap_or_else(|_| String::from("# Failed to generate example config"))
    }

    /// Save configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| RpcError::ConfigError(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path, content)
            .map_err(|e| RpcError::ConfigError(format!("Failed to write config file: {e}")))?;

        Ok(())
    }

    /// Validate the configuration for common issues and misconfigurations
    ///
    /// Returns a list of validation errors. Empty list means configuration is valid.
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();
        errors.extend(self.client.validate());
        errors.extend(self.auth.validate());
        errors.extend(self.logging.validate());
        errors
    }

    /// Validate and return Result - convenience method
    pub fn validate_strict(&self) -> Result<()> {
        let errors = self.validate();
        if errors.is_empty() {
            Ok(())
        } else {
            Err(RpcError::ConfigError(format!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            )))
        }
    }
}

/// Connection settings for a client
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ClientConfig {
    /// Remote host name; also the target host for authentication
    pub host: String,

    /// Remote TCP port
    pub port: u16,

    /// Protocol dialect spoken by the remote
    #[serde(default)]
    pub dialect: ProtocolDialect,

    /// Deadline for establishing the TCP connection
    #[serde(with = "duration_serde")]
    pub connect_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: String::from("localhost"),
            port: DEFAULT_PORT,
            dialect: ProtocolDialect::default(),
            connect_timeout: timeout::DEFAULT_TIMEOUT,
        }
    }
}

impl ClientConfig {
    /// Validate client configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.host.is_empty() {
            errors.push("Client host cannot be empty".to_string());
        } else if self.host.chars().any(char::is_whitespace) {
            errors.push(format!("Invalid client host: '{}'", self.host));
        }

        if self.port == 0 {
            errors.push("Client port must be greater than 0".to_string());
        }

        if self.connect_timeout.as_millis() < 100 {
            errors.push("Connection timeout too short (minimum: 100ms)".to_string());
        } else if self.connect_timeout.as_secs() > 300 {
            errors.push("Connection timeout too long (maximum: 300s)".to_string());
        }

        errors
    }
}

/// Authentication negotiation settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Mechanism name passed to the provider and the remote
    pub mechanism: String,

    /// Service name the remote authenticates as
    pub service: String,

    /// Identity to act as, if different from the authenticated one
    #[serde(default)]
    pub authz: Option<String>,

    /// Path to an external authentication helper program
    #[serde(default)]
    pub helper_path: Option<String>,

    /// Explicit seal request sent with the first auth round
    #[serde(default)]
    pub request_seal: Option<bool>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            mechanism: String::from(DEFAULT_MECHANISM),
            service: String::from(DEFAULT_SERVICE),
            authz: None,
            helper_path: None,
            request_seal: None,
        }
    }
}

impl AuthConfig {
    /// Validate authentication configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.mechanism.is_empty() {
            errors.push("Authentication mechanism cannot be empty".to_string());
        } else if !self
            .mechanism
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '-' || c == '_')
        {
            errors.push(format!(
                "Invalid mechanism name: '{}' (expected uppercase letters, digits, '-' or '_')",
                self.mechanism
            ));
        }

        if self.service.is_empty() {
            errors.push("Authentication service cannot be empty".to_string());
        }

        if let Some(ref authz) = self.authz {
            if authz.is_empty() {
                errors.push("Authorization identity cannot be an empty string".to_string());
            }
        }

        if let Some(ref path) = self.helper_path {
            if path.is_empty() {
                errors.push("Helper path cannot be an empty string".to_string());
            }
        }

        errors
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Application name for logs
    pub app_name: String,

    /// Log level
    #[serde(with = "log_level_serde")]
    pub log_level: Level,

    /// Whether to use JSON formatting for logs
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            app_name: String::from("rpc-protocol"),
            log_level: Level::INFO,
            json_format: false,
        }
    }
}

impl LoggingConfig {
    /// Validate logging configuration
    pub fn validate(&self) -> Vec<String> {
        let mut errors = Vec::new();

        if self.app_name.is_empty() {
            errors.push("Application name cannot be empty".to_string());
        } else if self.app_name.len() > 64 {
            errors.push(format!(
                "Application name too long: {} characters (maximum: 64)",
                self.app_name.len()
            ));
        }

        errors
    }
}

/// Helper module for Duration serialization/deserialization
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let millis = duration.as_millis() as u64;
        millis.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

/// Helper module for tracing::Level serialization/deserialization
mod log_level_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::str::FromStr;
    use tracing::Level;

    pub fn serialize<S>(level: &Level, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let level_str = match *level {
            Level::TRACE => "trace",
            Level::DEBUG => "debug",
            Level::INFO => "info",
            Level::WARN => "warn",
            Level::ERROR => "error",
        };
        level_str.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Level, D::Error>
    where
        D: Deserializer<'de>,
    {
        let level_str = String::deserialize(deserializer)?;
        Level::from_str(&level_str)
            .map_err(|_| serde::de::Error::custom(format!("Invalid log level: {level_str}")))
    }
}
