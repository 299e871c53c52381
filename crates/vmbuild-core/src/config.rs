//! Build server configuration

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vmbuild_resource::DEFAULT_CHUNK_SIZE;
use vmbuild_rpc::{DEFAULT_MAX_MESSAGE_SIZE, DEFAULT_QUEUE_CAPACITY};

/// Envelope bytes around an encoded chunk payload (ids, checksum, tags)
const FRAME_OVERHEAD: usize = 1024;

/// Build server configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Name used in logs
    pub server_name: String,
    /// Listen address for the TCP transport, port 0 picks a free port
    pub bind_host_port: String,
    /// Largest encoded message either side accepts
    pub max_message_size: usize,
    /// Chunk size bound for resource streams
    pub safe_buffer_size: usize,
    /// Depth of each event queue between service and orchestrator
    pub event_queue_capacity: usize,
}

impl ServiceConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With server name
    #[inline]
    #[must_use]
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }

    /// With listen address
    #[inline]
    #[must_use]
    pub fn with_bind_host_port(mut self, addr: impl Into<String>) -> Self {
        self.bind_host_port = addr.into();
        self
    }

    /// With maximum message size
    #[inline]
    #[must_use]
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// With chunk size bound
    #[inline]
    #[must_use]
    pub fn with_safe_buffer_size(mut self, size: usize) -> Self {
        self.safe_buffer_size = size;
        self
    }

    /// With event queue depth
    #[inline]
    #[must_use]
    pub fn with_event_queue_capacity(mut self, capacity: usize) -> Self {
        self.event_queue_capacity = capacity;
        self
    }

    /// Parse from TOML; missing keys keep their defaults
    ///
    /// # Errors
    /// Returns [`ConfigError::Parse`] on invalid TOML
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Load from a TOML file
    ///
    /// # Errors
    /// Returns [`ConfigError`] if the file cannot be read or parsed
    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// Largest message a full chunk produces on the wire; `None` if that
    /// does not fit in `usize`
    #[must_use]
    pub fn encoded_chunk_size(&self) -> Option<usize> {
        self.safe_buffer_size
            .div_ceil(3)
            .checked_mul(4)?
            .checked_add(FRAME_OVERHEAD)
    }

    /// Check the configuration is usable
    ///
    /// # Errors
    /// Returns [`ConfigError::Invalid`] naming the first bad value
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server_name.trim().is_empty() {
            return Err(ConfigError::Invalid("server_name is empty".to_string()));
        }
        if self.bind_host_port.trim().is_empty() {
            return Err(ConfigError::Invalid("bind_host_port is empty".to_string()));
        }
        if self.safe_buffer_size == 0 {
            return Err(ConfigError::Invalid("safe_buffer_size must be positive".to_string()));
        }
        if self.event_queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "event_queue_capacity must be positive".to_string(),
            ));
        }
        let Some(needed) = self.encoded_chunk_size() else {
            return Err(ConfigError::Invalid(format!(
                "safe_buffer_size {} is too large to encode",
                self.safe_buffer_size
            )));
        };
        if needed > self.max_message_size {
            return Err(ConfigError::Invalid(format!(
                "safe_buffer_size {} encodes to {} bytes, above max_message_size {}",
                self.safe_buffer_size, needed, self.max_message_size
            )));
        }
        Ok(())
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            server_name: "vmbuild".to_string(),
            bind_host_port: "127.0.0.1:0".to_string(),
            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            safe_buffer_size: DEFAULT_CHUNK_SIZE,
            event_queue_capacity: DEFAULT_QUEUE_CAPACITY,
        }
    }
}
