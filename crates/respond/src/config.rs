//! Configuration surface of the response pipeline.
//!
//! [`ResponseConfig`] is deserializable with serde, every field has a default so a
//! partial document only needs to name what it overrides.

use crate::codec::{HeaderCharset, MIN_CHUNK_BUFFER_SIZE};
use crate::compression::CompressionLevel;
use crate::protocol::ConfigError;
use crate::utils::ensure;
use http::Version;
use serde::Deserialize;
use std::time::Duration;

/// Smallest header buffer able to hold a status line, a date and a few headers
pub const MIN_HEADER_BUFFER_SIZE: usize = 128;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ResponseConfig {
    /// size of the buffer used to read request heads
    pub request_header_buffer_size: usize,
    /// capacity of the header accumulator, a response whose header block does not fit is rejected
    pub response_header_buffer_size: usize,
    /// capacity of the chunk accumulator, including the reserved size prefix
    pub chunk_buffer_size: usize,
    /// capacity of the copy buffer used for stream bodies
    pub response_buffer_size: usize,
    /// version used to answer requests whose version is not HTTP/1.0 or HTTP/1.1
    pub default_version: HttpVersionConfig,
    pub header_charset: HeaderCharset,
    pub title_case_headers: bool,
    pub send_timeout_ms: u64,
    pub send_100_continue: bool,
    pub compression: CompressionConfig,
}

impl Default for ResponseConfig {
    fn default() -> Self {
        Self {
            request_header_buffer_size: 8 * 1024,
            response_header_buffer_size: 16 * 1024,
            chunk_buffer_size: 16 * 1024,
            response_buffer_size: 64 * 1024,
            default_version: HttpVersionConfig::Http11,
            header_charset: HeaderCharset::Utf8,
            title_case_headers: true,
            send_timeout_ms: 30_000,
            send_100_continue: true,
            compression: CompressionConfig::default(),
        }
    }
}

impl ResponseConfig {
    #[inline]
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Checks the buffer sizes against what the pipeline needs to make progress.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] when a buffer is too small to frame a single
    /// response, or when the compression thresholds are inverted.
    pub fn validate(&self) -> Result<(), ConfigError> {
        ensure!(
            self.chunk_buffer_size >= MIN_CHUNK_BUFFER_SIZE,
            ConfigError::new(format!(
                "chunk_buffer_size {} is below the minimum {MIN_CHUNK_BUFFER_SIZE}",
                self.chunk_buffer_size
            ))
        );
        ensure!(
            self.response_header_buffer_size >= MIN_HEADER_BUFFER_SIZE,
            ConfigError::new(format!(
                "response_header_buffer_size {} is below the minimum {MIN_HEADER_BUFFER_SIZE}",
                self.response_header_buffer_size
            ))
        );
        ensure!(self.response_buffer_size > 0, ConfigError::new("response_buffer_size must not be zero"));
        ensure!(
            self.compression.min_size <= self.compression.max_size,
            ConfigError::new(format!(
                "compression min_size {} is larger than max_size {}",
                self.compression.min_size, self.compression.max_size
            ))
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum HttpVersionConfig {
    #[serde(rename = "HTTP/1.0")]
    Http10,
    #[serde(rename = "HTTP/1.1")]
    Http11,
}

impl From<HttpVersionConfig> for Version {
    fn from(value: HttpVersionConfig) -> Self {
        match value {
            HttpVersionConfig::Http10 => Version::HTTP_10,
            HttpVersionConfig::Http11 => Version::HTTP_11,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CompressionConfig {
    pub enabled: bool,
    /// smallest known entity length eligible for compression, inclusive
    pub min_size: u64,
    /// largest known entity length eligible for compression, inclusive
    pub max_size: u64,
    pub level: CompressionLevel,
}

impl Default for CompressionConfig {
    fn default() -> Self {
        Self { enabled: true, min_size: 1024, max_size: 64 * 1024 * 1024, level: CompressionLevel::Optimal }
    }
}

impl CompressionConfig {
    /// Returns true if an entity of the given length may be compressed,
    /// entities with an unknown length are always eligible
    pub fn accepts_length(&self, length: Option<u64>) -> bool {
        match length {
            Some(length) => (self.min_size..=self.max_size).contains(&length),
            None => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ResponseConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_document_keeps_defaults() {
        let config: ResponseConfig = serde_json::from_str(
            r#"{
                "chunk_buffer_size": 4096,
                "default_version": "HTTP/1.0",
                "header_charset": "latin1",
                "compression": { "level": "fastest", "min_size": 16 }
            }"#,
        )
        .unwrap();

        assert_eq!(config.chunk_buffer_size, 4096);
        assert_eq!(config.response_header_buffer_size, 16 * 1024);
        assert_eq!(Version::from(config.default_version), Version::HTTP_10);
        assert_eq!(config.header_charset, HeaderCharset::Latin1);
        assert_eq!(config.compression.level, CompressionLevel::Fastest);
        assert_eq!(config.compression.min_size, 16);
        assert!(config.compression.enabled);
    }

    #[test]
    fn tiny_chunk_buffer_is_rejected() {
        let config = ResponseConfig { chunk_buffer_size: 16, ..ResponseConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn tiny_header_buffer_is_rejected() {
        let config = ResponseConfig { response_header_buffer_size: 32, ..ResponseConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn inverted_thresholds_are_rejected() {
        let compression = CompressionConfig { min_size: 10, max_size: 5, ..CompressionConfig::default() };
        let config = ResponseConfig { compression, ..ResponseConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn length_thresholds_are_inclusive() {
        let compression = CompressionConfig { min_size: 10, max_size: 20, ..CompressionConfig::default() };
        assert!(!compression.accepts_length(Some(9)));
        assert!(compression.accepts_length(Some(10)));
        assert!(compression.accepts_length(Some(20)));
        assert!(!compression.accepts_length(Some(21)));
        assert!(compression.accepts_length(None));
    }
}
