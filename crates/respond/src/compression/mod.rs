//! Compression sequencing for response bodies.
//!
//! The response pipeline never compresses anything itself, it drives a block oriented
//! [`Compressor`] obtained from a [`CompressorFactory`]:
//!
//! - [`Compressor::compress_block`] consumes part of an input window and produces part of the
//!   output, either side may be zero when the codec buffers internally
//! - [`Compressor::flush`] drains what the codec still holds once the input is exhausted,
//!   it reports zero once everything has been produced
//!
//! [`NativeCompressorFactory`] provides gzip, deflate, brotli and zstd.

mod native;

pub use native::NativeCompressor;
pub use native::NativeCompressorFactory;

use crate::protocol::CompressionError;
use serde::Deserialize;
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use tracing::trace;

/// A content coding the pipeline can negotiate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompressionMethod {
    Gzip,
    Deflate,
    Brotli,
    Zstd,
}

impl CompressionMethod {
    /// Server preference, most preferred first
    pub const PREFERENCE: [CompressionMethod; 4] =
        [CompressionMethod::Zstd, CompressionMethod::Brotli, CompressionMethod::Gzip, CompressionMethod::Deflate];

    /// The `Content-Encoding` token
    pub fn content_encoding(&self) -> &'static str {
        match self {
            CompressionMethod::Gzip => "gzip",
            CompressionMethod::Deflate => "deflate",
            CompressionMethod::Brotli => "br",
            CompressionMethod::Zstd => "zstd",
        }
    }

    fn bit(self) -> u8 {
        match self {
            CompressionMethod::Gzip => 0x01,
            CompressionMethod::Deflate => 0x02,
            CompressionMethod::Brotli => 0x04,
            CompressionMethod::Zstd => 0x08,
        }
    }

    fn from_token(token: &str) -> Option<Self> {
        if token.eq_ignore_ascii_case("gzip") || token.eq_ignore_ascii_case("x-gzip") {
            Some(CompressionMethod::Gzip)
        } else if token.eq_ignore_ascii_case("deflate") {
            Some(CompressionMethod::Deflate)
        } else if token.eq_ignore_ascii_case("br") {
            Some(CompressionMethod::Brotli)
        } else if token.eq_ignore_ascii_case("zstd") {
            Some(CompressionMethod::Zstd)
        } else {
            None
        }
    }
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.content_encoding())
    }
}

/// A set of [`CompressionMethod`]s, used both for what a client accepts and for what a
/// factory supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionMethods(u8);

impl CompressionMethods {
    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn all() -> Self {
        Self(0x0f)
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn contains(&self, method: CompressionMethod) -> bool {
        self.0 & method.bit() != 0
    }

    pub fn insert(&mut self, method: CompressionMethod) {
        self.0 |= method.bit();
    }

    pub fn remove(&mut self, method: CompressionMethod) {
        self.0 &= !method.bit();
    }

    /// Parses an `Accept-Encoding` value.
    ///
    /// Codings with `q=0` are excluded, `*` stands for every coding not named explicitly.
    pub fn from_accept_encoding(value: &str) -> Self {
        let mut accepted = Self::empty();
        let mut named = Self::empty();
        let mut wildcard = false;

        for item in value.split(',') {
            let mut parts = item.split(';');
            let token = parts.next().unwrap_or_default().trim();
            let refused = parts.any(|param| is_zero_quality(param.trim()));

            if token == "*" {
                wildcard = !refused;
                continue;
            }

            if let Some(method) = CompressionMethod::from_token(token) {
                named.insert(method);
                if !refused {
                    accepted.insert(method);
                }
            }
        }

        if wildcard {
            accepted.0 |= Self::all().0 & !named.0;
        }
        accepted
    }

    /// Picks the most preferred method present in both sets
    pub fn negotiate(&self, supported: CompressionMethods) -> Option<CompressionMethod> {
        CompressionMethod::PREFERENCE.into_iter().find(|&method| self.contains(method) && supported.contains(method))
    }
}

fn is_zero_quality(param: &str) -> bool {
    let Some((name, value)) = param.split_once('=') else {
        return false;
    };
    name.trim().eq_ignore_ascii_case("q") && value.trim().parse::<f32>().is_ok_and(|q| q <= 0.0)
}

impl From<CompressionMethod> for CompressionMethods {
    fn from(method: CompressionMethod) -> Self {
        Self(method.bit())
    }
}

impl BitOr for CompressionMethods {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self::Output {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for CompressionMethods {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

/// Trade off between speed and ratio, mapped onto each codec's own scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    Fastest,
    #[default]
    Optimal,
    #[serde(rename = "smallest")]
    SmallestSize,
    #[serde(rename = "none")]
    NoCompression,
}

/// Progress reported by [`Compressor::compress_block`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CompressionResult {
    /// input bytes consumed
    pub read: usize,
    /// output bytes produced
    pub written: usize,
}

/// A stateful block oriented compressor working on caller supplied buffers.
pub trait Compressor: Send {
    fn method(&self) -> CompressionMethod;

    /// Largest input window the codec wants per call, 0 when unconstrained
    fn block_size(&self) -> usize {
        0
    }

    /// Compresses part of `input` into `output`.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError`] on a codec failure, or when called after the final flush.
    fn compress_block(&mut self, input: &[u8], output: &mut [u8]) -> Result<CompressionResult, CompressionError>;

    /// Finishes the stream and copies the remaining output, returns 0 once fully drained.
    ///
    /// # Errors
    ///
    /// Returns [`CompressionError`] on a codec failure.
    fn flush(&mut self, output: &mut [u8]) -> Result<usize, CompressionError>;
}

/// Creates compressors for the methods it supports.
#[cfg_attr(test, mockall::automock)]
pub trait CompressorFactory: Send + Sync {
    fn supported(&self) -> CompressionMethods;

    /// # Errors
    ///
    /// Returns [`CompressionError::Unsupported`] for a method outside of [`supported`](Self::supported),
    /// or the codec error raised while initializing.
    fn create(&self, method: CompressionMethod, level: CompressionLevel) -> Result<Box<dyn Compressor>, CompressionError>;
}

/// The compressor of one request, torn down when dropped.
pub struct CompressionContext {
    compressor: Box<dyn Compressor>,
}

impl CompressionContext {
    /// # Errors
    ///
    /// Returns the error of [`CompressorFactory::create`].
    pub fn init(
        factory: &dyn CompressorFactory,
        method: CompressionMethod,
        level: CompressionLevel,
    ) -> Result<Self, CompressionError> {
        let compressor = factory.create(method, level)?;
        trace!(%method, block_size = compressor.block_size(), "compressor initialized");
        Ok(Self { compressor })
    }

    pub fn method(&self) -> CompressionMethod {
        self.compressor.method()
    }

    pub fn block_size(&self) -> usize {
        self.compressor.block_size()
    }

    pub fn compressor_mut(&mut self) -> &mut dyn Compressor {
        self.compressor.as_mut()
    }
}

impl fmt::Debug for CompressionContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompressionContext").field("method", &self.method()).finish()
    }
}

impl Drop for CompressionContext {
    fn drop(&mut self) {
        trace!(method = %self.compressor.method(), "compressor torn down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accept_encoding() {
        let methods = CompressionMethods::from_accept_encoding("gzip, deflate, br");
        assert!(methods.contains(CompressionMethod::Gzip));
        assert!(methods.contains(CompressionMethod::Deflate));
        assert!(methods.contains(CompressionMethod::Brotli));
        assert!(!methods.contains(CompressionMethod::Zstd));
    }

    #[test]
    fn test_zero_quality_excluded() {
        let methods = CompressionMethods::from_accept_encoding("gzip;q=1.0, br; q=0, zstd;q=0.000");
        assert_eq!(methods, CompressionMethods::from(CompressionMethod::Gzip));
    }

    #[test]
    fn test_wildcard() {
        let methods = CompressionMethods::from_accept_encoding("*, gzip;q=0");
        assert!(!methods.contains(CompressionMethod::Gzip));
        assert!(methods.contains(CompressionMethod::Zstd));
        assert!(methods.contains(CompressionMethod::Deflate));

        assert!(CompressionMethods::from_accept_encoding("*;q=0").is_empty());
        assert!(CompressionMethods::from_accept_encoding("identity").is_empty());
    }

    #[test]
    fn test_negotiate_prefers_server_order() {
        let accepted = CompressionMethods::from_accept_encoding("deflate, gzip, br, zstd");
        assert_eq!(accepted.negotiate(CompressionMethods::all()), Some(CompressionMethod::Zstd));

        let mut supported = CompressionMethods::all();
        supported.remove(CompressionMethod::Zstd);
        assert_eq!(accepted.negotiate(supported), Some(CompressionMethod::Brotli));

        let supported = CompressionMethods::from(CompressionMethod::Deflate) | CompressionMethod::Gzip.into();
        assert_eq!(accepted.negotiate(supported), Some(CompressionMethod::Gzip));

        assert_eq!(CompressionMethods::empty().negotiate(CompressionMethods::all()), None);
    }

    #[test]
    fn test_bitmask_values() {
        assert_eq!(CompressionMethods::from(CompressionMethod::Gzip).0, 0x01);
        assert_eq!(CompressionMethods::from(CompressionMethod::Deflate).0, 0x02);
        assert_eq!(CompressionMethods::from(CompressionMethod::Brotli).0, 0x04);
        assert_eq!(CompressionMethods::from(CompressionMethod::Zstd).0, 0x08);
    }

    #[test]
    fn test_init_failure_is_reported() {
        let mut factory = MockCompressorFactory::new();
        factory
            .expect_create()
            .returning(|method, _| Err(CompressionError::Unsupported(method)));

        let result = CompressionContext::init(&factory, CompressionMethod::Brotli, CompressionLevel::Optimal);
        assert!(matches!(result, Err(CompressionError::Unsupported(CompressionMethod::Brotli))));
    }
}
