//! The request facts the response pipeline depends on.
//!
//! Parsing requests is not the business of this crate, callers build a [`RequestMeta`]
//! from whatever parser they use, or from `http::request::Parts`.

use crate::compression::CompressionMethods;
use http::header::{ACCEPT_ENCODING, EXPECT};
use http::request::Parts;
use http::{HeaderMap, Method, Version};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMeta {
    method: Method,
    version: Version,
    accepted_encodings: CompressionMethods,
    expects_continue: bool,
}

impl RequestMeta {
    pub fn new(method: Method, version: Version) -> Self {
        Self { method, version, accepted_encodings: CompressionMethods::empty(), expects_continue: false }
    }

    pub fn from_parts(parts: &Parts) -> Self {
        Self::from_headers(parts.method.clone(), parts.version, &parts.headers)
    }

    pub fn from_headers(method: Method, version: Version, headers: &HeaderMap) -> Self {
        let accepted_encodings = headers
            .get_all(ACCEPT_ENCODING)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .map(CompressionMethods::from_accept_encoding)
            .fold(CompressionMethods::empty(), |acc, methods| acc | methods);

        // Verify if the value of the "Expect" field is "100-continue".
        let expects_continue = headers
            .get(EXPECT)
            .is_some_and(|value| value.as_bytes().eq_ignore_ascii_case(b"100-continue"));

        Self { method, version, accepted_encodings, expects_continue }
    }

    #[must_use]
    pub fn with_accept_encoding(mut self, accept_encoding: &str) -> Self {
        self.accepted_encodings = CompressionMethods::from_accept_encoding(accept_encoding);
        self
    }

    #[must_use]
    pub fn with_expect_continue(mut self, expects_continue: bool) -> Self {
        self.expects_continue = expects_continue;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn is_head(&self) -> bool {
        self.method == Method::HEAD
    }

    pub fn version(&self) -> Version {
        self.version
    }

    /// The version the response is written with, `default` when the request
    /// version is not one this server answers
    pub fn response_version(&self, default: Version) -> Version {
        match self.version {
            Version::HTTP_10 | Version::HTTP_11 => self.version,
            _ => default,
        }
    }

    pub fn accepted_encodings(&self) -> CompressionMethods {
        self.accepted_encodings
    }

    pub fn expects_continue(&self) -> bool {
        self.expects_continue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compression::CompressionMethod;
    use http::Request;

    #[test]
    fn test_from_parts() {
        let (parts, ()) = Request::builder()
            .method(Method::POST)
            .uri("/upload")
            .header(ACCEPT_ENCODING, "gzip, br;q=0")
            .header(EXPECT, "100-Continue")
            .body(())
            .unwrap()
            .into_parts();

        let meta = RequestMeta::from_parts(&parts);
        assert_eq!(meta.method(), Method::POST);
        assert!(meta.expects_continue());
        assert!(meta.accepted_encodings().contains(CompressionMethod::Gzip));
        assert!(!meta.accepted_encodings().contains(CompressionMethod::Brotli));
    }

    #[test]
    fn test_response_version() {
        let meta = RequestMeta::new(Method::GET, Version::HTTP_2);
        assert_eq!(meta.response_version(Version::HTTP_11), Version::HTTP_11);

        let meta = RequestMeta::new(Method::GET, Version::HTTP_10);
        assert_eq!(meta.response_version(Version::HTTP_11), Version::HTTP_10);
    }

    #[test]
    fn test_no_expect() {
        let meta = RequestMeta::from_headers(Method::GET, Version::HTTP_11, &HeaderMap::new());
        assert!(!meta.expects_continue());
        assert!(meta.accepted_encodings().is_empty());
    }
}
