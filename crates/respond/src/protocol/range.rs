//! Byte range selection for partial content responses.

use std::fmt;

/// An inclusive byte range `first..=last` of an entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    first: u64,
    last: u64,
}

impl ByteRange {
    /// Returns `None` when `last` is before `first`
    pub fn new(first: u64, last: u64) -> Option<Self> {
        (first <= last).then_some(Self { first, last })
    }

    #[inline]
    pub fn first(&self) -> u64 {
        self.first
    }

    #[inline]
    pub fn last(&self) -> u64 {
        self.last
    }

    /// The explicit content length selected by the range
    #[inline]
    pub fn len(&self) -> u64 {
        self.last - self.first + 1
    }

    /// Returns true if the range lies within an entity of `total` bytes
    pub fn fits(&self, total: u64) -> bool {
        self.last < total
    }

    /// The `Content-Range` value for an entity of `total` bytes
    pub fn content_range(&self, total: u64) -> ContentRange {
        ContentRange { range: *self, total }
    }
}

/// Display adapter rendering `bytes <first>-<last>/<total>`
#[derive(Debug, Clone, Copy)]
pub struct ContentRange {
    range: ByteRange,
    total: u64,
}

impl fmt::Display for ContentRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "bytes {}-{}/{}", self.range.first, self.range.last, self.total)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_length() {
        let range = ByteRange::new(0, 0).unwrap();
        assert_eq!(range.len(), 1);
        let range = ByteRange::new(10, 19).unwrap();
        assert_eq!(range.len(), 10);
        assert!(ByteRange::new(5, 4).is_none());
    }

    #[test]
    fn test_content_range() {
        let range = ByteRange::new(0, 499).unwrap();
        assert_eq!(range.content_range(1234).to_string(), "bytes 0-499/1234");
        assert!(range.fits(500));
        assert!(!range.fits(499));
    }
}
