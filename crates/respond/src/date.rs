//! HTTP `Date` header value cache.
//!
//! Formatting the date for every response is wasted work under load, the value only
//! changes once a second. [`DateService`] keeps the last rendered value in an [`ArcSwap`]
//! and renders a new one at most once per refresh interval, so concurrent connections
//! read it without taking a lock.

use arc_swap::ArcSwap;
use bytes::Bytes;
use once_cell::sync::Lazy;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

static DATE_SERVICE: Lazy<DateService> = Lazy::new(|| DateService::with_refresh_interval(Duration::from_millis(800)));

struct RenderedDate {
    rendered_at: Instant,
    value: Bytes,
}

impl RenderedDate {
    fn now() -> Self {
        let mut buf = faf_http_date::get_date_buff_no_key();
        faf_http_date::get_date_no_key(&mut buf);
        Self { rendered_at: Instant::now(), value: Bytes::from_owner(buf) }
    }
}

pub struct DateService {
    current: ArcSwap<RenderedDate>,
    refresh_interval: Duration,
}

impl DateService {
    /// The process wide instance shared by every connection
    pub fn global() -> &'static DateService {
        &DATE_SERVICE
    }

    pub fn with_refresh_interval(refresh_interval: Duration) -> Self {
        Self { current: ArcSwap::from_pointee(RenderedDate::now()), refresh_interval }
    }

    /// The current date in IMF-fixdate form, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`
    pub fn http_date(&self) -> Bytes {
        let current = self.current.load();
        if current.rendered_at.elapsed() < self.refresh_interval {
            return current.value.clone();
        }

        let fresh = RenderedDate::now();
        let value = fresh.value.clone();
        self.current.store(Arc::new(fresh));
        value
    }
}

impl fmt::Debug for DateService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DateService").field("refresh_interval", &self.refresh_interval).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn date_is_imf_fixdate() {
        let date = DateService::global().http_date();
        assert_eq!(date.len(), 29);
        assert!(date.ends_with(b" GMT"));
        assert_eq!(date[3], b',');
    }

    #[test]
    fn value_is_cached_within_interval() {
        let service = DateService::with_refresh_interval(Duration::from_secs(3600));
        let first = service.http_date();
        let second = service.http_date();
        assert_eq!(first.as_ptr(), second.as_ptr());
    }

    #[test]
    fn value_is_rendered_again_after_interval() {
        let service = DateService::with_refresh_interval(Duration::ZERO);
        let first = service.http_date();
        let second = service.http_date();
        assert_ne!(first.as_ptr(), second.as_ptr());
    }
}
