// =============================================================================
// Request-weight tracker — reads Binance usage headers to stay off 429s
// =============================================================================
//
// Binance reports the rolling one-minute request weight in the
// `X-MBX-USED-WEIGHT-1M` response header. The tracker records the latest
// value after every request and warns once when usage crosses 80% of the
// venue ceiling.
// =============================================================================

use std::sync::atomic::{AtomicU32, Ordering};

use tracing::{debug, warn};

/// Rolling request-weight usage for one API base.
pub struct UsedWeight {
    limit: u32,
    used: AtomicU32,
}

impl UsedWeight {
    /// Track usage against the venue's per-minute weight `limit`.
    pub fn new(limit: u32) -> Self {
        Self {
            limit,
            used: AtomicU32::new(0),
        }
    }

    /// Record the usage reported in a response's headers, if present.
    pub fn record(&self, headers: &reqwest::header::HeaderMap) {
        let Some(weight) = headers
            .get("X-MBX-USED-WEIGHT-1M")
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        let warn_at = self.limit / 5 * 4;
        let previous = self.used.swap(weight, Ordering::Relaxed);
        if weight >= warn_at && previous < warn_at {
            warn!(
                used_weight = weight,
                limit = self.limit,
                "request weight crossed the warning threshold"
            );
        } else {
            debug!(used_weight = weight, "request weight updated");
        }
    }

    /// Latest reported one-minute weight.
    pub fn used(&self) -> u32 {
        self.used.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use reqwest::header::{HeaderMap, HeaderValue};

    use super::*;

    fn headers_with_weight(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("X-MBX-USED-WEIGHT-1M", HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn records_reported_weight() {
        let tracker = UsedWeight::new(1200);
        tracker.record(&headers_with_weight("347"));
        assert_eq!(tracker.used(), 347);
        tracker.record(&headers_with_weight("12"));
        assert_eq!(tracker.used(), 12);
    }

    #[test]
    fn missing_header_leaves_counter_unchanged() {
        let tracker = UsedWeight::new(1200);
        tracker.record(&headers_with_weight("500"));
        tracker.record(&HeaderMap::new());
        assert_eq!(tracker.used(), 500);
    }

    #[test]
    fn garbage_header_is_ignored() {
        let tracker = UsedWeight::new(1200);
        tracker.record(&headers_with_weight("not-a-number"));
        assert_eq!(tracker.used(), 0);
    }
}
