//! Query seams for the host's memory accounting facilities.
//!
//! Each source wraps one blocking OS query. Sources keep no state the
//! orchestrator can observe; a counter store may keep a private baseline
//! for differencing.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use thiserror::Error;
use tracing::debug;

/// Counter name for pages read in from the paging file.
pub const PAGES_INPUT_PER_SEC: &str = "Pages Input/sec";

/// Counter name for pages written out to the paging file.
pub const PAGES_OUTPUT_PER_SEC: &str = "Pages Output/sec";

/// Counter object both page counters belong to.
pub const MEMORY_OBJECT: &str = "Memory";

/// Failure of an underlying OS query. Every variant means the source is
/// unavailable for this call; nothing is cached from a failed query.
#[derive(Debug, Error)]
pub enum SourceError {
    #[error("source unavailable: {0}")]
    Unavailable(String),

    #[error("{call} failed with error code {code:#x}")]
    Native { call: &'static str, code: u32 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Commit accounting as reported by a single performance-info call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommitSnapshot {
    pub page_size: u64,
    pub commit_limit: u64,
    pub physical_total: u64,
}

impl CommitSnapshot {
    /// Swap capacity in bytes: the part of the commit limit not backed by
    /// physical memory. Never negative.
    pub fn swap_capacity(&self) -> u64 {
        self.page_size
            .saturating_mul(self.commit_limit.saturating_sub(self.physical_total))
    }
}

/// A percentage-usage counter pair: `percent_usage / percent_usage_base` is
/// the fraction of the paging file in use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UsageRatioSample {
    pub percent_usage: u64,
    pub percent_usage_base: u64,
}

impl UsageRatioSample {
    /// Apply the ratio to `total`. A zero base yields 0.
    pub fn scale(&self, total: u64) -> u64 {
        if self.percent_usage_base == 0 {
            return 0;
        }
        let scaled =
            u128::from(self.percent_usage) * u128::from(total) / u128::from(self.percent_usage_base);
        u64::try_from(scaled).unwrap_or(u64::MAX)
    }
}

/// Raw counter values keyed by counter name. Counters absent from the
/// result set are simply missing.
pub type CounterValues = HashMap<String, u64>;

/// Page-in/page-out figures from one counter query.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PageRates {
    pub pages_in: u64,
    pub pages_out: u64,
}

impl PageRates {
    /// Pick the two page counters out of a result set, substituting zero for
    /// whichever is missing.
    pub fn from_values(values: &CounterValues) -> Self {
        Self {
            pages_in: counter_or_zero(values, PAGES_INPUT_PER_SEC),
            pages_out: counter_or_zero(values, PAGES_OUTPUT_PER_SEC),
        }
    }
}

fn counter_or_zero(values: &CounterValues, name: &str) -> u64 {
    match values.get(name) {
        Some(v) => *v,
        None => {
            debug!(counter = name, "counter missing from result set, using 0");
            0
        }
    }
}

/// Point-in-time commit limit and physical memory totals.
pub trait SnapshotSource: Send + Sync {
    fn commit_snapshot(&self) -> Result<CommitSnapshot, SourceError>;
}

/// Pre-differenced page counters of the `Memory` counter object.
pub trait CounterSource: Send + Sync {
    fn page_counters(&self) -> Result<CounterValues, SourceError>;
}

/// Paging-file usage ratio. `Ok(None)` means the query ran but returned no
/// rows (e.g. no paging file is configured).
pub trait RatioSource: Send + Sync {
    fn usage_ratio(&self) -> Result<Option<UsageRatioSample>, SourceError>;
}

impl<T: SnapshotSource + ?Sized> SnapshotSource for Arc<T> {
    fn commit_snapshot(&self) -> Result<CommitSnapshot, SourceError> {
        (**self).commit_snapshot()
    }
}

impl<T: CounterSource + ?Sized> CounterSource for Arc<T> {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        (**self).page_counters()
    }
}

impl<T: RatioSource + ?Sized> RatioSource for Arc<T> {
    fn usage_ratio(&self) -> Result<Option<UsageRatioSample>, SourceError> {
        (**self).usage_ratio()
    }
}

/// Total swap capacity in bytes from one snapshot query.
pub fn query_swap_capacity(source: &dyn SnapshotSource) -> Result<u64, SourceError> {
    source.commit_snapshot().map(|s| s.swap_capacity())
}

/// Page-in/page-out figures from one counter query.
pub fn query_page_rates(source: &dyn CounterSource) -> Result<PageRates, SourceError> {
    source.page_counters().map(|v| PageRates::from_values(&v))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_swap_capacity_is_page_size_times_difference() {
        let snap = CommitSnapshot {
            page_size: 4096,
            commit_limit: 1000,
            physical_total: 600,
        };
        assert_eq!(snap.swap_capacity(), 1_638_400);
    }

    #[test]
    fn test_swap_capacity_floors_at_zero() {
        let snap = CommitSnapshot {
            page_size: 4096,
            commit_limit: 500,
            physical_total: 600,
        };
        assert_eq!(snap.swap_capacity(), 0);
    }

    #[test]
    fn test_ratio_scale() {
        let sample = UsageRatioSample {
            percent_usage: 25,
            percent_usage_base: 100,
        };
        assert_eq!(sample.scale(1_000_000), 250_000);
    }

    #[test]
    fn test_ratio_zero_base() {
        let sample = UsageRatioSample {
            percent_usage: 25,
            percent_usage_base: 0,
        };
        assert_eq!(sample.scale(1_000_000), 0);
    }

    #[test]
    fn test_ratio_scale_does_not_overflow() {
        let sample = UsageRatioSample {
            percent_usage: u64::MAX / 2,
            percent_usage_base: u64::MAX,
        };
        let used = sample.scale(u64::MAX);
        assert!(used < u64::MAX);
        assert!(used > u64::MAX / 3);
    }

    #[test]
    fn test_page_rates_missing_counter_is_zero() {
        let mut values = CounterValues::new();
        values.insert(PAGES_OUTPUT_PER_SEC.to_string(), 17);

        let rates = PageRates::from_values(&values);
        assert_eq!(rates.pages_in, 0);
        assert_eq!(rates.pages_out, 17);
    }

    #[test]
    fn test_page_rates_ignores_unrelated_counters() {
        let mut values = CounterValues::new();
        values.insert(PAGES_INPUT_PER_SEC.to_string(), 3);
        values.insert(PAGES_OUTPUT_PER_SEC.to_string(), 4);
        values.insert("Page Faults/sec".to_string(), 9000);

        assert_eq!(
            PageRates::from_values(&values),
            PageRates {
                pages_in: 3,
                pages_out: 4
            }
        );
    }
}
