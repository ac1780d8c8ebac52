//! Page counters from `/proc/vmstat`.
//!
//! The kernel's `pswpin`/`pswpout` are cumulative since boot. This store
//! keeps the previous sample and reports the difference, so each query
//! yields the activity of the last sampling interval. The store's first
//! query reports the totals since boot.

use std::collections::HashMap;
use std::sync::Mutex;

use crate::vmem::source::{PAGES_INPUT_PER_SEC, PAGES_OUTPUT_PER_SEC};
use crate::vmem::{CounterSource, CounterValues, SourceError};

type VmstatReader = Box<dyn Fn() -> Result<HashMap<String, i64>, SourceError> + Send + Sync>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct SwapCounters {
    pswpin: Option<u64>,
    pswpout: Option<u64>,
}

impl SwapCounters {
    fn from_vmstat(vmstat: &HashMap<String, i64>) -> Self {
        let get = |key: &str| vmstat.get(key).and_then(|v| u64::try_from(*v).ok());
        Self {
            pswpin: get("pswpin"),
            pswpout: get("pswpout"),
        }
    }
}

/// Activity since `previous`. With no previous sample at all the since-boot
/// total is reported; a counter that only appeared after the first sample
/// has no baseline yet and reports 0. A counter that went backwards was
/// reset and also reports 0.
fn delta(now: u64, previous: Option<&SwapCounters>, pick: fn(&SwapCounters) -> Option<u64>) -> u64 {
    match previous {
        None => now,
        Some(prev) => pick(prev).map_or(0, |p| now.saturating_sub(p)),
    }
}

pub struct ProcVmstat {
    read: VmstatReader,
    previous: Mutex<Option<SwapCounters>>,
}

impl ProcVmstat {
    pub fn new() -> Self {
        Self::with_reader(|| {
            procfs::vmstat().map_err(|e| SourceError::Unavailable(format!("/proc/vmstat: {e}")))
        })
    }

    /// Build the store over any producer of `/proc/vmstat`-shaped maps.
    pub fn with_reader(
        read: impl Fn() -> Result<HashMap<String, i64>, SourceError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            read: Box::new(read),
            previous: Mutex::new(None),
        }
    }
}

impl Default for ProcVmstat {
    fn default() -> Self {
        Self::new()
    }
}

impl CounterSource for ProcVmstat {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        let current = SwapCounters::from_vmstat(&(self.read)()?);

        let mut previous = self.previous.lock().unwrap_or_else(|e| e.into_inner());
        let mut values = CounterValues::new();
        if let Some(now) = current.pswpin {
            values.insert(
                PAGES_INPUT_PER_SEC.to_string(),
                delta(now, previous.as_ref(), |c| c.pswpin),
            );
        }
        if let Some(now) = current.pswpout {
            values.insert(
                PAGES_OUTPUT_PER_SEC.to_string(),
                delta(now, previous.as_ref(), |c| c.pswpout),
            );
        }
        *previous = Some(current);
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use super::*;

    fn vmstat(pairs: &[(&str, i64)]) -> HashMap<String, i64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    /// A store that replays the given samples in order.
    fn scripted(samples: Vec<HashMap<String, i64>>) -> ProcVmstat {
        let samples = Mutex::new(VecDeque::from(samples));
        ProcVmstat::with_reader(move || {
            samples
                .lock()
                .unwrap()
                .pop_front()
                .ok_or_else(|| SourceError::Unavailable("no more samples".into()))
        })
    }

    #[test]
    fn test_counters_are_differenced_between_samples() {
        let store = scripted(vec![
            vmstat(&[("nr_free_pages", 123), ("pswpin", 40), ("pswpout", 90)]),
            vmstat(&[("pswpin", 45), ("pswpout", 90)]),
        ]);

        let first = store.page_counters().unwrap();
        assert_eq!(first[PAGES_INPUT_PER_SEC], 40);
        assert_eq!(first[PAGES_OUTPUT_PER_SEC], 90);

        let second = store.page_counters().unwrap();
        assert_eq!(second[PAGES_INPUT_PER_SEC], 5);
        assert_eq!(second[PAGES_OUTPUT_PER_SEC], 0);
    }

    #[test]
    fn test_missing_counter_is_left_out() {
        let store = scripted(vec![vmstat(&[("pswpout", 12)])]);

        let values = store.page_counters().unwrap();
        assert!(!values.contains_key(PAGES_INPUT_PER_SEC));
        assert_eq!(values[PAGES_OUTPUT_PER_SEC], 12);
    }

    #[test]
    fn test_counter_appearing_late_has_no_baseline() {
        let store = scripted(vec![
            vmstat(&[("pswpout", 12)]),
            vmstat(&[("pswpin", 5000), ("pswpout", 20)]),
            vmstat(&[("pswpin", 5003), ("pswpout", 20)]),
        ]);

        store.page_counters().unwrap();

        let second = store.page_counters().unwrap();
        assert_eq!(
            second[PAGES_INPUT_PER_SEC], 0,
            "since-boot total must not be reported as one interval"
        );
        assert_eq!(second[PAGES_OUTPUT_PER_SEC], 8);

        let third = store.page_counters().unwrap();
        assert_eq!(third[PAGES_INPUT_PER_SEC], 3);
    }

    #[test]
    fn test_counter_reset_reports_zero() {
        let store = scripted(vec![
            vmstat(&[("pswpin", 100), ("pswpout", 100)]),
            vmstat(&[("pswpin", 10), ("pswpout", 110)]),
        ]);
        store.page_counters().unwrap();

        let values = store.page_counters().unwrap();
        assert_eq!(values[PAGES_INPUT_PER_SEC], 0);
        assert_eq!(values[PAGES_OUTPUT_PER_SEC], 10);
    }

    #[test]
    fn test_failed_read_keeps_baseline() {
        let store = scripted(vec![vmstat(&[("pswpin", 40)])]);
        store.page_counters().unwrap();
        assert!(store.page_counters().is_err());
        assert_eq!(
            *store.previous.lock().unwrap(),
            Some(SwapCounters {
                pswpin: Some(40),
                pswpout: None
            })
        );
    }

    #[test]
    fn test_reads_live_vmstat() {
        let values = ProcVmstat::new().page_counters().unwrap();
        assert!(values.len() <= 2);
    }
}
