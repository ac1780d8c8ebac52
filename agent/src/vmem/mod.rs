//! Swap statistics reconciled from a commit snapshot, a page-counter store
//! and a paging-file usage ratio.
//!
//! Every figure is computed lazily on first access and cached. A failed
//! query never overwrites a cached value and is never cached itself, so the
//! next access simply retries.

pub mod cache;
pub mod fallback;
pub mod format;
pub mod source;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, error, warn};

pub use cache::{RefreshPolicy, Slot, VirtualMemoryStats};
pub use fallback::FallbackCounterSource;
pub use source::{
    CommitSnapshot, CounterSource, CounterValues, PageRates, RatioSource, SnapshotSource,
    SourceError, UsageRatioSample,
};

/// The three query facilities the orchestrator draws from.
#[derive(Clone)]
pub struct Sources {
    pub snapshot: Arc<dyn SnapshotSource>,
    pub counters: Arc<dyn CounterSource>,
    pub ratio: Arc<dyn RatioSource>,
}

/// Lazily computed, cached swap statistics for the current host.
///
/// Each field sits behind its own lock, held for the duration of the query
/// that fills it, so at most one query per field is in flight. Lock order
/// is `swap_used` before `swap_total`.
pub struct VirtualMemory {
    sources: Sources,
    policy: RefreshPolicy,
    swap_total: Mutex<Slot<u64>>,
    swap_used: Mutex<Slot<u64>>,
    page_rates: Mutex<Slot<PageRates>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // Slots are only ever assigned whole values, so a poisoned lock still
    // guards consistent data.
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

impl VirtualMemory {
    /// Cache every figure for the life of this instance.
    pub fn new(sources: Sources) -> Self {
        Self::with_policy(sources, RefreshPolicy::Never)
    }

    pub fn with_policy(sources: Sources, policy: RefreshPolicy) -> Self {
        debug!(?policy, "Virtual memory statistics initialized");
        Self {
            sources,
            policy,
            swap_total: Mutex::new(Slot::new()),
            swap_used: Mutex::new(Slot::new()),
            page_rates: Mutex::new(Slot::new()),
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    /// Total swap capacity in bytes, or 0 if it has never been computed.
    pub fn swap_total(&self) -> u64 {
        self.swap_total_checked().unwrap_or(0)
    }

    /// Bytes of swap in use, or 0 if it has never been computed.
    pub fn swap_used(&self) -> u64 {
        let mut slot = lock(&self.swap_used);
        if slot.needs_query(self.policy) {
            self.fill_swap_used(&mut slot);
        }
        slot.get().unwrap_or(0)
    }

    /// Pages read in from swap during the last sampling interval.
    pub fn swap_pages_in(&self) -> u64 {
        self.page_rates().pages_in
    }

    /// Pages written out to swap during the last sampling interval.
    pub fn swap_pages_out(&self) -> u64 {
        self.page_rates().pages_out
    }

    /// Both page figures, fetched together by one counter query.
    pub fn page_rates(&self) -> PageRates {
        let mut slot = lock(&self.page_rates);
        if slot.needs_query(self.policy) {
            self.fill_page_rates(&mut slot);
        }
        slot.get().unwrap_or_default()
    }

    /// Current cache contents. Performs no queries.
    pub fn stats(&self) -> VirtualMemoryStats {
        let rates = lock(&self.page_rates).get();
        VirtualMemoryStats {
            swap_used: lock(&self.swap_used).get(),
            swap_total: lock(&self.swap_total).get(),
            swap_pages_in: rates.map(|r| r.pages_in),
            swap_pages_out: rates.map(|r| r.pages_out),
        }
    }

    /// Access every figure, then return the cache contents. Fields whose
    /// sources are failing come back as `None`.
    pub fn snapshot(&self) -> VirtualMemoryStats {
        self.swap_total();
        self.swap_used();
        self.page_rates();
        self.stats()
    }

    /// Query every source again regardless of policy. Fields whose source
    /// fails keep their previous value.
    pub fn refresh(&self) -> VirtualMemoryStats {
        {
            let mut slot = lock(&self.swap_total);
            self.fill_swap_total(&mut slot);
        }
        {
            let mut slot = lock(&self.swap_used);
            self.fill_swap_used(&mut slot);
        }
        {
            let mut slot = lock(&self.page_rates);
            self.fill_page_rates(&mut slot);
        }
        self.stats()
    }

    fn swap_total_checked(&self) -> Option<u64> {
        let mut slot = lock(&self.swap_total);
        if slot.needs_query(self.policy) {
            self.fill_swap_total(&mut slot);
        }
        slot.get()
    }

    fn fill_swap_total(&self, slot: &mut Slot<u64>) {
        match source::query_swap_capacity(self.sources.snapshot.as_ref()) {
            Ok(total) => {
                debug!(swap_total = total, "Swap capacity computed");
                slot.set(total);
            }
            Err(e) => error!("Failed to get performance info: {e}"),
        }
    }

    fn fill_swap_used(&self, slot: &mut Slot<u64>) {
        let sample = match self.sources.ratio.usage_ratio() {
            Ok(Some(sample)) => sample,
            Ok(None) => {
                debug!("Paging file query returned no rows, swap used left unchanged");
                return;
            }
            Err(e) => {
                warn!("Failed to query paging file usage: {e}");
                return;
            }
        };

        // Without a capacity the ratio has nothing to scale.
        let Some(total) = self.swap_total_checked() else {
            warn!("Swap capacity unavailable, swap used left unchanged");
            return;
        };

        let used = sample.scale(total);
        debug!(
            swap_used = used,
            percent_usage = sample.percent_usage,
            percent_usage_base = sample.percent_usage_base,
            "Swap usage computed"
        );
        slot.set(used);
    }

    fn fill_page_rates(&self, slot: &mut Slot<PageRates>) {
        match source::query_page_rates(self.sources.counters.as_ref()) {
            Ok(rates) => {
                debug!(
                    pages_in = rates.pages_in,
                    pages_out = rates.pages_out,
                    "Page rates sampled"
                );
                slot.set(rates);
            }
            Err(e) => warn!("Failed to query page counters: {e}"),
        }
    }
}
