//! Sources backed by `sysinfo`, for hosts without a commit-accounting API.
//!
//! `sysinfo` reports swap directly, so the commit snapshot is synthesized
//! such that its capacity equals the reported swap total.

use std::sync::Mutex;

use sysinfo::{MemoryRefreshKind, RefreshKind, System};

use crate::vmem::{
    CommitSnapshot, CounterSource, CounterValues, RatioSource, SnapshotSource, SourceError,
    UsageRatioSample,
};

struct MemoryReading {
    total_memory: u64,
    total_swap: u64,
    used_swap: u64,
}

/// Snapshot and ratio source over `sysinfo`'s memory figures.
pub struct SysinfoMemory {
    sys: Mutex<System>,
}

impl SysinfoMemory {
    pub fn new() -> Self {
        let sys = System::new_with_specifics(
            RefreshKind::new().with_memory(MemoryRefreshKind::everything()),
        );
        Self {
            sys: Mutex::new(sys),
        }
    }

    fn read(&self) -> MemoryReading {
        let mut sys = self.sys.lock().unwrap_or_else(|e| e.into_inner());
        sys.refresh_memory();
        MemoryReading {
            total_memory: sys.total_memory(),
            total_swap: sys.total_swap(),
            used_swap: sys.used_swap(),
        }
    }
}

impl Default for SysinfoMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl SnapshotSource for SysinfoMemory {
    fn commit_snapshot(&self) -> Result<CommitSnapshot, SourceError> {
        let m = self.read();
        // sysinfo reports zeros on platforms it does not support.
        if m.total_memory == 0 {
            return Err(SourceError::Unavailable(
                "sysinfo reported no physical memory".to_string(),
            ));
        }
        Ok(CommitSnapshot {
            page_size: 1,
            commit_limit: m.total_memory.saturating_add(m.total_swap),
            physical_total: m.total_memory,
        })
    }
}

impl RatioSource for SysinfoMemory {
    fn usage_ratio(&self) -> Result<Option<UsageRatioSample>, SourceError> {
        let m = self.read();
        if m.total_swap == 0 {
            return Ok(None);
        }
        Ok(Some(UsageRatioSample {
            percent_usage: m.used_swap,
            percent_usage_base: m.total_swap,
        }))
    }
}

/// Counter store for targets with no page-counter facility.
pub struct NoPageCounters;

impl CounterSource for NoPageCounters {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        Err(SourceError::Unavailable(format!(
            "page counters are not exposed on {}",
            std::env::consts::OS
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_capacity_matches_reported_swap() {
        let source = SysinfoMemory::new();
        let Ok(snap) = source.commit_snapshot() else {
            return;
        };
        let total_swap = source.read().total_swap;
        assert_eq!(snap.page_size, 1);
        assert_eq!(snap.swap_capacity(), total_swap);
    }

    #[test]
    fn test_no_page_counters_is_unavailable() {
        let err = NoPageCounters.page_counters().unwrap_err();
        assert!(matches!(err, SourceError::Unavailable(_)));
    }
}
