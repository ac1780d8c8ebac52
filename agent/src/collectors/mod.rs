use serde::Serialize;

use crate::vmem::{VirtualMemory, VirtualMemoryStats};

/// A swap report for one tick.
#[derive(Debug, Serialize)]
pub struct SwapReport {
    pub hostname: String,
    pub timestamp: String,
    pub version: String,
    pub swap: VirtualMemoryStats,
}

/// Read every swap figure (querying whatever is not cached yet) into a report.
pub fn collect(vm: &VirtualMemory) -> SwapReport {
    SwapReport {
        hostname: sysinfo::System::host_name().unwrap_or_else(|| "unknown".to_string()),
        timestamp: chrono::Utc::now().to_rfc3339(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        swap: vm.snapshot(),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::vmem::{
        CommitSnapshot, CounterSource, CounterValues, RatioSource, SnapshotSource, SourceError,
        Sources, UsageRatioSample,
    };

    struct Fixed;

    impl SnapshotSource for Fixed {
        fn commit_snapshot(&self) -> Result<CommitSnapshot, SourceError> {
            Ok(CommitSnapshot {
                page_size: 4096,
                commit_limit: 1000,
                physical_total: 600,
            })
        }
    }

    impl RatioSource for Fixed {
        fn usage_ratio(&self) -> Result<Option<UsageRatioSample>, SourceError> {
            Ok(Some(UsageRatioSample {
                percent_usage: 1,
                percent_usage_base: 4,
            }))
        }
    }

    impl CounterSource for Fixed {
        fn page_counters(&self) -> Result<CounterValues, SourceError> {
            Err(SourceError::Unavailable("no counters".into()))
        }
    }

    #[test]
    fn test_report_serializes_uncomputed_as_null() {
        let source = Arc::new(Fixed);
        let vm = VirtualMemory::new(Sources {
            snapshot: source.clone(),
            counters: source.clone(),
            ratio: source,
        });

        let report = collect(&vm);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["swap"]["swap_total"], 1_638_400);
        assert_eq!(json["swap"]["swap_used"], 409_600);
        assert!(json["swap"]["swap_pages_in"].is_null());
        assert!(json["swap"]["swap_pages_out"].is_null());
        assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
    }
}
