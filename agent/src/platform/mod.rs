//! Query sources for the current target.

pub mod portable;

#[cfg(target_os = "linux")]
pub mod linux;

#[cfg(windows)]
pub mod windows;

use std::sync::Arc;

use crate::vmem::Sources;

/// Sources backed by the native facilities of this host.
#[cfg(windows)]
pub fn native_sources() -> Sources {
    use self::windows::{PdhPageCounters, PdhPagingFileUsage, PerformanceInfo, WmiPageCounters};
    use crate::vmem::FallbackCounterSource;

    Sources {
        snapshot: Arc::new(PerformanceInfo),
        counters: Arc::new(FallbackCounterSource::new(
            PdhPageCounters::open(),
            WmiPageCounters,
        )),
        ratio: Arc::new(PdhPagingFileUsage::open()),
    }
}

/// Sources backed by the native facilities of this host.
#[cfg(target_os = "linux")]
pub fn native_sources() -> Sources {
    let memory = Arc::new(portable::SysinfoMemory::new());
    Sources {
        snapshot: memory.clone(),
        counters: Arc::new(linux::ProcVmstat::new()),
        ratio: memory,
    }
}

/// Sources backed by the native facilities of this host.
#[cfg(not(any(windows, target_os = "linux")))]
pub fn native_sources() -> Sources {
    let memory = Arc::new(portable::SysinfoMemory::new());
    Sources {
        snapshot: memory.clone(),
        counters: Arc::new(portable::NoPageCounters),
        ratio: memory,
    }
}
