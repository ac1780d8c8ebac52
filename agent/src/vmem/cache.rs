//! Cached virtual-memory figures with "not yet computed" tracking.

use std::fmt;
use std::time::{Duration, Instant};

use serde::Serialize;

use super::format::format_bytes;

/// When a computed value should be queried again.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    /// Keep the first successfully computed value for the life of the process.
    #[default]
    Never,
    /// Re-query on access once the cached value is older than this.
    After(Duration),
}

impl RefreshPolicy {
    pub fn from_secs(secs: Option<u64>) -> Self {
        match secs {
            Some(s) => RefreshPolicy::After(Duration::from_secs(s)),
            None => RefreshPolicy::Never,
        }
    }
}

/// One cached value. Starts uncomputed; once set it only ever gets
/// overwritten with another complete value.
#[derive(Debug, Clone, Copy)]
pub struct Slot<T> {
    entry: Option<(T, Instant)>,
}

impl<T: Copy> Slot<T> {
    pub const fn new() -> Self {
        Self { entry: None }
    }

    /// The cached value, or `None` if never computed.
    pub fn get(&self) -> Option<T> {
        self.entry.map(|(value, _)| value)
    }

    pub fn set(&mut self, value: T) {
        self.entry = Some((value, Instant::now()));
    }

    pub fn is_computed(&self) -> bool {
        self.entry.is_some()
    }

    /// Whether the slot needs a query under `policy`: always when
    /// uncomputed, otherwise only once the TTL has elapsed.
    pub fn needs_query(&self, policy: RefreshPolicy) -> bool {
        match (self.entry, policy) {
            (None, _) => true,
            (Some(_), RefreshPolicy::Never) => false,
            (Some((_, at)), RefreshPolicy::After(ttl)) => at.elapsed() >= ttl,
        }
    }
}

impl<T: Copy> Default for Slot<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the four cached figures. `None` marks a field that has not
/// been computed yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VirtualMemoryStats {
    /// Bytes of swap in use.
    pub swap_used: Option<u64>,
    /// Total swap capacity in bytes.
    pub swap_total: Option<u64>,
    /// Pages read in from swap during the last sampling interval.
    pub swap_pages_in: Option<u64>,
    /// Pages written out to swap during the last sampling interval.
    pub swap_pages_out: Option<u64>,
}

impl VirtualMemoryStats {
    pub fn is_complete(&self) -> bool {
        self.swap_used.is_some()
            && self.swap_total.is_some()
            && self.swap_pages_in.is_some()
            && self.swap_pages_out.is_some()
    }
}

impl fmt::Display for VirtualMemoryStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let bytes = |v: Option<u64>| v.map_or_else(|| "?".to_string(), format_bytes);
        let pages = |v: Option<u64>| v.map_or_else(|| "?".to_string(), |p| p.to_string());
        write!(
            f,
            "Swap Used/Avail: {}/{}, Swap Pages In/Out: {}/{}",
            bytes(self.swap_used),
            bytes(self.swap_total),
            pages(self.swap_pages_in),
            pages(self.swap_pages_out),
        )
    }
}
