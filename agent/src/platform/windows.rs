//! Native Windows sources: `GetPerformanceInfo` for commit accounting,
//! PDH raw counters for page activity and paging-file usage, and the raw
//! WMI performance class as a second way to read page activity.

use std::iter;
use std::mem::{size_of, zeroed};
use std::sync::Mutex;

use serde::Deserialize;
use tracing::debug;
use windows::core::PCWSTR;
use windows::Win32::Foundation::{GetLastError, TRUE};
use windows::Win32::System::Performance::{
    PdhAddEnglishCounterW, PdhCloseQuery, PdhCollectQueryData, PdhGetRawCounterValue,
    PdhOpenQueryW, PDH_RAW_COUNTER,
};
use windows::Win32::System::ProcessStatus::{K32GetPerformanceInfo, PERFORMANCE_INFORMATION};
use wmi::{COMLibrary, WMIConnection};

use crate::vmem::source::{MEMORY_OBJECT, PAGES_INPUT_PER_SEC, PAGES_OUTPUT_PER_SEC};
use crate::vmem::{
    CommitSnapshot, CounterSource, CounterValues, RatioSource, SnapshotSource, SourceError,
    UsageRatioSample,
};

const ERROR_SUCCESS: u32 = 0;
const PDH_CSTATUS_VALID_DATA: u32 = 0;
const PDH_CSTATUS_NEW_DATA: u32 = 1;

const PAGING_FILE_USAGE: &str = "\\Paging File(_Total)\\% Usage";

fn wide(s: &str) -> Vec<u16> {
    s.encode_utf16().chain(iter::once(0)).collect()
}

fn counter_path(object: &str, counter: &str) -> String {
    format!("\\{object}\\{counter}")
}

/// Commit snapshot from `GetPerformanceInfo`.
pub struct PerformanceInfo;

impl SnapshotSource for PerformanceInfo {
    fn commit_snapshot(&self) -> Result<CommitSnapshot, SourceError> {
        // SAFETY: `perf_info` is only read after the call reports success.
        unsafe {
            let mut perf_info: PERFORMANCE_INFORMATION = zeroed();
            if K32GetPerformanceInfo(&mut perf_info, size_of::<PERFORMANCE_INFORMATION>() as u32)
                != TRUE
            {
                return Err(SourceError::Native {
                    call: "GetPerformanceInfo",
                    code: GetLastError().0,
                });
            }
            Ok(CommitSnapshot {
                page_size: perf_info.PageSize as u64,
                commit_limit: perf_info.CommitLimit as u64,
                physical_total: perf_info.PhysicalTotal as u64,
            })
        }
    }
}

/// An open PDH query with a fixed set of counters. Closed on drop.
struct PdhSession {
    query: isize,
    counters: Vec<(String, isize)>,
}

impl PdhSession {
    fn open(paths: &[(&str, String)]) -> Result<Self, SourceError> {
        let mut query: isize = 0;
        // SAFETY: `query` is a valid out-pointer for the handle.
        let status = unsafe { PdhOpenQueryW(PCWSTR::null(), 0, &mut query) };
        if status != ERROR_SUCCESS {
            return Err(SourceError::Native {
                call: "PdhOpenQuery",
                code: status,
            });
        }
        // From here on `Drop` closes the query, including on early return.
        let mut session = Self {
            query,
            counters: Vec::with_capacity(paths.len()),
        };

        for (name, path) in paths {
            let path_w = wide(path);
            let mut counter: isize = 0;
            // SAFETY: `path_w` is NUL-terminated and outlives the call.
            let status = unsafe {
                PdhAddEnglishCounterW(query, PCWSTR(path_w.as_ptr()), 0, &mut counter)
            };
            if status != ERROR_SUCCESS {
                return Err(SourceError::Native {
                    call: "PdhAddEnglishCounter",
                    code: status,
                });
            }
            session.counters.push((name.to_string(), counter));
        }
        Ok(session)
    }

    /// Collect once and read every counter's raw value. Counters whose
    /// data is not valid are left out of the result.
    fn collect(&self) -> Result<Vec<(&str, PDH_RAW_COUNTER)>, SourceError> {
        // SAFETY: `self.query` is an open query handle.
        let status = unsafe { PdhCollectQueryData(self.query) };
        if status != ERROR_SUCCESS {
            return Err(SourceError::Native {
                call: "PdhCollectQueryData",
                code: status,
            });
        }

        let mut out = Vec::with_capacity(self.counters.len());
        for (name, counter) in &self.counters {
            // SAFETY: `raw` is a valid out-pointer; `counter` belongs to this query.
            let (status, raw) = unsafe {
                let mut raw: PDH_RAW_COUNTER = zeroed();
                let status = PdhGetRawCounterValue(*counter, None, &mut raw);
                (status, raw)
            };
            if status != ERROR_SUCCESS
                || !matches!(raw.CStatus, PDH_CSTATUS_VALID_DATA | PDH_CSTATUS_NEW_DATA)
            {
                debug!(counter = %name, status, cstatus = raw.CStatus, "No valid raw counter value");
                continue;
            }
            out.push((name.as_str(), raw));
        }
        Ok(out)
    }
}

impl Drop for PdhSession {
    fn drop(&mut self) {
        // SAFETY: the handle was opened by `PdhOpenQueryW` and is closed once.
        unsafe {
            PdhCloseQuery(self.query);
        }
    }
}

fn raw_to_u64(v: i64) -> u64 {
    u64::try_from(v).unwrap_or(0)
}

/// A PDH session opened at construction. If opening failed every query
/// reports the failure.
struct OwnedSession {
    session: Result<Mutex<PdhSession>, String>,
}

impl OwnedSession {
    fn open(paths: &[(&str, String)]) -> Self {
        Self {
            session: PdhSession::open(paths)
                .map(Mutex::new)
                .map_err(|e| e.to_string()),
        }
    }

    fn with<T>(
        &self,
        f: impl FnOnce(&PdhSession) -> Result<T, SourceError>,
    ) -> Result<T, SourceError> {
        match &self.session {
            Ok(m) => {
                let session = m.lock().unwrap_or_else(|e| e.into_inner());
                f(&session)
            }
            Err(msg) => Err(SourceError::Unavailable(msg.clone())),
        }
    }
}

/// `\Memory\Pages Input/sec` and `\Memory\Pages Output/sec`.
pub struct PdhPageCounters {
    inner: OwnedSession,
}

impl PdhPageCounters {
    pub fn open() -> Self {
        let paths = [
            (
                PAGES_INPUT_PER_SEC,
                counter_path(MEMORY_OBJECT, PAGES_INPUT_PER_SEC),
            ),
            (
                PAGES_OUTPUT_PER_SEC,
                counter_path(MEMORY_OBJECT, PAGES_OUTPUT_PER_SEC),
            ),
        ];
        Self {
            inner: OwnedSession::open(&paths),
        }
    }
}

impl CounterSource for PdhPageCounters {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        self.inner.with(|session| {
            Ok(session
                .collect()?
                .into_iter()
                .map(|(name, raw)| (name.to_string(), raw_to_u64(raw.FirstValue)))
                .collect())
        })
    }
}

/// `\Paging File(_Total)\% Usage`, whose raw first and second values are
/// the usage and its base.
pub struct PdhPagingFileUsage {
    inner: OwnedSession,
}

impl PdhPagingFileUsage {
    pub fn open() -> Self {
        let paths = [("% Usage", PAGING_FILE_USAGE.to_string())];
        Self {
            inner: OwnedSession::open(&paths),
        }
    }
}

impl RatioSource for PdhPagingFileUsage {
    fn usage_ratio(&self) -> Result<Option<UsageRatioSample>, SourceError> {
        self.inner.with(|session| {
            Ok(session
                .collect()?
                .into_iter()
                .next()
                .map(|(_, raw)| UsageRatioSample {
                    percent_usage: raw_to_u64(raw.FirstValue),
                    percent_usage_base: raw_to_u64(raw.SecondValue),
                }))
        })
    }
}

/// Row of `Win32_PerfRawData_PerfOS_Memory`, the WMI view of the same raw
/// page counters PDH exposes.
#[derive(Debug, Deserialize)]
#[serde(rename = "Win32_PerfRawData_PerfOS_Memory")]
#[serde(rename_all = "PascalCase")]
struct PerfOsMemory {
    pages_input_persec: Option<u64>,
    pages_output_persec: Option<u64>,
}

/// Page counters read through WMI. COM is initialized per query so the
/// source can be shared across threads.
pub struct WmiPageCounters;

impl WmiPageCounters {
    fn query(&self) -> wmi::WMIResult<Vec<PerfOsMemory>> {
        let com = COMLibrary::new()?;
        let conn = WMIConnection::new(com)?;
        conn.query()
    }
}

impl CounterSource for WmiPageCounters {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        let rows = self
            .query()
            .map_err(|e| SourceError::Unavailable(format!("WMI query failed: {e}")))?;
        let Some(row) = rows.into_iter().next() else {
            return Err(SourceError::Unavailable(
                "Win32_PerfRawData_PerfOS_Memory returned no rows".to_string(),
            ));
        };

        Ok(row.into_values())
    }
}

impl PerfOsMemory {
    fn into_values(self) -> CounterValues {
        let mut values = CounterValues::new();
        if let Some(v) = self.pages_input_persec {
            values.insert(PAGES_INPUT_PER_SEC.to_string(), v);
        }
        if let Some(v) = self.pages_output_persec {
            values.insert(PAGES_OUTPUT_PER_SEC.to_string(), v);
        }
        values
    }
}
