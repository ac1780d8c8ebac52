//! Counter store that switches to a secondary query mechanism once the
//! primary one fails.
//!
//! The switch sticks while the secondary keeps answering. If the secondary
//! fails too, the primary is tried again and, on success, becomes the
//! active mechanism once more.

use std::sync::atomic::{AtomicBool, Ordering};

use tracing::{info, warn};

use super::source::{CounterSource, CounterValues, SourceError};

pub struct FallbackCounterSource<P, S> {
    primary: P,
    secondary: S,
    use_secondary: AtomicBool,
}

impl<P: CounterSource, S: CounterSource> FallbackCounterSource<P, S> {
    pub fn new(primary: P, secondary: S) -> Self {
        Self {
            primary,
            secondary,
            use_secondary: AtomicBool::new(false),
        }
    }

    /// Whether the secondary is currently the active mechanism.
    pub fn is_latched(&self) -> bool {
        self.use_secondary.load(Ordering::Acquire)
    }
}

impl<P: CounterSource, S: CounterSource> CounterSource for FallbackCounterSource<P, S> {
    fn page_counters(&self) -> Result<CounterValues, SourceError> {
        if !self.is_latched() {
            match self.primary.page_counters() {
                Ok(values) => return Ok(values),
                Err(e) => {
                    warn!("Primary counter query failed, switching to fallback: {e}");
                    self.use_secondary.store(true, Ordering::Release);
                    // Primary was just tried; only the secondary is left.
                    return self.secondary.page_counters();
                }
            }
        }

        match self.secondary.page_counters() {
            Ok(values) => Ok(values),
            Err(e) => {
                warn!("Fallback counter query failed, retrying primary: {e}");
                let values = self.primary.page_counters()?;
                info!("Primary counter query recovered");
                self.use_secondary.store(false, Ordering::Release);
                Ok(values)
            }
        }
    }
}
