//! Human-readable byte counts in binary units.

use humansize::{format_size, BINARY};

/// Format a byte count with IEC units (`B`, `KiB`, `MiB`, ...).
pub fn format_bytes(bytes: u64) -> String {
    format_size(bytes, BINARY)
}
