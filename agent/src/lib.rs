//! Swapstat agent library.
//!
//! Computes swap usage, swap capacity and page-in/page-out figures for the
//! current host by reconciling a commit-accounting snapshot, a page-counter
//! store and a paging-file usage ratio. See [`vmem::VirtualMemory`].
//!
//! ```rust,ignore
//! use swapstat_agent::{platform, vmem::VirtualMemory};
//!
//! let vm = VirtualMemory::new(platform::native_sources());
//! println!("{}", vm.snapshot());
//! ```

pub mod collectors;
pub mod config;
pub mod platform;
pub mod vmem;
