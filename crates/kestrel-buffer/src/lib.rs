//! Buffer pool management for KestrelDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Clock (second-chance) eviction policy
//! - Pin counting to keep in-use pages resident
//! - Dirty page tracking with write-back on eviction, flush, and teardown
//!
//! The pool reads and writes pages through the [`PageFile`] trait, so any
//! page-granular file implementation can sit underneath it.

mod file;
mod frame;
mod page_table;
mod pool;
mod replacer;

pub use file::PageFile;
pub use frame::{BufferFrame, FrameId};
pub use pool::{BufferPool, BufferPoolConfig, BufferPoolStats, PageGuard};
pub use replacer::{Candidate, ClockReplacer, Replacer};
