//! Disk-backed page files for KestrelDB.
//!
//! [`DbFile`] stores fixed-size pages in a single on-disk file and
//! implements the [`kestrel_buffer::PageFile`] interface, so it can sit
//! under the buffer pool.

mod file;

pub use file::{DbFile, DbFileOptions};
