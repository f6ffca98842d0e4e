//! Page table mapping buffered page IDs to frame IDs.

use crate::frame::FrameId;
use kestrel_common::page::PageId;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};

/// Sentinel value for empty value slots.
const EMPTY_FRAME: u32 = u32::MAX;

/// Sentinel value for empty key slots.
const EMPTY_KEY: u64 = u64::MAX;

/// Sentinel value for deleted key slots (tombstone).
const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Open-addressing hash table from PageId to FrameId.
///
/// Linear probing with tombstones over atomic key/value slot arrays. The
/// table is sized to twice the frame count (next power of two), so it holds
/// at most half its slots and all operations stay amortized constant time.
///
/// A lookup miss is an `Option::None`, not an error; the pool decides what
/// a miss means per operation.
pub struct PageTable {
    /// Hash table keys (packed 64-bit PageId).
    keys: Box<[AtomicU64]>,
    /// Hash table values (frame ids).
    values: Box<[AtomicU32]>,
    /// Bitmask for table indexing (slot count - 1).
    mask: usize,
}

impl PageTable {
    /// Creates a page table with headroom for `capacity` frames.
    pub fn new(capacity: usize) -> Self {
        // 2x capacity, power of two, so the load factor stays below 50%
        let slots = (capacity * 2).next_power_of_two().max(16);

        let keys: Box<[AtomicU64]> = (0..slots).map(|_| AtomicU64::new(EMPTY_KEY)).collect();
        let values: Box<[AtomicU32]> = (0..slots).map(|_| AtomicU32::new(EMPTY_FRAME)).collect();

        Self {
            keys,
            values,
            mask: slots - 1,
        }
    }

    /// Computes the starting slot for a key.
    #[inline(always)]
    fn slot_of(&self, key: u64) -> usize {
        // FxHash-style multiply for distribution
        let hash = key.wrapping_mul(0x517cc1b727220a95);
        (hash as usize) & self.mask
    }

    /// Looks up a page ID and returns its frame ID if present.
    #[inline]
    pub fn get(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored_key = self.keys[idx].load(Ordering::Acquire);
            if stored_key == EMPTY_KEY {
                return None;
            }
            if stored_key == key {
                let frame_id = self.values[idx].load(Ordering::Acquire);
                return Some(FrameId(frame_id));
            }
            // Skip tombstones and continue probing
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Inserts a page ID to frame ID mapping.
    ///
    /// The key must be absent; inserting a present key replaces its frame,
    /// which only the pool's hit path is allowed to rely on never happening.
    pub fn insert(&self, page_id: PageId, frame_id: FrameId) {
        debug_assert!(self.get(page_id).is_none(), "duplicate page table entry");

        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored_key = self.keys[idx].load(Ordering::Acquire);
            if stored_key == EMPTY_KEY || stored_key == TOMBSTONE_KEY {
                self.values[idx].store(frame_id.0, Ordering::Release);
                self.keys[idx].store(key, Ordering::Release);
                return;
            }
            if stored_key == key {
                self.values[idx].store(frame_id.0, Ordering::Release);
                return;
            }
            idx = (idx + 1) & self.mask;
        }
        // Sized at 2x frame count with at most one entry per frame, so a
        // full probe cycle without a free slot cannot happen.
        unreachable!("page table full");
    }

    /// Removes a page ID mapping. Returns the frame ID if it was present.
    pub fn remove(&self, page_id: PageId) -> Option<FrameId> {
        let key = page_id.as_u64();
        let mut idx = self.slot_of(key);

        for _ in 0..self.keys.len() {
            let stored_key = self.keys[idx].load(Ordering::Acquire);
            if stored_key == EMPTY_KEY {
                return None;
            }
            if stored_key == key {
                let frame_id = self.values[idx].load(Ordering::Acquire);
                self.keys[idx].store(TOMBSTONE_KEY, Ordering::Release);
                return Some(FrameId(frame_id));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Returns true if the page ID is in the table.
    pub fn contains(&self, page_id: PageId) -> bool {
        self.get(page_id).is_some()
    }

    /// Returns the number of entries in the table.
    pub fn len(&self) -> usize {
        self.keys
            .iter()
            .filter(|slot| {
                let val = slot.load(Ordering::Relaxed);
                val != EMPTY_KEY && val != TOMBSTONE_KEY
            })
            .count()
    }

    /// Returns true if the table is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates over all entries, calling the provided function for each.
    /// Returns early if the function returns false.
    pub fn for_each<F>(&self, mut f: F)
    where
        F: FnMut(PageId, FrameId) -> bool,
    {
        for (idx, key_slot) in self.keys.iter().enumerate() {
            let key = key_slot.load(Ordering::Relaxed);
            if key != EMPTY_KEY && key != TOMBSTONE_KEY {
                let frame_id = self.values[idx].load(Ordering::Relaxed);
                if !f(PageId::from_u64(key), FrameId(frame_id)) {
                    return;
                }
            }
        }
    }
}
