//! Buffer pool manager.

use crate::file::PageFile;
use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{Candidate, ClockReplacer, Replacer};
use kestrel_common::page::{FileId, Page, PageId, PageNumber, PAGE_SIZE};
use kestrel_common::{KestrelError, Result, StorageConfig};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use sysinfo::System;
use tracing::{debug, warn};

/// Configuration for the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

impl From<&StorageConfig> for BufferPoolConfig {
    fn from(config: &StorageConfig) -> Self {
        Self {
            num_frames: config.buffer_pool_frames,
        }
    }
}

/// Buffer pool manager.
///
/// Owns a fixed array of page frames and decides which on-disk page
/// occupies which frame:
/// - Page ID to frame ID mapping ([`PageTable`])
/// - Clock replacement for eviction ([`ClockReplacer`])
/// - Pin counting to keep borrowed pages resident
/// - Write-back of dirty pages on eviction, flush, and teardown
///
/// All page I/O goes through the [`PageFile`] handles passed to each
/// operation; the pool keeps only weak references to files and never
/// closes them.
pub struct BufferPool {
    /// Configuration.
    config: BufferPoolConfig,
    /// Array of buffer frames.
    frames: Vec<BufferFrame>,
    /// Page ID to frame ID mapping.
    page_table: PageTable,
    /// Page replacement policy.
    replacer: ClockReplacer,
    /// Files with resident pages, for write-back when the triggering
    /// operation was issued against a different file.
    files: Mutex<HashMap<FileId, Weak<dyn PageFile>>>,
}

impl BufferPool {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;

        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        Self {
            config,
            frames,
            page_table: PageTable::new(num_frames),
            replacer: ClockReplacer::new(num_frames),
            files: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a buffer pool sized to 25% of available system RAM.
    ///
    /// Queries the system for available memory and allocates 25% of it
    /// for the buffer pool. Minimum 1,000 frames to ensure useful caching
    /// even on low-memory systems.
    pub fn auto_sized() -> Self {
        let mut sys = System::new_all();
        sys.refresh_memory();

        let available_bytes = sys.available_memory() as usize;
        let target_bytes = available_bytes / 4; // 25% of available RAM
        let num_frames = (target_bytes / PAGE_SIZE).max(1_000);

        Self::new(BufferPoolConfig { num_frames })
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.config.num_frames
    }

    /// Returns the number of pages currently in the pool.
    pub fn page_count(&self) -> usize {
        self.page_table.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, file: &Arc<dyn PageFile>, page_no: PageNumber) -> bool {
        self.page_table
            .contains(PageId::new(file.file_id(), page_no))
    }

    /// Iterates over the pool's frames, for diagnostics.
    pub fn frames(&self) -> impl Iterator<Item = &BufferFrame> {
        self.frames.iter()
    }

    #[inline]
    fn frame(&self, frame_id: FrameId) -> &BufferFrame {
        &self.frames[frame_id.0 as usize]
    }

    /// Remembers a file handle so evictions triggered through other files
    /// can still write its dirty pages back.
    fn register_file(&self, file: &Arc<dyn PageFile>) {
        let mut files = self.files.lock();
        files.retain(|_, handle| handle.strong_count() > 0);
        files.insert(file.file_id(), Arc::downgrade(file));
    }

    fn lookup_file(&self, file_id: FileId) -> Result<Arc<dyn PageFile>> {
        self.files
            .lock()
            .get(&file_id)
            .and_then(Weak::upgrade)
            .ok_or(KestrelError::FileClosed { file_id })
    }

    /// Writes the frame's payload back to its file.
    fn write_frame(&self, file: &dyn PageFile, page_id: PageId, frame: &BufferFrame) -> Result<()> {
        let mut page = Page::new(page_id.page_no);
        frame.copy_to(page.data_mut());
        file.write_page(&page)
    }

    /// Reclaims a frame for a new page.
    ///
    /// Runs the clock policy, writes the victim back if dirty, removes its
    /// page table entry, and resets its descriptor. The returned frame is
    /// empty. Fails with `BufferPoolFull` when every frame stayed pinned
    /// for an entire sweep.
    fn evict_frame(&self) -> Result<FrameId> {
        let victim = self.replacer.select_victim(&mut |frame_id| {
            let frame = self.frame(frame_id);
            if !frame.is_valid() {
                Candidate::Empty
            } else if frame.ref_bit() {
                frame.set_ref_bit(false);
                Candidate::Referenced
            } else if frame.is_pinned() {
                Candidate::Pinned
            } else {
                Candidate::Evictable
            }
        })?;

        let frame = self.frame(victim);
        if let Some(page_id) = frame.page_id() {
            if frame.is_dirty() {
                let file = self.lookup_file(page_id.file_id)?;
                self.write_frame(file.as_ref(), page_id, frame)?;
                debug!(%page_id, frame = victim.0, "wrote back dirty page on eviction");
            }
            self.page_table.remove(page_id);
            frame.reset();
        }
        Ok(victim)
    }

    /// Reads a page through the pool, loading it from `file` on a miss.
    ///
    /// The returned frame is pinned; the borrow stays stable until the
    /// matching [`unpin_page`](Self::unpin_page). On a miss the victim
    /// frame's previous occupant is written back first if dirty.
    pub fn read_page(
        &self,
        file: &Arc<dyn PageFile>,
        page_no: PageNumber,
    ) -> Result<&BufferFrame> {
        let page_id = PageId::new(file.file_id(), page_no);

        if let Some(frame_id) = self.page_table.get(page_id) {
            let frame = self.frame(frame_id);
            frame.pin();
            return Ok(frame);
        }

        let frame_id = self.evict_frame()?;
        // If the read fails the reclaimed frame just stays empty.
        let page = file.read_page(page_no)?;

        let frame = self.frame(frame_id);
        frame.copy_from(page.data());
        frame.install(page_id);
        self.page_table.insert(page_id, frame_id);
        self.register_file(file);
        Ok(frame)
    }

    /// Allocates a new page in `file` and pins it in the pool.
    ///
    /// The frame is reclaimed before the file is asked to allocate, so an
    /// exhausted pool does not leak disk pages.
    pub fn alloc_page(
        &self,
        file: &Arc<dyn PageFile>,
    ) -> Result<(PageNumber, &BufferFrame)> {
        let frame_id = self.evict_frame()?;
        let page = file.allocate_page()?;
        let page_no = page.page_number();
        let page_id = PageId::new(file.file_id(), page_no);

        let frame = self.frame(frame_id);
        frame.copy_from(page.data());
        frame.install(page_id);
        self.page_table.insert(page_id, frame_id);
        self.register_file(file);
        Ok((page_no, frame))
    }

    /// Releases one pin on a page, optionally marking it dirty.
    ///
    /// A page that is not resident is a silent no-op: it may legitimately
    /// have been evicted or disposed already. Unpinning a resident page
    /// whose pin count is zero fails with `PageNotPinned`.
    pub fn unpin_page(
        &self,
        file: &Arc<dyn PageFile>,
        page_no: PageNumber,
        mark_dirty: bool,
    ) -> Result<()> {
        let page_id = PageId::new(file.file_id(), page_no);
        let Some(frame_id) = self.page_table.get(page_id) else {
            return Ok(());
        };

        let frame = self.frame(frame_id);
        if frame.pin_count() == 0 {
            return Err(KestrelError::PageNotPinned {
                file: file.filename(),
                page_no,
                frame_no: frame_id.0,
            });
        }
        if mark_dirty {
            frame.set_dirty(true);
        }
        frame.unpin();
        Ok(())
    }

    /// Writes back and detaches every resident page of `file`.
    ///
    /// Frames are processed in ascending frame order: dirty pages are
    /// written back, then each entry is removed from the page table and
    /// its descriptor reset. The first pinned frame aborts with
    /// `PagePinned`; an index entry naming an invalid or mismatched frame
    /// aborts with `BadBuffer`. Frames processed before a failure stay
    /// flushed, the rest are untouched.
    pub fn flush_file(&self, file: &Arc<dyn PageFile>) -> Result<()> {
        let file_id = file.file_id();

        let mut entries = Vec::new();
        self.page_table.for_each(|page_id, frame_id| {
            if page_id.file_id == file_id {
                entries.push((page_id, frame_id));
            }
            true
        });
        entries.sort_by_key(|(_, frame_id)| frame_id.0);

        for (page_id, frame_id) in entries {
            let frame = self.frame(frame_id);
            if frame.page_id() != Some(page_id) {
                return Err(KestrelError::BadBuffer {
                    frame_no: frame_id.0,
                    valid: frame.is_valid(),
                    dirty: frame.is_dirty(),
                    ref_bit: frame.ref_bit(),
                });
            }
            if frame.is_pinned() {
                return Err(KestrelError::PagePinned {
                    file: file.filename(),
                    page_no: page_id.page_no,
                    frame_no: frame_id.0,
                });
            }
            if frame.is_dirty() {
                self.write_frame(file.as_ref(), page_id, frame)?;
                frame.set_dirty(false);
            }
            self.page_table.remove(page_id);
            frame.reset();
        }
        Ok(())
    }

    /// Drops a page from the pool without write-back and deletes it from
    /// the file.
    ///
    /// A page that is not resident is a silent no-op; the file layer is
    /// not called for it. Disposing a pinned page fails with `PagePinned`
    /// since a live borrow would be invalidated.
    pub fn dispose_page(&self, file: &Arc<dyn PageFile>, page_no: PageNumber) -> Result<()> {
        let page_id = PageId::new(file.file_id(), page_no);
        let Some(frame_id) = self.page_table.get(page_id) else {
            return Ok(());
        };

        let frame = self.frame(frame_id);
        if frame.is_pinned() {
            return Err(KestrelError::PagePinned {
                file: file.filename(),
                page_no,
                frame_no: frame_id.0,
            });
        }

        self.page_table.remove(page_id);
        frame.reset();
        file.delete_page(page_no)
    }

    /// Pins a page and returns a guard that unpins it on drop.
    ///
    /// Taking a mutable view of the payload marks the guard dirty, and
    /// the dirtiness is reported to the pool when the guard drops.
    pub fn pin_page<'a>(
        &'a self,
        file: &Arc<dyn PageFile>,
        page_no: PageNumber,
    ) -> Result<PageGuard<'a>> {
        let frame = self.read_page(file, page_no)?;
        Ok(PageGuard {
            pool: self,
            file: Arc::clone(file),
            page_no,
            frame,
            dirty: false,
        })
    }

    /// Writes a diagnostic dump of the pool: one line per frame plus a
    /// valid-frame count.
    pub fn dump<W: std::io::Write>(&self, out: &mut W) -> std::io::Result<()> {
        let mut valid_frames = 0;
        for frame in &self.frames {
            match frame.page_id() {
                Some(page_id) => {
                    valid_frames += 1;
                    writeln!(
                        out,
                        "{} page={} pin={} dirty={} ref={}",
                        frame.frame_id(),
                        page_id,
                        frame.pin_count(),
                        frame.is_dirty(),
                        frame.ref_bit(),
                    )?;
                }
                None => writeln!(out, "{} empty", frame.frame_id())?,
            }
        }
        writeln!(out, "valid frames: {}/{}", valid_frames, self.frames.len())
    }

    /// Returns statistics about the buffer pool.
    pub fn stats(&self) -> BufferPoolStats {
        let mut valid_frames = 0;
        let mut pinned_frames = 0;
        let mut dirty_frames = 0;

        for frame in &self.frames {
            if frame.is_valid() {
                valid_frames += 1;
                if frame.is_pinned() {
                    pinned_frames += 1;
                }
                if frame.is_dirty() {
                    dirty_frames += 1;
                }
            }
        }

        BufferPoolStats {
            total_frames: self.config.num_frames,
            valid_frames,
            pinned_frames,
            dirty_frames,
        }
    }
}

impl Drop for BufferPool {
    /// Teardown writes back every valid dirty frame exactly once.
    ///
    /// Pinned frames at this point are a caller error; they are flushed
    /// anyway rather than leaking dirty pages, and a warning is logged.
    /// Storage release is left to normal ownership after this pass.
    fn drop(&mut self) {
        for frame in &self.frames {
            let Some(page_id) = frame.page_id() else {
                continue;
            };
            if frame.is_pinned() {
                warn!(
                    %page_id,
                    frame = frame.frame_id().0,
                    pins = frame.pin_count(),
                    "page still pinned at pool teardown"
                );
            }
            if frame.is_dirty() {
                let written = self
                    .lookup_file(page_id.file_id)
                    .and_then(|file| self.write_frame(file.as_ref(), page_id, frame));
                if let Err(error) = written {
                    warn!(%page_id, %error, "failed to write back dirty page at pool teardown");
                }
            }
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone)]
pub struct BufferPoolStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of frames holding a page.
    pub valid_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// RAII guard for a pinned page.
pub struct PageGuard<'a> {
    pool: &'a BufferPool,
    file: Arc<dyn PageFile>,
    page_no: PageNumber,
    frame: &'a BufferFrame,
    dirty: bool,
}

impl PageGuard<'_> {
    /// Returns the page number.
    pub fn page_no(&self) -> PageNumber {
        self.page_no
    }

    /// Returns the page payload.
    pub fn data(&self) -> parking_lot::RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.frame.read_data()
    }

    /// Returns mutable access to the page payload and marks the guard
    /// dirty.
    pub fn data_mut(&mut self) -> parking_lot::RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty = true;
        self.frame.write_data()
    }
}

impl Drop for PageGuard<'_> {
    fn drop(&mut self) {
        // The guard holds the pin it releases, so the only possible
        // failure is a caller having unpinned manually behind our back.
        let _ = self.pool.unpin_page(&self.file, self.page_no, self.dirty);
    }
}
