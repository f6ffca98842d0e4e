//! Disk-backed page file.

use kestrel_buffer::PageFile;
use kestrel_common::page::{FileId, Page, PageNumber, PAGE_SIZE};
use kestrel_common::{KestrelError, Result, StorageConfig};
use parking_lot::Mutex;
use std::collections::BTreeSet;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};

/// Source of handle identities. Every open gets a fresh id, so two
/// handles to the same path are distinct for caching purposes.
static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(1);

/// Open options for a [`DbFile`].
#[derive(Debug, Clone)]
pub struct DbFileOptions {
    /// Enable fsync after writes.
    pub fsync: bool,
}

impl Default for DbFileOptions {
    fn default() -> Self {
        Self { fsync: true }
    }
}

impl From<&StorageConfig> for DbFileOptions {
    fn from(config: &StorageConfig) -> Self {
        Self {
            fsync: config.fsync_enabled,
        }
    }
}

/// One on-disk file of fixed-size pages.
///
/// Pages live at `page_no * PAGE_SIZE`; the page count derives from the
/// file length. Deleted page numbers are tracked per handle and handed
/// out again by [`allocate_page`](PageFile::allocate_page) before the
/// file is extended.
pub struct DbFile {
    /// Handle identity.
    file_id: FileId,
    /// Path to the file.
    path: PathBuf,
    /// Enable fsync after writes.
    fsync: bool,
    /// Open file state.
    inner: Mutex<FileInner>,
}

struct FileInner {
    /// The file handle.
    file: File,
    /// Number of pages in the file.
    num_pages: u32,
    /// Deleted page numbers available for reuse.
    free_pages: BTreeSet<PageNumber>,
}

impl DbFile {
    /// Opens or creates a page file with default options.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, DbFileOptions::default())
    }

    /// Opens or creates a page file.
    pub fn open_with(path: impl AsRef<Path>, options: DbFileOptions) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let file_size = file.metadata()?.len();
        let num_pages = (file_size / PAGE_SIZE as u64) as u32;

        Ok(Self {
            file_id: NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed),
            path,
            fsync: options.fsync,
            inner: Mutex::new(FileInner {
                file,
                num_pages,
                free_pages: BTreeSet::new(),
            }),
        })
    }

    /// Returns the path of the underlying file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of pages in the file, deleted ones included.
    pub fn num_pages(&self) -> u32 {
        self.inner.lock().num_pages
    }

    fn not_found(&self, page_no: PageNumber) -> KestrelError {
        KestrelError::PageNotFound {
            file: self.filename(),
            page_no,
        }
    }

    /// Checks that `page_no` names a live page.
    fn check_page(&self, inner: &FileInner, page_no: PageNumber) -> Result<()> {
        if page_no >= inner.num_pages || inner.free_pages.contains(&page_no) {
            return Err(self.not_found(page_no));
        }
        Ok(())
    }

    fn write_at(&self, inner: &mut FileInner, page_no: PageNumber, data: &[u8]) -> Result<()> {
        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;
        if self.fsync {
            inner.file.sync_all()?;
        }
        Ok(())
    }
}

impl PageFile for DbFile {
    fn file_id(&self) -> FileId {
        self.file_id
    }

    fn filename(&self) -> String {
        self.path.display().to_string()
    }

    fn read_page(&self, page_no: PageNumber) -> Result<Page> {
        let mut inner = self.inner.lock();
        self.check_page(&inner, page_no)?;

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;

        let mut data = Box::new([0u8; PAGE_SIZE]);
        inner.file.read_exact(&mut data[..])?;

        Ok(Page::from_data(page_no, data))
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let page_no = page.page_number();
        let mut inner = self.inner.lock();
        self.check_page(&inner, page_no)?;
        self.write_at(&mut inner, page_no, page.data())
    }

    fn allocate_page(&self) -> Result<Page> {
        let mut inner = self.inner.lock();

        // Reuse the lowest freed page before extending the file. Deleted
        // pages were zeroed on disk, so the slot is already blank.
        if let Some(page_no) = inner.free_pages.pop_first() {
            return Ok(Page::new(page_no));
        }

        let page_no = inner.num_pages;
        self.write_at(&mut inner, page_no, &[0u8; PAGE_SIZE])?;
        inner.num_pages = page_no + 1;

        Ok(Page::new(page_no))
    }

    fn delete_page(&self, page_no: PageNumber) -> Result<()> {
        let mut inner = self.inner.lock();
        self.check_page(&inner, page_no)?;

        self.write_at(&mut inner, page_no, &[0u8; PAGE_SIZE])?;
        inner.free_pages.insert(page_no);
        Ok(())
    }
}

impl std::fmt::Debug for DbFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbFile")
            .field("file_id", &self.file_id)
            .field("path", &self.path)
            .field("num_pages", &self.num_pages())
            .finish()
    }
}
