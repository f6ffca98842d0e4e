//! File interface consumed by the buffer pool.

use kestrel_common::page::{FileId, Page, PageNumber};
use kestrel_common::Result;

/// A page-granular file the buffer pool can cache.
///
/// The pool addresses cached pages by `(file_id, page_no)`, so `file_id`
/// must be stable and unique per open handle for the handle's lifetime.
/// Two handles to the same underlying file carry different ids and are
/// cached independently.
///
/// The pool only ever calls page-level I/O on a handle; it never closes
/// one. Handles are shared as `Arc<dyn PageFile>`, and the pool keeps only
/// weak references internally, so dropping the last caller-held `Arc`
/// while dirty pages are still buffered makes their write-back fail with
/// `FileClosed`.
pub trait PageFile: Send + Sync {
    /// Returns the identity of this handle.
    fn file_id(&self) -> FileId;

    /// Returns a human-readable name for error messages.
    fn filename(&self) -> String;

    /// Reads an existing page.
    fn read_page(&self, page_no: PageNumber) -> Result<Page>;

    /// Writes a page back in place.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Allocates a new page. The returned page carries its own number.
    fn allocate_page(&self) -> Result<Page>;

    /// Removes a page from the file.
    fn delete_page(&self, page_no: PageNumber) -> Result<()>;
}
