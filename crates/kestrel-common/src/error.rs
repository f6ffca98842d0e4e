//! Error types for KestrelDB.

use thiserror::Error;

/// Result type alias using KestrelError.
pub type Result<T> = std::result::Result<T, KestrelError>;

/// Errors that can occur in KestrelDB operations.
#[derive(Debug, Error)]
pub enum KestrelError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // File layer errors
    #[error("page {page_no} not found in file {file}")]
    PageNotFound { file: String, page_no: u32 },

    #[error("file handle {file_id} was closed while its pages were buffered")]
    FileClosed { file_id: u32 },

    // Buffer pool errors
    #[error("buffer pool full: every frame is pinned")]
    BufferPoolFull,

    #[error("page {page_no} of file {file} is not pinned (frame {frame_no})")]
    PageNotPinned {
        file: String,
        page_no: u32,
        frame_no: u32,
    },

    #[error("page {page_no} of file {file} is still pinned (frame {frame_no})")]
    PagePinned {
        file: String,
        page_no: u32,
        frame_no: u32,
    },

    #[error("bad buffer frame {frame_no}: valid={valid}, dirty={dirty}, refbit={ref_bit}")]
    BadBuffer {
        frame_no: u32,
        valid: bool,
        dirty: bool,
        ref_bit: bool,
    },
}
