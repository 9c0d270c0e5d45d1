//! The page-file interface consumed by the buffer pool.

use crate::error::Result;
use crate::page::{FileId, Page, PageNo};
use std::sync::atomic::{AtomicU32, Ordering};

/// A file of fixed-size pages.
///
/// The buffer pool reads, writes, allocates, and deletes pages through this
/// trait and never touches storage directly. Implementations must preserve
/// page content bit-for-bit across write/read cycles, and must hand out a
/// process-unique [`FileId`] for the lifetime of the handle: the buffer
/// pool keys its cache on `(file id, page number)`.
///
/// Page number 0 is reserved and never returned by `allocate_page`.
pub trait DbFile: Send + Sync {
    /// Returns the identity of this file handle.
    fn id(&self) -> FileId;

    /// Allocates a new zeroed page and returns it, carrying its number.
    fn allocate_page(&self) -> Result<Page>;

    /// Reads an existing page.
    fn read_page(&self, page_no: PageNo) -> Result<Page>;

    /// Writes a page back, addressed by the number the page carries.
    fn write_page(&self, page: &Page) -> Result<()>;

    /// Deletes a page, making its number available for reuse.
    fn delete_page(&self, page_no: PageNo) -> Result<()>;
}

static NEXT_FILE_ID: AtomicU32 = AtomicU32::new(1);

/// Hands out the next process-unique file id.
///
/// [`DbFile`] implementations call this once when a handle is opened.
pub fn next_file_id() -> FileId {
    FileId(NEXT_FILE_ID.fetch_add(1, Ordering::Relaxed))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_file_id_is_unique() {
        let a = next_file_id();
        let b = next_file_id();
        assert_ne!(a, b);
    }
}
