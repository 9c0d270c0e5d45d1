//! Flat page files.

use kestrel_common::config::BlobFileConfig;
use kestrel_common::file::next_file_id;
use kestrel_common::page::{FileId, Page, PageNo, PAGE_SIZE};
use kestrel_common::{DbFile, KestrelError, Result};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Magic bytes identifying a blob file, stored in the header slot.
const MAGIC: &[u8; 8] = b"KSTRLBF1";

/// A file of `PAGE_SIZE` pages.
///
/// Slot 0 holds a small file header; data pages are numbered from 1, which
/// keeps page number 0 free as the "no page" sentinel used by index node
/// layouts. Deleted pages are zeroed on disk and recycled through an
/// in-memory free list; the free list is not persisted across reopen.
pub struct BlobFile {
    id: FileId,
    path: PathBuf,
    config: BlobFileConfig,
    inner: Mutex<BlobInner>,
}

struct BlobInner {
    file: File,
    /// Number of slots in the file, header slot included.
    num_slots: u32,
    free_pages: Vec<PageNo>,
}

impl BlobFile {
    /// Creates a new blob file, truncating any existing file at the path.
    pub fn create(path: &Path, config: BlobFileConfig) -> Result<BlobFile> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let mut header = [0u8; PAGE_SIZE];
        header[..MAGIC.len()].copy_from_slice(MAGIC);
        file.write_all(&header)?;
        if config.fsync_enabled {
            file.sync_all()?;
        }

        Ok(BlobFile {
            id: next_file_id(),
            path: path.to_path_buf(),
            config,
            inner: Mutex::new(BlobInner {
                file,
                num_slots: 1,
                free_pages: Vec::new(),
            }),
        })
    }

    /// Opens an existing blob file.
    pub fn open(path: &Path, config: BlobFileConfig) -> Result<BlobFile> {
        let mut file = OpenOptions::new().read(true).write(true).open(path)?;

        let len = file.metadata()?.len();
        if len < PAGE_SIZE as u64 || len % PAGE_SIZE as u64 != 0 {
            return Err(KestrelError::PageCorrupted {
                page_no: 0,
                reason: format!("file length {} is not a whole number of pages", len),
            });
        }

        let mut magic = [0u8; 8];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(KestrelError::PageCorrupted {
                page_no: 0,
                reason: "bad file magic".to_string(),
            });
        }

        Ok(BlobFile {
            id: next_file_id(),
            path: path.to_path_buf(),
            config,
            inner: Mutex::new(BlobInner {
                file,
                num_slots: (len / PAGE_SIZE as u64) as u32,
                free_pages: Vec::new(),
            }),
        })
    }

    /// Returns the path of the file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the highest page number; pages are numbered `1..=page_count()`.
    pub fn page_count(&self) -> u32 {
        self.inner.lock().num_slots - 1
    }

    fn check_bounds(&self, inner: &BlobInner, page_no: PageNo) -> Result<()> {
        if page_no == 0 || page_no >= inner.num_slots {
            return Err(KestrelError::PageNotFound {
                file_id: self.id.0,
                page_no,
            });
        }
        Ok(())
    }

    fn write_slot(&self, inner: &mut BlobInner, page_no: PageNo, data: &[u8; PAGE_SIZE]) -> Result<()> {
        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        inner.file.write_all(data)?;
        if self.config.fsync_enabled {
            inner.file.sync_all()?;
        }
        Ok(())
    }
}

impl DbFile for BlobFile {
    fn id(&self) -> FileId {
        self.id
    }

    fn allocate_page(&self) -> Result<Page> {
        let mut inner = self.inner.lock();
        if let Some(page_no) = inner.free_pages.pop() {
            // Recycled pages were zeroed on delete.
            return Ok(Page::new(page_no));
        }
        let page_no = inner.num_slots;
        self.write_slot(&mut inner, page_no, &[0u8; PAGE_SIZE])?;
        inner.num_slots = page_no + 1;
        Ok(Page::new(page_no))
    }

    fn read_page(&self, page_no: PageNo) -> Result<Page> {
        let mut inner = self.inner.lock();
        self.check_bounds(&inner, page_no)?;

        let offset = (page_no as u64) * (PAGE_SIZE as u64);
        inner.file.seek(SeekFrom::Start(offset))?;
        let mut page = Page::new(page_no);
        inner.file.read_exact(page.data_mut())?;
        Ok(page)
    }

    fn write_page(&self, page: &Page) -> Result<()> {
        let mut inner = self.inner.lock();
        self.check_bounds(&inner, page.page_no())?;
        self.write_slot(&mut inner, page.page_no(), page.data())
    }

    fn delete_page(&self, page_no: PageNo) -> Result<()> {
        let mut inner = self.inner.lock();
        self.check_bounds(&inner, page_no)?;
        if inner.free_pages.contains(&page_no) {
            return Ok(());
        }
        self.write_slot(&mut inner, page_no, &[0u8; PAGE_SIZE])?;
        inner.free_pages.push(page_no);
        Ok(())
    }
}
