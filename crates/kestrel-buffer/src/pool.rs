//! Buffer pool manager.

use crate::frame::{BufferFrame, FrameId};
use crate::page_table::PageTable;
use crate::replacer::{ClockReplacer, ProbeResult, Replacer};
use kestrel_common::config::BufferPoolConfig;
use kestrel_common::page::{FileId, Page, PageKey, PageNo, PAGE_SIZE};
use kestrel_common::{DbFile, KestrelError, Result};
use parking_lot::{RwLockReadGuard, RwLockWriteGuard};
use std::cell::Cell;
use std::sync::Arc;

/// Buffer pool manager.
///
/// Caches pages of [`DbFile`]s in a fixed array of frames, with a parallel
/// descriptor table, a hash index keyed by `(file, page_no)`, and clock
/// replacement. `BufMgr` is a cheap-clone handle; indexes and scanners hold
/// their own clone.
///
/// Every page handed out is pinned and stays resident until the pin is
/// released, either by dropping the [`PageGuard`] or through
/// [`BufMgr::unpin_page`]. Dropping the pool does not flush; owners flush
/// per file via [`BufMgr::flush_file`] first.
#[derive(Clone)]
pub struct BufMgr {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    frames: Vec<BufferFrame>,
    table: PageTable,
    replacer: ClockReplacer,
}

impl BufMgr {
    /// Creates a new buffer pool.
    pub fn new(config: BufferPoolConfig) -> Self {
        let num_frames = config.num_frames;
        let frames: Vec<_> = (0..num_frames)
            .map(|i| BufferFrame::new(FrameId(i as u32)))
            .collect();

        Self {
            inner: Arc::new(PoolInner {
                frames,
                table: PageTable::new(num_frames),
                replacer: ClockReplacer::new(num_frames),
            }),
        }
    }

    /// Returns the number of frames in the pool.
    pub fn num_frames(&self) -> usize {
        self.inner.frames.len()
    }

    /// Checks if a page is in the buffer pool.
    pub fn contains(&self, file_id: FileId, page_no: PageNo) -> bool {
        self.inner.table.get(PageKey::new(file_id, page_no)).is_some()
    }

    /// Reads a page through the cache, pinned.
    ///
    /// A cached page is re-pinned and its reference bit set; otherwise a
    /// frame is freed by the clock algorithm and the page is read from the
    /// file into it. Fails with `BufferExceeded` if every frame is pinned.
    pub fn read_page(&self, file: &Arc<dyn DbFile>, page_no: PageNo) -> Result<PageGuard> {
        let key = PageKey::new(file.id(), page_no);
        if let Some(frame_id) = self.inner.pin_cached(key) {
            return Ok(PageGuard::new(self.inner.clone(), frame_id, key));
        }

        let frame_id = self.inner.free_frame()?;
        let page = file.read_page(page_no)?;
        self.inner.install(frame_id, file, page_no, page.data());
        Ok(PageGuard::new(self.inner.clone(), frame_id, key))
    }

    /// Allocates a new page in the file and pins it, dirty-tracked.
    ///
    /// The returned guard carries the new page number. Fails with
    /// `BufferExceeded` if no frame can be freed.
    pub fn alloc_page(&self, file: &Arc<dyn DbFile>) -> Result<PageGuard> {
        let page = file.allocate_page()?;
        let frame_id = self.inner.free_frame()?;
        self.inner.install(frame_id, file, page.page_no(), page.data());
        let key = PageKey::new(file.id(), page.page_no());
        Ok(PageGuard::new(self.inner.clone(), frame_id, key))
    }

    /// Releases one pin on a page.
    ///
    /// Releasing a page that is not cached is a no-op. Fails with
    /// `PageNotPinned` when the pin count is already zero. The dirty bit is
    /// sticky: once set it is only cleared by eviction or flush.
    pub fn unpin_page(&self, file_id: FileId, page_no: PageNo, dirty: bool) -> Result<()> {
        let key = PageKey::new(file_id, page_no);
        let Some(frame_id) = self.inner.table.get(key) else {
            return Ok(());
        };
        let frame = &self.inner.frames[frame_id.0 as usize];
        let mut meta = frame.meta.lock();
        if meta.pin_count == 0 {
            return Err(KestrelError::PageNotPinned { page_no });
        }
        meta.pin_count -= 1;
        if dirty {
            meta.dirty = true;
        }
        Ok(())
    }

    /// Destroys a page: evicts it from the cache and deletes it from the
    /// file.
    ///
    /// The descriptor and hash entry are cleared unconditionally; callers
    /// must not hold pins to pages they dispose. A cache miss is not an
    /// error.
    pub fn dispose_page(&self, file: &Arc<dyn DbFile>, page_no: PageNo) -> Result<()> {
        let key = PageKey::new(file.id(), page_no);
        if let Some(frame_id) = self.inner.table.remove(key) {
            self.inner.frames[frame_id.0 as usize].meta.lock().clear();
        }
        file.delete_page(page_no)
    }

    /// Flushes every cached page of a file and drops it from the cache.
    ///
    /// Fails with `PagePinned` if any page of the file is still pinned, and
    /// with `BadBuffer` if a frame of the file disagrees with the hash
    /// index. Flushing a file with nothing cached is a no-op, so a second
    /// flush after a successful one does nothing.
    pub fn flush_file(&self, file_id: FileId) -> Result<()> {
        for frame in &self.inner.frames {
            let mut meta = frame.meta.lock();
            let Some(file) = meta.file.clone() else {
                continue;
            };
            if file.id() != file_id {
                continue;
            }
            if meta.pin_count > 0 {
                return Err(KestrelError::PagePinned {
                    page_no: meta.page_no,
                });
            }
            let key = PageKey::new(file_id, meta.page_no);
            if self.inner.table.get(key) != Some(frame.frame_id()) {
                return Err(KestrelError::BadBuffer {
                    frame_no: frame.frame_id().0,
                });
            }
            if meta.dirty {
                let mut page = Page::new(meta.page_no);
                page.data_mut().copy_from_slice(&frame.data.read()[..]);
                file.write_page(&page)?;
            }
            self.inner.table.remove(key);
            meta.clear();
        }
        Ok(())
    }

    /// Returns a snapshot of the pool's frame states.
    pub fn stats(&self) -> BufMgrStats {
        let mut valid = 0;
        let mut pinned = 0;
        let mut dirty = 0;
        for frame in &self.inner.frames {
            let meta = frame.meta.lock();
            if meta.file.is_some() {
                valid += 1;
                if meta.pin_count > 0 {
                    pinned += 1;
                }
                if meta.dirty {
                    dirty += 1;
                }
            }
        }
        BufMgrStats {
            total_frames: self.inner.frames.len(),
            valid_frames: valid,
            pinned_frames: pinned,
            dirty_frames: dirty,
        }
    }
}

impl PoolInner {
    /// Re-pins an already cached page, setting its reference bit.
    fn pin_cached(&self, key: PageKey) -> Option<FrameId> {
        let frame_id = self.table.get(key)?;
        let frame = &self.frames[frame_id.0 as usize];
        let mut meta = frame.meta.lock();
        meta.ref_bit = true;
        meta.pin_count += 1;
        Some(frame_id)
    }

    /// Frees a frame via the clock algorithm, writing back a dirty victim.
    ///
    /// The chosen frame is returned cleared; the caller fills the
    /// descriptor.
    fn free_frame(&self) -> Result<FrameId> {
        let frame_id = self.replacer.pick_victim(&mut |frame_id| {
            let mut meta = self.frames[frame_id.0 as usize].meta.lock();
            if meta.file.is_none() {
                ProbeResult::Free
            } else if meta.ref_bit {
                meta.ref_bit = false;
                ProbeResult::Referenced
            } else if meta.pin_count > 0 {
                ProbeResult::Pinned
            } else {
                ProbeResult::Evictable
            }
        })?;

        let frame = &self.frames[frame_id.0 as usize];
        let mut meta = frame.meta.lock();
        if let Some(file) = meta.file.take() {
            self.table.remove(PageKey::new(file.id(), meta.page_no));
            if meta.dirty {
                let mut page = Page::new(meta.page_no);
                page.data_mut().copy_from_slice(&frame.data.read()[..]);
                file.write_page(&page)?;
            }
        }
        meta.clear();
        Ok(frame_id)
    }

    /// Loads page data into a freed frame and registers it, pinned once.
    fn install(
        &self,
        frame_id: FrameId,
        file: &Arc<dyn DbFile>,
        page_no: PageNo,
        data: &[u8; PAGE_SIZE],
    ) {
        let frame = &self.frames[frame_id.0 as usize];
        frame.data.write().copy_from_slice(data);
        frame.meta.lock().set_loaded(file.clone(), page_no);
        self.table.insert(PageKey::new(file.id(), page_no), frame_id);
    }

    /// Releases the pin held by a guard.
    ///
    /// If the frame no longer holds the guard's page (it was disposed
    /// while the guard was alive), the release is a no-op.
    fn unpin_guard(&self, frame_id: FrameId, key: PageKey, dirty: bool) {
        let frame = &self.frames[frame_id.0 as usize];
        let mut meta = frame.meta.lock();
        if meta.key() != Some(key) {
            return;
        }
        if meta.pin_count > 0 {
            meta.pin_count -= 1;
        }
        if dirty {
            meta.dirty = true;
        }
    }
}

/// Statistics about the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufMgrStats {
    /// Total number of frames.
    pub total_frames: usize,
    /// Number of frames holding a page.
    pub valid_frames: usize,
    /// Number of pinned frames.
    pub pinned_frames: usize,
    /// Number of dirty frames.
    pub dirty_frames: usize,
}

/// A pinned page.
///
/// Holds one pin on a frame for its lifetime and releases it on drop.
/// Reading goes through [`PageGuard::data`]; any call to
/// [`PageGuard::data_mut`] marks the guard dirty, so the drop-time release
/// carries the dirty bit to the descriptor.
pub struct PageGuard {
    pool: Arc<PoolInner>,
    frame_id: FrameId,
    key: PageKey,
    dirty: Cell<bool>,
}

impl PageGuard {
    fn new(pool: Arc<PoolInner>, frame_id: FrameId, key: PageKey) -> Self {
        Self {
            pool,
            frame_id,
            key,
            dirty: Cell::new(false),
        }
    }

    /// Returns the page number of the pinned page.
    pub fn page_no(&self) -> PageNo {
        self.key.page_no
    }

    /// Returns the file the pinned page belongs to.
    pub fn file_id(&self) -> FileId {
        self.key.file_id
    }

    /// Returns read access to the page bytes.
    pub fn data(&self) -> RwLockReadGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.pool.frames[self.frame_id.0 as usize].data.read()
    }

    /// Returns write access to the page bytes and marks the guard dirty.
    pub fn data_mut(&self) -> RwLockWriteGuard<'_, Box<[u8; PAGE_SIZE]>> {
        self.dirty.set(true);
        self.pool.frames[self.frame_id.0 as usize].data.write()
    }

    /// Marks the guard dirty without writing.
    pub fn mark_dirty(&self) {
        self.dirty.set(true);
    }
}

impl Drop for PageGuard {
    fn drop(&mut self) {
        self.pool.unpin_guard(self.frame_id, self.key, self.dirty.get());
    }
}

impl std::fmt::Debug for PageGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageGuard")
            .field("page", &self.key)
            .field("frame_id", &self.frame_id)
            .field("dirty", &self.dirty.get())
            .finish()
    }
}
