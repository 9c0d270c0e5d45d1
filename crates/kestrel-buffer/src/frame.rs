//! Buffer frame management.

use kestrel_common::page::{PageKey, PageNo, PAGE_SIZE};
use kestrel_common::DbFile;
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

/// Unique identifier for a frame in the buffer pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameId(pub u32);

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "frame:{}", self.0)
    }
}

/// Descriptor state of a frame.
///
/// `file == None` means the frame is invalid (holds no page). While a
/// frame is valid, the pool's hash index maps its `(file, page_no)` key
/// back to it.
pub(crate) struct FrameMeta {
    /// Owning file of the cached page, None for an invalid frame.
    pub file: Option<Arc<dyn DbFile>>,
    /// Page number within the owning file.
    pub page_no: PageNo,
    /// Number of outstanding pins.
    pub pin_count: u32,
    /// Whether the page has been modified since load.
    pub dirty: bool,
    /// Reference bit for clock replacement.
    pub ref_bit: bool,
}

impl FrameMeta {
    fn cleared() -> Self {
        Self {
            file: None,
            page_no: 0,
            pin_count: 0,
            dirty: false,
            ref_bit: false,
        }
    }

    /// Resets the descriptor to the invalid state.
    pub fn clear(&mut self) {
        *self = Self::cleared();
    }

    /// Marks the descriptor as holding a freshly loaded page, pinned once.
    pub fn set_loaded(&mut self, file: Arc<dyn DbFile>, page_no: PageNo) {
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_count = 1;
        self.dirty = false;
        self.ref_bit = true;
    }

    /// Returns the cache key of the held page, if any.
    pub fn key(&self) -> Option<PageKey> {
        self.file
            .as_ref()
            .map(|f| PageKey::new(f.id(), self.page_no))
    }
}

/// A frame in the buffer pool holding at most one page.
pub struct BufferFrame {
    frame_id: FrameId,
    pub(crate) meta: Mutex<FrameMeta>,
    pub(crate) data: RwLock<Box<[u8; PAGE_SIZE]>>,
}

impl BufferFrame {
    /// Creates a new invalid buffer frame.
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            meta: Mutex::new(FrameMeta::cleared()),
            data: RwLock::new(Box::new([0u8; PAGE_SIZE])),
        }
    }

    /// Returns the frame ID.
    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    /// Returns true if this frame holds a page.
    pub fn is_valid(&self) -> bool {
        self.meta.lock().file.is_some()
    }

    /// Returns the cache key of the held page, if any.
    pub fn page_key(&self) -> Option<PageKey> {
        self.meta.lock().key()
    }

    /// Returns the current pin count.
    pub fn pin_count(&self) -> u32 {
        self.meta.lock().pin_count
    }

    /// Returns true if this frame is pinned.
    pub fn is_pinned(&self) -> bool {
        self.pin_count() > 0
    }

    /// Returns true if this frame holds modified data.
    pub fn is_dirty(&self) -> bool {
        self.meta.lock().dirty
    }

    /// Returns the reference bit value.
    pub fn ref_bit(&self) -> bool {
        self.meta.lock().ref_bit
    }
}

impl std::fmt::Debug for BufferFrame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let meta = self.meta.lock();
        f.debug_struct("BufferFrame")
            .field("frame_id", &self.frame_id)
            .field("page_key", &meta.key())
            .field("pin_count", &meta.pin_count)
            .field("dirty", &meta.dirty)
            .field("ref_bit", &meta.ref_bit)
            .finish()
    }
}
