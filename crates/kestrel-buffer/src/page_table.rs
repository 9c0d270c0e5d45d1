//! Hash index mapping cached pages to frames.

use crate::frame::FrameId;
use kestrel_common::page::PageKey;
use parking_lot::Mutex;

/// Sentinel for empty key slots.
const EMPTY_KEY: u64 = u64::MAX;

/// Sentinel for deleted key slots (tombstone).
const TOMBSTONE_KEY: u64 = u64::MAX - 1;

/// Sentinel for empty value slots.
const EMPTY_FRAME: u32 = u32::MAX;

/// Open-addressing hash index from `(file, page_no)` to frame ID.
///
/// Keys are unique. A lookup miss is an `Option::None`, not an error;
/// cache misses are ordinary control flow for the buffer pool.
pub(crate) struct PageTable {
    inner: Mutex<TableInner>,
    mask: usize,
}

struct TableInner {
    keys: Vec<u64>,
    frames: Vec<u32>,
}

impl PageTable {
    /// Creates a table sized for `capacity` frames.
    ///
    /// Bucket count is roughly 1.2x the frame count, rounded up to a power
    /// of two for mask indexing. The table can always hold one entry per
    /// frame with room to probe.
    pub fn new(capacity: usize) -> Self {
        let buckets = (capacity * 6 / 5 + 1).next_power_of_two();
        Self {
            inner: Mutex::new(TableInner {
                keys: vec![EMPTY_KEY; buckets],
                frames: vec![EMPTY_FRAME; buckets],
            }),
            mask: buckets - 1,
        }
    }

    /// Computes the starting bucket for a key.
    #[inline]
    fn bucket(&self, key: u64) -> usize {
        // FxHash-style multiply for distribution
        let hash = key.wrapping_mul(0x517cc1b727220a95);
        (hash as usize) & self.mask
    }

    /// Looks up a page and returns its frame ID if cached.
    pub fn get(&self, key: PageKey) -> Option<FrameId> {
        let key = key.as_u64();
        let inner = self.inner.lock();
        let mut idx = self.bucket(key);

        for _ in 0..inner.keys.len() {
            let stored = inner.keys[idx];
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                return Some(FrameId(inner.frames[idx]));
            }
            // Skip tombstones and continue probing
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Inserts a page-to-frame mapping. Returns false if the table is full.
    pub fn insert(&self, key: PageKey, frame_id: FrameId) -> bool {
        let key = key.as_u64();
        let mut inner = self.inner.lock();
        let mut idx = self.bucket(key);

        for _ in 0..inner.keys.len() {
            let stored = inner.keys[idx];
            if stored == EMPTY_KEY || stored == TOMBSTONE_KEY {
                inner.keys[idx] = key;
                inner.frames[idx] = frame_id.0;
                return true;
            }
            if stored == key {
                inner.frames[idx] = frame_id.0;
                return true;
            }
            idx = (idx + 1) & self.mask;
        }
        false
    }

    /// Removes a mapping. Returns the frame ID if it was present.
    pub fn remove(&self, key: PageKey) -> Option<FrameId> {
        let key = key.as_u64();
        let mut inner = self.inner.lock();
        let mut idx = self.bucket(key);

        for _ in 0..inner.keys.len() {
            let stored = inner.keys[idx];
            if stored == EMPTY_KEY {
                return None;
            }
            if stored == key {
                inner.keys[idx] = TOMBSTONE_KEY;
                let frame = inner.frames[idx];
                inner.frames[idx] = EMPTY_FRAME;
                return Some(FrameId(frame));
            }
            idx = (idx + 1) & self.mask;
        }
        None
    }

    /// Returns the number of live entries.
    #[allow(dead_code)]
    pub fn len(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .keys
            .iter()
            .filter(|&&k| k != EMPTY_KEY && k != TOMBSTONE_KEY)
            .count()
    }
}
