//! Relation heap files and the sequential scan used to bulk-load indexes.

use crate::file::BlobFile;
use kestrel_buffer::{BufMgr, PageGuard};
use kestrel_common::config::BlobFileConfig;
use kestrel_common::page::{FileId, PageNo, PAGE_SIZE};
use kestrel_common::types::RecordId;
use kestrel_common::{DbFile, KestrelError, Result};
use std::path::Path;
use std::sync::Arc;

/// Page header: record count (u16) followed by the end-of-data offset (u16).
const HEADER_SIZE: usize = 4;

/// Length prefix stored before each record.
const LEN_SIZE: usize = 2;

/// Largest record that fits on an empty page.
const MAX_RECORD: usize = PAGE_SIZE - HEADER_SIZE - LEN_SIZE;

/// A minimal heap file of variable-length records.
///
/// Records are appended sequentially; each page holds a count, an
/// end-of-data offset, and length-prefixed record bytes. All page access
/// goes through the buffer pool. Record ids are `(page_no, slot_no)` with
/// pages numbered from 1, so the reserved `{0,0}` record id never refers
/// to a real record.
pub struct RelationFile {
    name: String,
    pool: BufMgr,
    file: Arc<dyn DbFile>,
    blob: Arc<BlobFile>,
}

impl RelationFile {
    /// Creates a relation file named `name` inside `dir`.
    pub fn create(pool: BufMgr, dir: &Path, name: &str, config: BlobFileConfig) -> Result<Self> {
        let blob = Arc::new(BlobFile::create(&dir.join(name), config)?);
        Ok(Self {
            name: name.to_string(),
            pool,
            file: blob.clone(),
            blob,
        })
    }

    /// Returns the relation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the file identity of the underlying blob file.
    pub fn file_id(&self) -> FileId {
        self.file.id()
    }

    /// Appends a record, returning its record id.
    pub fn append_record(&self, record: &[u8]) -> Result<RecordId> {
        if record.len() > MAX_RECORD {
            return Err(KestrelError::RecordTooLarge {
                size: record.len(),
                max: MAX_RECORD,
            });
        }

        let last = self.blob.page_count();
        if last >= 1 {
            let guard = self.pool.read_page(&self.file, last)?;
            let (count, used) = read_header(&guard);
            if used + LEN_SIZE + record.len() <= PAGE_SIZE {
                write_record(&guard, count, used, record);
                return Ok(RecordId::new(last, count));
            }
        }

        let guard = self.pool.alloc_page(&self.file)?;
        write_record(&guard, 0, HEADER_SIZE, record);
        Ok(RecordId::new(guard.page_no(), 0))
    }

    /// Starts a sequential scan over every record in the relation.
    pub fn scan(&self) -> RelationScan {
        RelationScan {
            pool: self.pool.clone(),
            file: self.file.clone(),
            last_page: self.blob.page_count(),
            next_page: 1,
            current: None,
        }
    }

    /// Writes all cached dirty pages of the relation back to disk.
    pub fn flush(&self) -> Result<()> {
        self.pool.flush_file(self.file.id())
    }
}

fn read_header(guard: &PageGuard) -> (u16, usize) {
    let data = guard.data();
    let count = u16::from_le_bytes([data[0], data[1]]);
    let used = u16::from_le_bytes([data[2], data[3]]) as usize;
    (count, used.max(HEADER_SIZE))
}

fn write_record(guard: &PageGuard, count: u16, used: usize, record: &[u8]) {
    let mut data = guard.data_mut();
    data[used..used + LEN_SIZE].copy_from_slice(&(record.len() as u16).to_le_bytes());
    data[used + LEN_SIZE..used + LEN_SIZE + record.len()].copy_from_slice(record);
    let new_used = (used + LEN_SIZE + record.len()) as u16;
    data[0..2].copy_from_slice(&(count + 1).to_le_bytes());
    data[2..4].copy_from_slice(&new_used.to_le_bytes());
}

/// One-at-a-time forward scan over a relation.
///
/// Keeps at most one relation page pinned between calls; the pin moves
/// with the cursor and is released when the scan is dropped or exhausted.
pub struct RelationScan {
    pool: BufMgr,
    file: Arc<dyn DbFile>,
    last_page: PageNo,
    next_page: PageNo,
    current: Option<PageCursor>,
}

struct PageCursor {
    guard: PageGuard,
    slot: u16,
    offset: usize,
    count: u16,
}

impl RelationScan {
    /// Returns the next record and its id, or `None` at end of file.
    pub fn next_record(&mut self) -> Result<Option<(Vec<u8>, RecordId)>> {
        loop {
            match self.current.as_mut() {
                Some(cursor) if cursor.slot < cursor.count => {
                    let data = cursor.guard.data();
                    let len = u16::from_le_bytes([data[cursor.offset], data[cursor.offset + 1]])
                        as usize;
                    let start = cursor.offset + LEN_SIZE;
                    let record = data[start..start + len].to_vec();
                    let rid = RecordId::new(cursor.guard.page_no(), cursor.slot);
                    drop(data);
                    cursor.slot += 1;
                    cursor.offset = start + len;
                    return Ok(Some((record, rid)));
                }
                Some(_) => {
                    // Page exhausted; drop its pin before moving on.
                    self.current = None;
                }
                None => {
                    if self.next_page > self.last_page {
                        return Ok(None);
                    }
                    let guard = self.pool.read_page(&self.file, self.next_page)?;
                    let count = {
                        let data = guard.data();
                        u16::from_le_bytes([data[0], data[1]])
                    };
                    self.current = Some(PageCursor {
                        guard,
                        slot: 0,
                        offset: HEADER_SIZE,
                        count,
                    });
                    self.next_page += 1;
                }
            }
        }
    }
}
