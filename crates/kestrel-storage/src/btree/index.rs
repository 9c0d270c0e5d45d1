//! The B+ tree index.

use super::meta::IndexMetaInfo;
use super::node::{
    node_kind, split_full_internal, split_full_leaf, InternalMut, InternalRef, LeafMut, LeafRef,
    NodeKind, LEAF_CAPACITY,
};
use crate::file::BlobFile;
use crate::relation::RelationFile;
use kestrel_buffer::{BufMgr, PageGuard};
use kestrel_common::config::BlobFileConfig;
use kestrel_common::page::{FileId, PageNo, INVALID_PAGE_NO};
use kestrel_common::types::{AttrType, RecordId};
use kestrel_common::{DbFile, KestrelError, Result};
use std::path::Path;
use std::sync::Arc;

/// Comparison operators accepted by [`BTreeIndex::start_scan`].
///
/// The low bound takes `Gt`/`Gte`, the high bound `Lt`/`Lte`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanOp {
    Lt,
    Lte,
    Gte,
    Gt,
}

/// Outcome of inserting into a subtree whose node had to split.
struct Split {
    /// Separator to install in the parent.
    mid_key: i32,
    /// Page number of the new right sibling.
    right_page: PageNo,
}

struct LeafCursor {
    guard: PageGuard,
    entry: usize,
}

struct ScanState {
    high: i32,
    high_op: ScanOp,
    /// Current position, or None once the leaf chain is exhausted.
    cursor: Option<LeafCursor>,
}

/// A disk-resident B+ tree index over a 4-byte integer attribute.
///
/// Every node is one page of a dedicated index file, obtained through the
/// buffer pool; the first page holds the [`IndexMetaInfo`] header. The
/// index supports inserts (duplicates allowed) and one forward range scan
/// at a time. During an active scan exactly one leaf page stays pinned;
/// every other page a call touches is unpinned before the call returns.
pub struct BTreeIndex {
    pool: BufMgr,
    file: Arc<dyn DbFile>,
    index_name: String,
    meta_page_no: PageNo,
    meta: IndexMetaInfo,
    scan: Option<ScanState>,
}

impl BTreeIndex {
    /// Creates an empty index for `relation_name` keyed on the integer
    /// attribute at `attr_byte_offset`.
    ///
    /// The index file is named `"<relation_name>,<attr_byte_offset>"`
    /// inside `dir`, overwriting any existing file. The root starts as an
    /// empty leaf on page 2, recorded in the meta header on page 1.
    pub fn create(
        pool: BufMgr,
        dir: &Path,
        relation_name: &str,
        attr_byte_offset: u32,
        attr_type: AttrType,
        config: BlobFileConfig,
    ) -> Result<Self> {
        if attr_type != AttrType::Integer {
            return Err(KestrelError::UnsupportedKeyType(attr_type));
        }

        let index_name = format!("{},{}", relation_name, attr_byte_offset);
        let file: Arc<dyn DbFile> = Arc::new(BlobFile::create(&dir.join(&index_name), config)?);

        let meta_guard = pool.alloc_page(&file)?;
        let meta_page_no = meta_guard.page_no();

        let root_page_no = {
            let root_guard = pool.alloc_page(&file)?;
            {
                let mut data = root_guard.data_mut();
                LeafMut::new(&mut data).init();
            }
            root_guard.page_no()
        };

        let meta = IndexMetaInfo {
            relation_name: relation_name.to_string(),
            attr_byte_offset,
            attr_type,
            root_page_no,
        };
        {
            let mut data = meta_guard.data_mut();
            data[..IndexMetaInfo::SIZE].copy_from_slice(&meta.to_bytes());
        }
        drop(meta_guard);

        Ok(Self {
            pool,
            file,
            index_name,
            meta_page_no,
            meta,
            scan: None,
        })
    }

    /// Creates an index over `relation` and bulk-loads it with one entry
    /// per record, reading the key at the configured byte offset.
    pub fn build(
        pool: BufMgr,
        dir: &Path,
        relation: &RelationFile,
        attr_byte_offset: u32,
        attr_type: AttrType,
        config: BlobFileConfig,
    ) -> Result<Self> {
        let mut index = Self::create(
            pool,
            dir,
            relation.name(),
            attr_byte_offset,
            attr_type,
            config,
        )?;

        let mut scan = relation.scan();
        while let Some((record, rid)) = scan.next_record()? {
            let off = attr_byte_offset as usize;
            let Some(bytes) = record.get(off..off + 4) else {
                return Err(KestrelError::PageCorrupted {
                    page_no: rid.page_no,
                    reason: format!("record {} ends before the key offset", rid),
                });
            };
            let key = i32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            index.insert_entry(key, rid)?;
        }
        Ok(index)
    }

    /// Returns the derived index file name, `"<relation>,<offset>"`.
    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Returns the file identity of the index file.
    pub fn file_id(&self) -> FileId {
        self.file.id()
    }

    /// Returns the page number of the meta header.
    pub fn meta_page_no(&self) -> PageNo {
        self.meta_page_no
    }

    /// Returns the current root page number.
    pub fn root_page_no(&self) -> PageNo {
        self.meta.root_page_no
    }

    /// Inserts a `(key, rid)` pair. Duplicate keys are permitted.
    ///
    /// Splits propagate upward as far as needed; when the root itself
    /// splits, a new root is grown and the meta header updated.
    pub fn insert_entry(&mut self, key: i32, rid: RecordId) -> Result<()> {
        let root = self.meta.root_page_no;
        let Some(split) = self.insert_node(root, key, rid)? else {
            return Ok(());
        };

        // The root split: grow the tree by one level. A root directly
        // above leaves is level 1, anything higher is level 0.
        let root_level = {
            let guard = self.pool.read_page(&self.file, root)?;
            let data = guard.data();
            match node_kind(&data, root)? {
                NodeKind::Leaf => 1,
                NodeKind::Internal => 0,
            }
        };
        let new_root = {
            let guard = self.pool.alloc_page(&self.file)?;
            {
                let mut data = guard.data_mut();
                let mut node = InternalMut::new(&mut data);
                node.init(root_level);
                node.set_key(0, split.mid_key);
                node.set_child(0, root);
                node.set_child(1, split.right_page);
            }
            guard.page_no()
        };
        self.set_root(new_root)
    }

    /// Begins a range scan bounded by `(low, low_op)` and `(high, high_op)`.
    ///
    /// `low_op` must be `Gt` or `Gte` and `high_op` must be `Lt` or `Lte`,
    /// otherwise the call fails with `BadOpcodes`; `low > high` fails with
    /// `BadScanrange`. An already active scan is ended first. If no entry
    /// falls in the range the call fails with `NoSuchKeyFound` and leaves
    /// no scan active and no page pinned.
    pub fn start_scan(
        &mut self,
        low: i32,
        low_op: ScanOp,
        high: i32,
        high_op: ScanOp,
    ) -> Result<()> {
        if !matches!(low_op, ScanOp::Gt | ScanOp::Gte)
            || !matches!(high_op, ScanOp::Lt | ScanOp::Lte)
        {
            return Err(KestrelError::BadOpcodes);
        }
        if low > high {
            return Err(KestrelError::BadScanrange);
        }
        if self.scan.is_some() {
            // Replacing an active scan releases its pinned leaf first.
            self.end_scan()?;
        }

        let pool = self.pool.clone();
        let file = self.file.clone();

        // Descend to the leaf whose key range contains the lower bound,
        // releasing each internal node as soon as the child is chosen.
        let mut guard = pool.read_page(&file, self.meta.root_page_no)?;
        loop {
            let next = {
                let data = guard.data();
                match node_kind(&data, guard.page_no())? {
                    NodeKind::Leaf => None,
                    NodeKind::Internal => {
                        let node = InternalRef::new(&data);
                        Some(node.child(node.pivot_child(low)))
                    }
                }
            };
            match next {
                None => break,
                Some(child) => guard = pool.read_page(&file, child)?,
            }
        }

        let first = {
            let data = guard.data();
            LeafRef::new(&data).find_first(low, matches!(low_op, ScanOp::Gte))
        };
        let cursor = match first {
            Some(entry) => LeafCursor { guard, entry },
            None => {
                // Past the end of this leaf; the candidate is the first
                // entry of the right sibling, if any.
                let sibling = {
                    let data = guard.data();
                    LeafRef::new(&data).right_sibling()
                };
                drop(guard);
                if sibling == INVALID_PAGE_NO {
                    return Err(KestrelError::NoSuchKeyFound);
                }
                LeafCursor {
                    guard: pool.read_page(&file, sibling)?,
                    entry: 0,
                }
            }
        };

        let qualifies = {
            let data = cursor.guard.data();
            let leaf = LeafRef::new(&data);
            let rid = leaf.rid(cursor.entry);
            let key = leaf.key(cursor.entry);
            !rid.is_empty() && key <= high && !(key == high && high_op == ScanOp::Lt)
        };
        if !qualifies {
            // Dropping the cursor releases the leaf; no scan is active.
            return Err(KestrelError::NoSuchKeyFound);
        }

        self.scan = Some(ScanState {
            high,
            high_op,
            cursor: Some(cursor),
        });
        Ok(())
    }

    /// Returns the record id under the cursor and advances it.
    ///
    /// Fails with `ScanNotInitialized` if no scan is active and with
    /// `IndexScanCompleted` once the cursor moves past the high bound or
    /// off the end of the leaf chain.
    pub fn scan_next(&mut self) -> Result<RecordId> {
        let pool = self.pool.clone();
        let file = self.file.clone();
        let state = self
            .scan
            .as_mut()
            .ok_or(KestrelError::ScanNotInitialized)?;
        let Some(cursor) = state.cursor.as_mut() else {
            return Err(KestrelError::IndexScanCompleted);
        };

        let (rid, sibling, stay) = {
            let data = cursor.guard.data();
            let leaf = LeafRef::new(&data);
            let key = leaf.key(cursor.entry);
            let rid = leaf.rid(cursor.entry);
            if rid.is_empty()
                || key > state.high
                || (key == state.high && state.high_op == ScanOp::Lt)
            {
                return Err(KestrelError::IndexScanCompleted);
            }
            let next = cursor.entry + 1;
            let stay = next < LEAF_CAPACITY && !leaf.rid(next).is_empty();
            (rid, leaf.right_sibling(), stay)
        };

        if stay {
            cursor.entry += 1;
        } else if sibling != INVALID_PAGE_NO {
            // Moving to the sibling releases the old leaf's pin.
            cursor.guard = pool.read_page(&file, sibling)?;
            cursor.entry = 0;
        } else {
            state.cursor = None;
        }
        Ok(rid)
    }

    /// Ends the active scan, releasing the pinned leaf.
    pub fn end_scan(&mut self) -> Result<()> {
        match self.scan.take() {
            Some(_) => Ok(()),
            None => Err(KestrelError::ScanNotInitialized),
        }
    }

    fn insert_node(&self, page_no: PageNo, key: i32, rid: RecordId) -> Result<Option<Split>> {
        let guard = self.pool.read_page(&self.file, page_no)?;
        let kind = {
            let data = guard.data();
            node_kind(&data, page_no)?
        };
        match kind {
            NodeKind::Leaf => self.insert_leaf(guard, key, rid),
            NodeKind::Internal => self.insert_internal(guard, key, rid),
        }
    }

    fn insert_leaf(&self, guard: PageGuard, key: i32, rid: RecordId) -> Result<Option<Split>> {
        let (index, full) = {
            let data = guard.data();
            let leaf = LeafRef::new(&data);
            (leaf.insertion_index(key), leaf.is_full())
        };

        if !full {
            let mut data = guard.data_mut();
            LeafMut::new(&mut data).insert_at(index, key, rid);
            return Ok(None);
        }

        let new_guard = self.pool.alloc_page(&self.file)?;
        let mid_key = {
            let mut new_data = new_guard.data_mut();
            let mut new_leaf = LeafMut::new(&mut new_data);
            let mut data = guard.data_mut();
            let mut leaf = LeafMut::new(&mut data);
            let mid_key = split_full_leaf(&mut leaf, &mut new_leaf, index, key, rid);
            new_leaf.set_right_sibling(leaf.right_sibling());
            leaf.set_right_sibling(new_guard.page_no());
            mid_key
        };
        Ok(Some(Split {
            mid_key,
            right_page: new_guard.page_no(),
        }))
    }

    fn insert_internal(&self, guard: PageGuard, key: i32, rid: RecordId) -> Result<Option<Split>> {
        let child_page = {
            let data = guard.data();
            let node = InternalRef::new(&data);
            node.child(node.pivot_child(key))
        };

        let Some(split) = self.insert_node(child_page, key, rid)? else {
            // No split below: this node is untouched and unpins clean.
            return Ok(None);
        };

        let (index, full) = {
            let data = guard.data();
            let node = InternalRef::new(&data);
            (node.pivot_child(split.mid_key), node.is_full())
        };

        if !full {
            let mut data = guard.data_mut();
            InternalMut::new(&mut data).install_at(index, split.mid_key, split.right_page);
            return Ok(None);
        }

        let new_guard = self.pool.alloc_page(&self.file)?;
        let mid_key = {
            let mut new_data = new_guard.data_mut();
            let mut new_node = InternalMut::new(&mut new_data);
            let mut data = guard.data_mut();
            let mut node = InternalMut::new(&mut data);
            split_full_internal(&mut node, &mut new_node, index, split.mid_key, split.right_page)
        };
        Ok(Some(Split {
            mid_key,
            right_page: new_guard.page_no(),
        }))
    }

    fn set_root(&mut self, root_page_no: PageNo) -> Result<()> {
        self.meta.root_page_no = root_page_no;
        self.write_meta()
    }

    /// Rewrites the meta header through the pool, leaving it dirty.
    fn write_meta(&self) -> Result<()> {
        let guard = self.pool.read_page(&self.file, self.meta_page_no)?;
        let mut data = guard.data_mut();
        data[..IndexMetaInfo::SIZE].copy_from_slice(&self.meta.to_bytes());
        Ok(())
    }
}

impl Drop for BTreeIndex {
    /// Ends any active scan and flushes the index file. Failures are
    /// swallowed; destruction must not propagate errors.
    fn drop(&mut self) {
        self.scan = None;
        let _ = self.pool.flush_file(self.file.id());
    }
}
