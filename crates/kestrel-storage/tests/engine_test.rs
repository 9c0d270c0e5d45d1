//! End-to-end tests for the storage engine: relation files bulk-loading a
//! B+ tree through the buffer pool, split cascades, durability, and scan
//! behavior under eviction pressure.
//!
//! These tests run with the `small-pages` feature, so multi-level trees
//! appear after a few thousand inserts.

use std::collections::HashMap;

use kestrel_buffer::BufMgr;
use kestrel_common::config::{BlobFileConfig, BufferPoolConfig};
use kestrel_common::page::PageNo;
use kestrel_common::types::{AttrType, RecordId};
use kestrel_common::{DbFile, KestrelError};
use kestrel_storage::{
    node_kind, BTreeIndex, BlobFile, IndexMetaInfo, InternalRef, LeafRef, NodeKind, RelationFile,
    ScanOp, LEAF_CAPACITY,
};

fn pool_of(frames: usize) -> BufMgr {
    BufMgr::new(BufferPoolConfig { num_frames: frames })
}

fn no_fsync() -> BlobFileConfig {
    BlobFileConfig {
        fsync_enabled: false,
    }
}

/// Record with the key at byte offset 4, preceded by a 4-byte tag.
fn record_for(key: i32) -> Vec<u8> {
    let mut record = Vec::with_capacity(8);
    record.extend_from_slice(&0xC0FFEEu32.to_le_bytes());
    record.extend_from_slice(&key.to_le_bytes());
    record
}

fn drain(index: &mut BTreeIndex) -> Vec<RecordId> {
    let mut out = Vec::new();
    loop {
        match index.scan_next() {
            Ok(rid) => out.push(rid),
            Err(KestrelError::IndexScanCompleted) => break,
            Err(e) => panic!("scan failed: {e}"),
        }
    }
    out
}

fn full_scan(index: &mut BTreeIndex) -> Vec<RecordId> {
    index
        .start_scan(i32::MIN, ScanOp::Gte, i32::MAX, ScanOp::Lte)
        .unwrap();
    let rids = drain(index);
    index.end_scan().unwrap();
    rids
}

#[test]
fn test_bulk_load_from_relation() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(32);

    let relation =
        RelationFile::create(pool.clone(), dir.path(), "accounts", no_fsync()).unwrap();
    let keys = [42, -7, 0, 42, 13, i32::MAX, i32::MIN, 99, -7];
    let mut key_of: HashMap<RecordId, i32> = HashMap::new();
    for &key in &keys {
        let rid = relation.append_record(&record_for(key)).unwrap();
        key_of.insert(rid, key);
    }

    let mut index = BTreeIndex::build(
        pool.clone(),
        dir.path(),
        &relation,
        4,
        AttrType::Integer,
        no_fsync(),
    )
    .unwrap();
    assert_eq!(index.index_name(), "accounts,4");

    let rids = full_scan(&mut index);
    assert_eq!(rids.len(), keys.len());
    let scanned: Vec<i32> = rids.iter().map(|rid| key_of[rid]).collect();
    let mut expected = keys.to_vec();
    expected.sort();
    assert_eq!(scanned, expected);

    // Every pin taken during the load and scan was released.
    assert_eq!(pool.stats().pinned_frames, 0);
}

#[test]
fn test_rescan_after_flush_sees_same_entries() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(16);

    let mut index = BTreeIndex::create(
        pool.clone(),
        dir.path(),
        "events",
        0,
        AttrType::Integer,
        no_fsync(),
    )
    .unwrap();
    for key in 0..500 {
        index
            .insert_entry(key, RecordId::new(1000 + key as u32, 0))
            .unwrap();
    }

    let before = full_scan(&mut index);
    pool.flush_file(index.file_id()).unwrap();
    // Flushing twice must not change anything.
    pool.flush_file(index.file_id()).unwrap();

    // Everything is re-read from disk now.
    let after = full_scan(&mut index);
    assert_eq!(before, after);
    assert_eq!(after.len(), 500);
}

/// Descends along the leftmost children and returns the first leaf page.
fn leftmost_leaf(file: &BlobFile, page_no: PageNo) -> PageNo {
    let page = file.read_page(page_no).unwrap();
    match node_kind(page.data(), page_no).unwrap() {
        NodeKind::Leaf => page_no,
        NodeKind::Internal => leftmost_leaf(file, InternalRef::new(page.data()).child(0)),
    }
}

#[test]
fn test_root_split_cascade_builds_two_internal_levels() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(64);

    let count = 48 * LEAF_CAPACITY as i32;
    let root_page;
    {
        let mut index = BTreeIndex::create(
            pool.clone(),
            dir.path(),
            "cascade",
            0,
            AttrType::Integer,
            no_fsync(),
        )
        .unwrap();
        for key in 0..count {
            index
                .insert_entry(key, RecordId::new(key as u32 + 1, 7))
                .unwrap();
        }
        root_page = index.root_page_no();

        let rids = full_scan(&mut index);
        assert_eq!(rids.len(), count as usize);
        assert!(rids
            .iter()
            .enumerate()
            .all(|(i, rid)| rid.page_no == i as u32 + 1));
        // Index drop flushes the file.
    }

    let file = BlobFile::open(&dir.path().join("cascade,0"), no_fsync()).unwrap();

    // The meta header records the grown root.
    let meta_page = file.read_page(1).unwrap();
    let meta = IndexMetaInfo::from_bytes(&meta_page.data()[..], 1).unwrap();
    assert_eq!(meta.relation_name, "cascade");
    assert_eq!(meta.attr_type, AttrType::Integer);
    assert_eq!(meta.root_page_no, root_page);

    // The root is a level-0 internal node over level-1 internal nodes
    // over leaves.
    let root = file.read_page(root_page).unwrap();
    assert_eq!(node_kind(root.data(), root_page).unwrap(), NodeKind::Internal);
    let root_node = InternalRef::new(root.data());
    assert_eq!(root_node.level(), 0);
    assert!(root_node.num_children() >= 2);
    for i in 0..root_node.num_children() {
        let child = file.read_page(root_node.child(i)).unwrap();
        assert_eq!(
            node_kind(child.data(), root_node.child(i)).unwrap(),
            NodeKind::Internal
        );
        assert_eq!(InternalRef::new(child.data()).level(), 1);
    }

    // Walk the leaf chain: all keys in order, and every leaf except the
    // rightmost at least half full.
    let min_fill = LEAF_CAPACITY.div_ceil(2) - 1;
    let mut page_no = leftmost_leaf(&file, root_page);
    let mut expected_key = 0;
    loop {
        let page = file.read_page(page_no).unwrap();
        let leaf = LeafRef::new(page.data());
        let entries = leaf.num_entries();
        for i in 0..entries {
            assert_eq!(leaf.key(i), expected_key);
            expected_key += 1;
        }
        if leaf.right_sibling() == 0 {
            break;
        }
        assert!(
            entries >= min_fill,
            "leaf {page_no} holds {entries} entries, expected at least {min_fill}"
        );
        page_no = leaf.right_sibling();
    }
    assert_eq!(expected_key, count);
}

#[test]
fn test_random_inserts_under_eviction_pressure() {
    use rand::prelude::*;

    let dir = tempfile::tempdir().unwrap();
    // A pool far smaller than the tree, so inserts and scans evict.
    let pool = pool_of(12);
    let mut rng = StdRng::seed_from_u64(42);

    let mut index = BTreeIndex::create(
        pool.clone(),
        dir.path(),
        "random",
        0,
        AttrType::Integer,
        no_fsync(),
    )
    .unwrap();

    let mut key_of: HashMap<RecordId, i32> = HashMap::new();
    for seq in 0..4000u32 {
        let key = rng.gen_range(0..1000);
        let rid = RecordId::new(seq + 1, (seq % 7) as u16);
        index.insert_entry(key, rid).unwrap();
        key_of.insert(rid, key);
    }
    assert_eq!(pool.stats().pinned_frames, 0);

    let rids = full_scan(&mut index);
    assert_eq!(rids.len(), key_of.len());
    let keys: Vec<i32> = rids.iter().map(|rid| key_of[rid]).collect();
    assert!(keys.windows(2).all(|w| w[0] <= w[1]), "scan out of order");

    // Point scans: each [k, k] range returns exactly the rids inserted
    // with k.
    for key in (0..1000).step_by(97) {
        let expected: Vec<&RecordId> = key_of
            .iter()
            .filter(|(_, &k)| k == key)
            .map(|(rid, _)| rid)
            .collect();
        match index.start_scan(key, ScanOp::Gte, key, ScanOp::Lte) {
            Ok(()) => {
                let got = drain(&mut index);
                index.end_scan().unwrap();
                assert_eq!(got.len(), expected.len());
                assert!(got.iter().all(|rid| key_of[rid] == key));
            }
            Err(KestrelError::NoSuchKeyFound) => assert!(expected.is_empty()),
            Err(e) => panic!("point scan failed: {e}"),
        }
    }
}

#[test]
fn test_scan_survives_eviction_of_inner_nodes() {
    let dir = tempfile::tempdir().unwrap();
    // Just enough frames for descent plus churn.
    let pool = pool_of(8);

    let mut index = BTreeIndex::create(
        pool.clone(),
        dir.path(),
        "churn",
        0,
        AttrType::Integer,
        no_fsync(),
    )
    .unwrap();
    let count = 20 * LEAF_CAPACITY as i32;
    for key in 0..count {
        index
            .insert_entry(key, RecordId::new(key as u32 + 1, 0))
            .unwrap();
    }

    // While a scan holds its leaf pinned, other traffic can still evict
    // and reload everything else.
    index.start_scan(0, ScanOp::Gte, count - 1, ScanOp::Lte).unwrap();
    let mut seen = 0u32;
    loop {
        match index.scan_next() {
            Ok(rid) => {
                assert_eq!(rid.page_no, seen + 1);
                seen += 1;
            }
            Err(KestrelError::IndexScanCompleted) => break,
            Err(e) => panic!("scan failed: {e}"),
        }
        assert!(pool.stats().pinned_frames <= 1);
    }
    assert_eq!(seen, count as u32);
    index.end_scan().unwrap();
    assert_eq!(pool.stats().pinned_frames, 0);
}

#[test]
fn test_index_file_layout_on_disk() {
    let dir = tempfile::tempdir().unwrap();
    let pool = pool_of(16);

    {
        let mut index = BTreeIndex::create(
            pool.clone(),
            dir.path(),
            "layout",
            8,
            AttrType::Integer,
            no_fsync(),
        )
        .unwrap();
        index.insert_entry(5, RecordId::new(9, 3)).unwrap();
    }

    let file = BlobFile::open(&dir.path().join("layout,8"), no_fsync()).unwrap();

    let meta = IndexMetaInfo::from_bytes(&file.read_page(1).unwrap().data()[..], 1).unwrap();
    assert_eq!(meta.relation_name, "layout");
    assert_eq!(meta.attr_byte_offset, 8);
    assert_eq!(meta.root_page_no, 2);

    let root = file.read_page(2).unwrap();
    assert_eq!(node_kind(root.data(), 2).unwrap(), NodeKind::Leaf);
    let leaf = LeafRef::new(root.data());
    assert_eq!(leaf.level(), -1);
    assert_eq!(leaf.num_entries(), 1);
    assert_eq!(leaf.key(0), 5);
    assert_eq!(leaf.rid(0), RecordId::new(9, 3));
    assert_eq!(leaf.right_sibling(), 0);
}
