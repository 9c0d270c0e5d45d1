//! Storage engine for KestrelDB.
//!
//! This crate provides:
//! - `BlobFile`: a flat file of fixed-size pages implementing `DbFile`
//! - `RelationFile`: a minimal slotted heap file with a sequential scanner
//! - `BTreeIndex`: a disk-resident B+ tree index over integer keys, with
//!   every node page obtained through the buffer pool

mod btree;
mod file;
mod relation;

pub use btree::{
    node_kind, BTreeIndex, IndexMetaInfo, InternalRef, LeafRef, NodeKind, ScanOp,
    INTERNAL_CAPACITY, LEAF_CAPACITY,
};
pub use file::BlobFile;
pub use relation::{RelationFile, RelationScan};
