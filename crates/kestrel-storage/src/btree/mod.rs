//! Disk-resident B+ tree index over integer keys.
//!
//! Every node occupies exactly one page obtained through the buffer pool.
//! The first page of an index file is an [`IndexMetaInfo`] header; all
//! other pages are leaf or internal nodes, distinguished by the signed
//! `level` integer at the start of the page (`-1` marks a leaf).

mod index;
mod meta;
mod node;

pub use index::{BTreeIndex, ScanOp};
pub use meta::IndexMetaInfo;
pub use node::{node_kind, InternalRef, LeafRef, NodeKind, INTERNAL_CAPACITY, LEAF_CAPACITY};
