//! Buffer pool management for KestrelDB.
//!
//! This crate provides in-memory page caching with:
//! - Fixed-size buffer pool with configurable frame count
//! - Clock eviction policy
//! - Pin counting with scoped pin guards
//! - Dirty page tracking for write-back

mod frame;
mod page_table;
mod pool;
mod replacer;

pub use frame::{BufferFrame, FrameId};
pub use pool::{BufMgr, BufMgrStats, PageGuard};
pub use replacer::{ClockReplacer, ProbeResult, Replacer};
