//! Configuration structures for KestrelDB.

use serde::{Deserialize, Serialize};

/// Configuration for the buffer pool.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BufferPoolConfig {
    /// Number of frames in the pool.
    pub num_frames: usize,
}

impl Default for BufferPoolConfig {
    fn default() -> Self {
        Self { num_frames: 1024 }
    }
}

/// Configuration for page files.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobFileConfig {
    /// Enable fsync after writes.
    pub fsync_enabled: bool,
}

impl Default for BlobFileConfig {
    fn default() -> Self {
        Self {
            fsync_enabled: true,
        }
    }
}
