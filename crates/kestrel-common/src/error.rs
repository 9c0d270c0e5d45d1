//! Error types for KestrelDB.

use crate::types::AttrType;
use thiserror::Error;

/// Result type alias using KestrelError.
pub type Result<T> = std::result::Result<T, KestrelError>;

/// Errors that can occur in KestrelDB operations.
#[derive(Debug, Error)]
pub enum KestrelError {
    // I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // File errors
    #[error("Page {page_no} does not exist in file {file_id}")]
    PageNotFound { file_id: u32, page_no: u32 },

    #[error("Page {page_no} corrupted: {reason}")]
    PageCorrupted { page_no: u32, reason: String },

    #[error("Record too large: {size} bytes (max {max})")]
    RecordTooLarge { size: usize, max: usize },

    // Buffer pool errors
    #[error("Buffer exceeded, all frames pinned")]
    BufferExceeded,

    #[error("Page {page_no} is not pinned")]
    PageNotPinned { page_no: u32 },

    #[error("Page {page_no} is pinned")]
    PagePinned { page_no: u32 },

    #[error("Bad buffer state in frame {frame_no}")]
    BadBuffer { frame_no: u32 },

    // Index errors
    #[error("Unsupported key type: {0}")]
    UnsupportedKeyType(AttrType),

    #[error("Bad scan opcodes")]
    BadOpcodes,

    #[error("Bad scan range, low value above high value")]
    BadScanrange,

    #[error("No such key found in scan range")]
    NoSuchKeyFound,

    #[error("Scan not initialized")]
    ScanNotInitialized,

    #[error("Index scan completed")]
    IndexScanCompleted,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_io_error_conversion() {
        let io_err = IoError::new(ErrorKind::NotFound, "file not found");
        let err: KestrelError = io_err.into();
        assert!(matches!(err, KestrelError::Io(_)));
        assert!(err.to_string().contains("I/O error"));
    }

    #[test]
    fn test_page_not_found_display() {
        let err = KestrelError::PageNotFound {
            file_id: 3,
            page_no: 42,
        };
        assert_eq!(err.to_string(), "Page 42 does not exist in file 3");
    }

    #[test]
    fn test_buffer_errors_display() {
        assert_eq!(
            KestrelError::BufferExceeded.to_string(),
            "Buffer exceeded, all frames pinned"
        );
        assert_eq!(
            KestrelError::PageNotPinned { page_no: 7 }.to_string(),
            "Page 7 is not pinned"
        );
        assert_eq!(
            KestrelError::PagePinned { page_no: 7 }.to_string(),
            "Page 7 is pinned"
        );
        assert_eq!(
            KestrelError::BadBuffer { frame_no: 2 }.to_string(),
            "Bad buffer state in frame 2"
        );
    }

    #[test]
    fn test_scan_errors_display() {
        assert_eq!(KestrelError::BadOpcodes.to_string(), "Bad scan opcodes");
        assert_eq!(
            KestrelError::BadScanrange.to_string(),
            "Bad scan range, low value above high value"
        );
        assert_eq!(
            KestrelError::NoSuchKeyFound.to_string(),
            "No such key found in scan range"
        );
        assert_eq!(
            KestrelError::ScanNotInitialized.to_string(),
            "Scan not initialized"
        );
        assert_eq!(
            KestrelError::IndexScanCompleted.to_string(),
            "Index scan completed"
        );
    }

    #[test]
    fn test_unsupported_key_type_display() {
        let err = KestrelError::UnsupportedKeyType(AttrType::Double);
        assert_eq!(err.to_string(), "Unsupported key type: DOUBLE");
    }

    #[test]
    fn test_result_type_alias() {
        fn returns_ok() -> Result<i32> {
            Ok(42)
        }

        fn returns_err() -> Result<i32> {
            Err(KestrelError::BufferExceeded)
        }

        assert!(returns_ok().is_ok());
        assert!(returns_err().is_err());
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<KestrelError>();
    }
}
