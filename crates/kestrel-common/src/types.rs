//! Record identifiers and attribute types for KestrelDB.

use crate::page::PageNo;
use serde::{Deserialize, Serialize};

/// Type of an attribute over which an index can be built.
///
/// Stored in the index meta page. Only `Integer` is implemented by the
/// index core; the other variants are declared for the meta page format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u32)]
pub enum AttrType {
    /// 4-byte signed integer.
    Integer = 0,
    /// 8-byte IEEE float.
    Double = 1,
    /// Fixed-width character string.
    String = 2,
}

impl AttrType {
    /// Decodes an attribute type from its on-disk discriminant.
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0 => Some(AttrType::Integer),
            1 => Some(AttrType::Double),
            2 => Some(AttrType::String),
            _ => None,
        }
    }

    /// Returns the key width in bytes, or None for string keys.
    pub fn fixed_size(&self) -> Option<usize> {
        match self {
            AttrType::Integer => Some(4),
            AttrType::Double => Some(8),
            AttrType::String => None,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Integer => "INTEGER",
            AttrType::Double => "DOUBLE",
            AttrType::String => "STRING",
        };
        write!(f, "{}", name)
    }
}

/// Location of a record in a relation file.
///
/// `{page_no: 0, slot_no: 0}` is reserved as the empty sentinel; relation
/// pages are numbered from 1, so the sentinel is never a real record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct RecordId {
    /// Page containing the record.
    pub page_no: PageNo,
    /// Slot number within the page.
    pub slot_no: u16,
}

impl RecordId {
    /// Size of a record id on disk (page:4 + slot:2 + 2 reserved).
    pub const SIZE: usize = 8;

    /// The empty sentinel.
    pub const EMPTY: RecordId = RecordId {
        page_no: 0,
        slot_no: 0,
    };

    /// Creates a new record id.
    pub fn new(page_no: PageNo, slot_no: u16) -> Self {
        Self { page_no, slot_no }
    }

    /// Returns true if this is the empty sentinel.
    pub fn is_empty(&self) -> bool {
        self.page_no == 0 && self.slot_no == 0
    }

    /// Serializes to an 8-byte slot.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        buf[0..4].copy_from_slice(&self.page_no.to_le_bytes());
        buf[4..6].copy_from_slice(&self.slot_no.to_le_bytes());
        buf
    }

    /// Deserializes from an 8-byte slot.
    pub fn from_bytes(buf: &[u8]) -> Self {
        Self {
            page_no: u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            slot_no: u16::from_le_bytes([buf[4], buf[5]]),
        }
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.page_no, self.slot_no)
    }
}
