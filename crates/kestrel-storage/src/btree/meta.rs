//! Index meta page.

use kestrel_common::page::PageNo;
use kestrel_common::types::AttrType;
use kestrel_common::{KestrelError, Result};

/// Metadata stored on the first page of an index file.
///
/// Layout (32 bytes):
/// - relation name: 20 bytes, zero padded
/// - attr_byte_offset: 4 bytes
/// - attr_type: 4 bytes
/// - root_page_no: 4 bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexMetaInfo {
    /// Name of the base relation, truncated to 20 bytes on disk.
    pub relation_name: String,
    /// Byte offset of the indexed attribute within a record.
    pub attr_byte_offset: u32,
    /// Type of the indexed attribute.
    pub attr_type: AttrType,
    /// Page number of the tree root; changes when the root splits.
    pub root_page_no: PageNo,
}

impl IndexMetaInfo {
    /// Size of the meta info on disk.
    pub const SIZE: usize = 32;

    const NAME_BYTES: usize = 20;

    /// Serializes to the on-page layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut buf = [0u8; Self::SIZE];
        let name = self.relation_name.as_bytes();
        let len = name.len().min(Self::NAME_BYTES);
        buf[..len].copy_from_slice(&name[..len]);
        buf[20..24].copy_from_slice(&self.attr_byte_offset.to_le_bytes());
        buf[24..28].copy_from_slice(&(self.attr_type as u32).to_le_bytes());
        buf[28..32].copy_from_slice(&self.root_page_no.to_le_bytes());
        buf
    }

    /// Deserializes from the on-page layout.
    pub fn from_bytes(buf: &[u8], page_no: PageNo) -> Result<Self> {
        let name_end = buf[..Self::NAME_BYTES]
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(Self::NAME_BYTES);
        let relation_name = String::from_utf8_lossy(&buf[..name_end]).into_owned();

        let attr_byte_offset = u32::from_le_bytes([buf[20], buf[21], buf[22], buf[23]]);
        let raw_type = u32::from_le_bytes([buf[24], buf[25], buf[26], buf[27]]);
        let attr_type = AttrType::from_u32(raw_type).ok_or_else(|| KestrelError::PageCorrupted {
            page_no,
            reason: format!("unknown attribute type {}", raw_type),
        })?;
        let root_page_no = u32::from_le_bytes([buf[28], buf[29], buf[30], buf[31]]);

        Ok(Self {
            relation_name,
            attr_byte_offset,
            attr_type,
            root_page_no,
        })
    }
}
