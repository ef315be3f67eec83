// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;
use crate::state::PageState;

/// On-flash header at the base of every sector.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct MetadataHeader {
    pub magic: u32,
    pub state: u8,
    /// Pages ahead of the data region that hold this header + item table.
    pub metadata_page_count: u8,
    pub metadata_item_count: u8,
    pub reserved: u8,
}

impl MetadataHeader {
    /// Header as written at format time (sector freshly erased).
    pub fn erased(metadata_page_count: u8, metadata_item_count: u8) -> Self {
        Self {
            magic: METADATA_MAGIC,
            state: SECTOR_STATE_ERASED,
            metadata_page_count,
            metadata_item_count,
            // Left erased so a future revision can still program it.
            reserved: ERASED_BYTE,
        }
    }

    #[inline]
    pub fn is_blank(&self) -> bool {
        self.as_bytes().iter().all(|&b| b == ERASED_BYTE)
    }
}

/// On-flash record binding (file_id, block) to the data page with the same
/// index in the same sector.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct MetadataItem {
    pub file_id: u16,
    pub block: u16,
    pub state: u8,
    /// Bytes of the data page that belong to the file.
    pub size: u16,
    pub reserved: u8,
}

impl MetadataItem {
    /// Item as written at format time.
    pub fn erased() -> Self {
        Self {
            file_id: UNALLOCATED_FILE_ID,
            block: UNALLOCATED_BLOCK,
            state: PAGE_STATE_ERASED,
            size: ERASED_SIZE,
            reserved: ERASED_BYTE,
        }
    }

    #[inline]
    pub fn page_state(&self) -> Option<PageState> {
        PageState::from_raw(self.state)
    }

    /// Free for allocation: erased state and no claim on the file_id field.
    #[inline]
    pub fn is_free(&self) -> bool {
        self.page_state() == Some(PageState::Erased) && self.file_id == UNALLOCATED_FILE_ID
    }

    /// Claimed by a writer but never committed (crash leftover).
    #[inline]
    pub fn is_abandoned_claim(&self) -> bool {
        self.page_state() == Some(PageState::Erased) && self.file_id != UNALLOCATED_FILE_ID
    }

    #[inline]
    pub fn matches(&self, file_id: u16, block: u16) -> bool {
        self.file_id == file_id && self.block == block
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use zerocopy::IntoBytes;

    #[test]
    fn test_on_flash_sizes() {
        assert_eq!(core::mem::size_of::<MetadataHeader>() as u32, HEADER_SIZE);
        assert_eq!(core::mem::size_of::<MetadataItem>() as u32, ITEM_SIZE);
    }

    #[test]
    fn test_header_layout_little_endian() {
        let header = MetadataHeader::erased(1, 15);
        let bytes = header.as_bytes();
        assert_eq!(&bytes[0..4], &0x87985214u32.to_le_bytes());
        assert_eq!(bytes[4], SECTOR_STATE_ERASED);
        assert_eq!(bytes[5], 1);
        assert_eq!(bytes[6], 15);
    }

    #[test]
    fn test_erased_item_is_free() {
        let item = MetadataItem::erased();
        assert!(item.is_free());
        assert!(!item.is_abandoned_claim());

        let mut claimed = item;
        claimed.file_id = 42;
        claimed.block = 0;
        assert!(!claimed.is_free());
        assert!(claimed.is_abandoned_claim());
    }
}
