// SPDX-License-Identifier: MIT

use sffs_flash::FlashInfo;

use crate::constant::*;
use crate::error::{FsError, FsResult};

/// Geometry-derived layout of the filesystem, computed once at mount or
/// format time.
///
/// Each sector holds a metadata header, a packed table of one item per data
/// page, and the data pages themselves at the tail of the sector:
///
/// ```text
/// | header | item 0 .. item n-1 | (unused) | data page 0 .. data page n-1 |
/// ```
#[derive(Debug, Clone)]
pub struct SffsMeta {
    pub page_size: u32,
    pub sector_size: u32,
    pub capacity: u32,
    pub sector_count: u32,
    pub data_pages_per_sector: u32,
    /// Page index (within a sector) of the first data page; everything
    /// before it is the metadata region.
    pub first_data_page: u32,
}

impl SffsMeta {
    pub fn from_info(info: &FlashInfo) -> FsResult<Self> {
        if !info.page_size.is_power_of_two() || !info.sector_size.is_power_of_two() {
            return Err(FsError::InvalidArg("Geometry sizes must be powers of two"));
        }
        if info.sector_size < info.page_size {
            return Err(FsError::InvalidArg("Sector smaller than page"));
        }
        if info.page_size < HEADER_SIZE || info.page_size % ITEM_SIZE != 0 {
            return Err(FsError::InvalidArg("Page size incompatible with metadata"));
        }
        if info.capacity == 0 || info.capacity % info.sector_size != 0 {
            return Err(FsError::InvalidArg("Capacity not a whole sector count"));
        }

        let data_pages_per_sector =
            (info.sector_size - HEADER_SIZE) / (ITEM_SIZE + info.page_size);
        if data_pages_per_sector == 0 {
            return Err(FsError::InvalidArg("Sector too small for any data page"));
        }
        if data_pages_per_sector > u8::MAX as u32 {
            return Err(FsError::InvalidArg("Item table too large for its header"));
        }
        let first_data_page = info.sector_size / info.page_size - data_pages_per_sector;
        if first_data_page > u8::MAX as u32 {
            return Err(FsError::InvalidArg("Metadata region too large for its header"));
        }

        let sector_count = info.capacity / info.sector_size;
        if sector_count < 2 {
            return Err(FsError::InvalidArg("Reclamation needs at least 2 sectors"));
        }

        Ok(Self {
            page_size: info.page_size,
            sector_size: info.sector_size,
            capacity: info.capacity,
            sector_count,
            data_pages_per_sector,
            first_data_page,
        })
    }

    #[inline]
    pub fn sector_addr(&self, sector: u32) -> u32 {
        sector * self.sector_size
    }

    /// Address of metadata item `i` of `sector`.
    #[inline]
    pub fn item_addr(&self, sector: u32, i: u32) -> u32 {
        self.sector_addr(sector) + HEADER_SIZE + i * ITEM_SIZE
    }

    /// Address of data page `i` of `sector`.
    #[inline]
    pub fn page_addr(&self, sector: u32, i: u32) -> u32 {
        self.sector_addr(sector) + (self.first_data_page + i) * self.page_size
    }

    /// Bytes occupied by the header and item table.
    #[inline]
    pub fn metadata_bytes(&self) -> u32 {
        HEADER_SIZE + self.data_pages_per_sector * ITEM_SIZE
    }

    #[inline]
    pub fn total_data_pages(&self) -> u32 {
        self.sector_count * self.data_pages_per_sector
    }

    /// Usable capacity once one sector's worth of pages is held back for
    /// reclamation to make progress.
    #[inline]
    pub fn usable_bytes(&self) -> u32 {
        (self.total_data_pages() - self.data_pages_per_sector) * self.page_size
    }
}
