// SPDX-License-Identifier: MIT

//! On-flash record operations.
//!
//! Every function here issues at most one program per call, and every program
//! only clears bits of what is already stored. The commit protocol for a data
//! page is:
//!
//! 1. `claim_item`: program `file_id` + `block`; state and size stay erased.
//!    A claimed item is invisible to readers and not allocatable.
//! 2. `write_data_page`: program the page content.
//! 3. `commit_item`: program `state = USED` and the final `size` together.
//!
//! A crash leaves either nothing, an abandoned claim (aged to RESERVED at the
//! next mount), or a fully committed page.

use sffs_flash::{Flash, FlashStructExt};

use crate::constant::*;
use crate::error::FsResult;
use crate::meta::SffsMeta;
use crate::state::{PageState, SectorState};
use crate::types::{MetadataHeader, MetadataItem};

const HEADER_STATE_OFFSET: u32 = 4;
const ITEM_STATE_OFFSET: u32 = 4;

pub fn read_header<F: Flash>(flash: &mut F, meta: &SffsMeta, sector: u32) -> FsResult<MetadataHeader> {
    Ok(flash.read_struct::<MetadataHeader>(meta.sector_addr(sector))?)
}

pub fn read_item<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
) -> FsResult<MetadataItem> {
    Ok(flash.read_struct::<MetadataItem>(meta.item_addr(sector, i))?)
}

/// Sanity checks on a metadata header, as run against every sector at mount.
pub fn header_check(meta: &SffsMeta, header: &MetadataHeader) -> FsResult {
    if header.magic != METADATA_MAGIC {
        return Err(crate::error::FsError::Corrupt("Bad metadata magic"));
    }
    if header.metadata_page_count as u32 >= meta.sector_size / meta.page_size {
        return Err(crate::error::FsError::Corrupt(
            "Metadata page count exceeds sector",
        ));
    }
    if header.metadata_item_count as u32 != meta.data_pages_per_sector {
        return Err(crate::error::FsError::Corrupt("Metadata item count mismatch"));
    }
    Ok(())
}

/// Programs a complete header onto a freshly erased sector.
pub fn write_header<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    state: SectorState,
) -> FsResult {
    let mut header = MetadataHeader::erased(
        meta.first_data_page as u8,
        meta.data_pages_per_sector as u8,
    );
    header.state = state.code();
    flash.write_struct(meta.sector_addr(sector), &header)?;
    Ok(())
}

/// Single-byte forward move of a sector's header state.
pub fn program_sector_state<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    to: SectorState,
) -> FsResult {
    flash.page_write(meta.sector_addr(sector) + HEADER_STATE_OFFSET, &[to.code()])?;
    Ok(())
}

/// Binds an erased item to (file_id, block) without committing it.
pub fn claim_item<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
    file_id: u16,
    block: u16,
) -> FsResult {
    let mut bytes = [0u8; 4];
    bytes[0..2].copy_from_slice(&file_id.to_le_bytes());
    bytes[2..4].copy_from_slice(&block.to_le_bytes());
    flash.page_write(meta.item_addr(sector, i), &bytes)?;
    Ok(())
}

/// Commits a claimed item: state and size in one program.
pub fn commit_item<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
    size: u16,
) -> FsResult {
    let mut bytes = [0u8; 3];
    bytes[0] = PAGE_STATE_USED;
    bytes[1..3].copy_from_slice(&size.to_le_bytes());
    flash.page_write(meta.item_addr(sector, i) + ITEM_STATE_OFFSET, &bytes)?;
    Ok(())
}

/// Single-byte forward move of an item's state.
pub fn program_item_state<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
    to: PageState,
) -> FsResult {
    flash.page_write(meta.item_addr(sector, i) + ITEM_STATE_OFFSET, &[to.code()])?;
    Ok(())
}

/// Programs `data` into data page `i` of `sector`, starting at its base.
pub fn write_data_page<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
    data: &[u8],
) -> FsResult {
    debug_assert!(data.len() as u32 <= meta.page_size);
    flash.page_write(meta.page_addr(sector, i), data)?;
    Ok(())
}

/// Reads from data page `i` of `sector` at `offset`.
pub fn read_data<F: Flash>(
    flash: &mut F,
    meta: &SffsMeta,
    sector: u32,
    i: u32,
    offset: u32,
    buf: &mut [u8],
) -> FsResult {
    flash.page_read(meta.page_addr(sector, i) + offset, buf)?;
    Ok(())
}
