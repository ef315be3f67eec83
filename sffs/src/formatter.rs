// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::vec;

use sffs_flash::Flash;
use zerocopy::IntoBytes;

use crate::constant::*;
use crate::error::FsResult;
use crate::meta::SffsMeta;
use crate::ops;
use crate::state::SectorState;
use crate::types::{MasterPage, MetadataHeader, MetadataItem};

/// Creates a fresh filesystem: erase everything, lay down every sector's
/// header and item table in the erased state, then store the master page
/// (file 0, block 0) through the regular claim/program/commit protocol.
pub fn format<F: Flash>(flash: &mut F, label: &str) -> FsResult {
    let info = flash.info();
    let meta = SffsMeta::from_info(&info)?;

    flash.chip_erase()?;

    // One metadata-region image, programmed into every sector page by page.
    let mut region = vec![ERASED_BYTE; meta.metadata_bytes() as usize];
    let header = MetadataHeader::erased(
        meta.first_data_page as u8,
        meta.data_pages_per_sector as u8,
    );
    region[..HEADER_SIZE as usize].copy_from_slice(header.as_bytes());
    let item = MetadataItem::erased();
    for i in 0..meta.data_pages_per_sector as usize {
        let off = (HEADER_SIZE + i as u32 * ITEM_SIZE) as usize;
        region[off..off + ITEM_SIZE as usize].copy_from_slice(item.as_bytes());
    }

    let ps = meta.page_size as usize;
    for sector in 0..meta.sector_count {
        let base = meta.sector_addr(sector);
        let mut off = 0usize;
        while off < region.len() {
            let chunk = (region.len() - off).min(ps);
            flash.page_write(base + off as u32, &region[off..off + chunk])?;
            off += chunk;
        }
    }

    let master = MasterPage::from_meta(&meta, label);
    ops::claim_item(flash, &meta, 0, 0, MASTER_FILE_ID, 0)?;
    ops::write_data_page(flash, &meta, 0, 0, master.as_bytes())?;
    ops::commit_item(flash, &meta, 0, 0, core::mem::size_of::<MasterPage>() as u16)?;
    ops::program_sector_state(flash, &meta, 0, SectorState::Used)?;

    log::debug!(
        "formatted {} sectors, {} data pages each",
        meta.sector_count,
        meta.data_pages_per_sector
    );
    Ok(())
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use crate::state::PageState;
    use sffs_flash::prelude::*;

    #[test]
    fn test_format_lays_out_every_sector() {
        let mut buf = vec![0u8; 32768];
        let mut flash = MemFlash::new(&mut buf);
        format(&mut flash, "test").unwrap();

        let meta = SffsMeta::from_info(&flash.info()).unwrap();
        for sector in 0..meta.sector_count {
            let header = ops::read_header(&mut flash, &meta, sector).unwrap();
            ops::header_check(&meta, &header).unwrap();
            let expected = if sector == 0 {
                SECTOR_STATE_USED
            } else {
                SECTOR_STATE_ERASED
            };
            assert_eq!(header.state, expected, "sector {sector}");

            for i in 0..meta.data_pages_per_sector {
                let item = ops::read_item(&mut flash, &meta, sector, i).unwrap();
                if sector == 0 && i == 0 {
                    assert_eq!(item.page_state(), Some(PageState::Used));
                    assert_eq!({ item.file_id }, MASTER_FILE_ID);
                } else {
                    assert!(item.is_free(), "sector {sector} item {i}");
                }
            }
        }
    }

    #[test]
    fn test_format_writes_valid_master() {
        let mut buf = vec![0u8; 32768];
        let mut flash = MemFlash::new(&mut buf);
        format(&mut flash, "lbl").unwrap();

        let meta = SffsMeta::from_info(&flash.info()).unwrap();
        let master: MasterPage = sffs_flash::FlashStructExt::read_struct(
            &mut flash,
            meta.page_addr(0, 0),
        )
        .unwrap();
        master.validate(&meta).unwrap();
        assert_eq!(&master.label_bytes()[..3], b"lbl");
    }

    #[test]
    fn test_format_twice_is_clean() {
        // The erase must bring every bit back; a second format reprograms
        // the exact same metadata without a verify failure.
        let mut buf = vec![0u8; 32768];
        let mut flash = MemFlash::new(&mut buf);
        format(&mut flash, "one").unwrap();
        format(&mut flash, "two").unwrap();

        let meta = SffsMeta::from_info(&flash.info()).unwrap();
        let master: MasterPage = sffs_flash::FlashStructExt::read_struct(
            &mut flash,
            meta.page_addr(0, 0),
        )
        .unwrap();
        assert_eq!(&master.label_bytes()[..3], b"two");
    }
}
