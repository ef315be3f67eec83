// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::string::String;

use core::fmt::Write as _;

use sffs_flash::Flash;

use crate::constant::*;
use crate::error::FsResult;
use crate::filesystem::SffsFs;

impl<F: Flash> SffsFs<F> {
    /// Renders the sector/page map, one sector per line:
    ///
    /// ```text
    /// 0003 [U]: [U] [U] [M] [ ] ...
    /// ```
    ///
    /// Sector states: ' ' erased, U used, F full, D dirty, '?' unknown or
    /// pending rewrite. Page states: ' ' erased, U used, M moving,
    /// R reserved, O old.
    pub fn debug_map(&mut self) -> FsResult<String> {
        let mut out = String::new();

        for sector in 0..self.meta.sector_count {
            let header = self.cached_header(sector)?;
            let sector_state = if header.is_blank() {
                '?'
            } else {
                match header.state {
                    SECTOR_STATE_ERASED => ' ',
                    SECTOR_STATE_USED => 'U',
                    SECTOR_STATE_FULL => 'F',
                    SECTOR_STATE_DIRTY => 'D',
                    _ => '?',
                }
            };
            let _ = write!(out, "{sector:04} [{sector_state}]: ");

            for i in 0..self.meta.data_pages_per_sector {
                let item = self.cached_item(sector, i)?;
                let page_state = match item.state {
                    PAGE_STATE_ERASED | ERASED_BYTE => ' ',
                    PAGE_STATE_USED => 'U',
                    PAGE_STATE_MOVING => 'M',
                    PAGE_STATE_RESERVED => 'R',
                    PAGE_STATE_OLD => 'O',
                    _ => '?',
                };
                let _ = write!(out, "[{page_state}] ");
            }
            out.push('\n');
        }
        Ok(out)
    }
}
