// SPDX-License-Identifier: MIT

//! Page allocation and lookup.
//!
//! Both locators are deterministic linear scans (sector ascending, item
//! ascending). An in-RAM census of item states per sector, rebuilt by the
//! mount scan, backs the sector-level decisions; the flash itself stays the
//! source of truth for item lookups.

use sffs_flash::Flash;

use crate::error::{FsError, FsResult};
use crate::filesystem::SffsFs;
use crate::state::{derive_sector_state, PageState, SectorState};
use crate::types::MetadataItem;

/// Item-state counts for one sector, plus the cached header state.
#[derive(Debug, Clone, Copy, Default)]
pub struct SectorCensus {
    pub erased: u32,
    pub reserved: u32,
    pub used: u32,
    pub moving: u32,
    pub old: u32,
    /// Erased-state items whose file_id has been programmed (claims in
    /// flight, or crash leftovers before mount repair). Not allocatable.
    pub claimed: u32,
    /// Stored header state; `None` for an all-0xFF header (sector erased,
    /// header rewrite pending on first use).
    pub header: Option<SectorState>,
}

impl SectorCensus {
    /// Census of a freshly erased sector with a pending header.
    pub fn erased_sector(dpps: u32) -> Self {
        Self {
            erased: dpps,
            ..Self::default()
        }
    }

    #[inline]
    pub fn note(&mut self, state: PageState) {
        match state {
            PageState::Erased => self.erased += 1,
            PageState::Reserved => self.reserved += 1,
            PageState::Used => self.used += 1,
            PageState::Moving => self.moving += 1,
            PageState::Old => self.old += 1,
        }
    }

    #[inline]
    pub fn forget(&mut self, state: PageState) {
        match state {
            PageState::Erased => self.erased -= 1,
            PageState::Reserved => self.reserved -= 1,
            PageState::Used => self.used -= 1,
            PageState::Moving => self.moving -= 1,
            PageState::Old => self.old -= 1,
        }
    }

    /// Erased items actually available for allocation.
    #[inline]
    pub fn free(&self) -> u32 {
        self.erased - self.claimed
    }

    /// Pages holding current file content.
    #[inline]
    pub fn live(&self) -> u32 {
        self.used + self.moving
    }

    /// Pages whose space an erase would recover.
    #[inline]
    pub fn dead(&self) -> u32 {
        self.old + self.reserved
    }

    /// Sector state as the census function defines it.
    #[inline]
    pub fn derived(&self, dpps: u32) -> SectorState {
        derive_sector_state(
            self.erased,
            self.reserved,
            self.used,
            self.moving,
            self.old,
            dpps,
        )
    }
}

/// A located metadata item.
#[derive(Debug, Clone, Copy)]
pub struct PageLoc {
    pub sector: u32,
    pub item_idx: u32,
    pub item: MetadataItem,
}

impl<F: Flash> SffsFs<F> {
    /// Finds the canonical page for (file_id, block).
    ///
    /// USED wins over MOVING: during the commit window of a copy-on-write
    /// update both can exist, and the committed copy is the newer content.
    /// Only fully erased sectors are skipped; a dirty sector still holds
    /// live pages until reclamation evacuates them.
    pub(crate) fn find_page(&mut self, file_id: u16, block: u16) -> FsResult<Option<PageLoc>> {
        let dpps = self.meta.data_pages_per_sector;
        let mut moving: Option<PageLoc> = None;

        for sector in 0..self.meta.sector_count {
            if self.census[sector as usize].derived(dpps) == SectorState::Erased {
                continue;
            }
            for item_idx in 0..dpps {
                let item = self.cached_item(sector, item_idx)?;
                if !item.matches(file_id, block) {
                    continue;
                }
                match item.page_state() {
                    Some(PageState::Used) => {
                        return Ok(Some(PageLoc {
                            sector,
                            item_idx,
                            item,
                        }))
                    }
                    Some(PageState::Moving) if moving.is_none() => {
                        moving = Some(PageLoc {
                            sector,
                            item_idx,
                            item,
                        });
                    }
                    _ => {}
                }
            }
        }
        Ok(moving)
    }

    /// Finds an erased page to program, skipping full and dirty sectors.
    ///
    /// Sectors already in USED state are preferred over ERASED ones so that
    /// partial sectors fill up before a fresh sector is touched.
    pub(crate) fn find_erased_page(&mut self, exclude: Option<u32>) -> FsResult<Option<(u32, u32)>> {
        let dpps = self.meta.data_pages_per_sector;

        for pass in [SectorState::Used, SectorState::Erased] {
            for sector in 0..self.meta.sector_count {
                if exclude == Some(sector) {
                    continue;
                }
                let cs = self.census[sector as usize];
                if cs.free() == 0 || cs.derived(dpps) != pass {
                    continue;
                }
                for item_idx in 0..dpps {
                    let item = self.cached_item(sector, item_idx)?;
                    if item.is_free() {
                        return Ok(Some((sector, item_idx)));
                    }
                }
            }
        }
        Ok(None)
    }

    /// Erased pages available device-wide.
    pub(crate) fn free_pages(&self) -> u32 {
        self.census.iter().map(|cs| cs.free()).sum()
    }

    pub(crate) fn dirty_sectors(&self) -> u32 {
        let dpps = self.meta.data_pages_per_sector;
        self.census
            .iter()
            .filter(|cs| cs.derived(dpps) == SectorState::Dirty)
            .count() as u32
    }

    /// Yields an erased page for a writer, reclaiming as needed.
    ///
    /// Normal writes keep one sector's worth of pages in reserve so that
    /// reclamation can always stage a full sector; reclamation itself
    /// (`for_reclaim`) bypasses the reserve and must avoid its victim.
    pub(crate) fn ensure_free_page(
        &mut self,
        for_reclaim: bool,
        exclude: Option<u32>,
    ) -> FsResult<(u32, u32)> {
        if for_reclaim {
            return self.find_erased_page(exclude)?.ok_or(FsError::NoSpace);
        }

        let reserve = self.meta.data_pages_per_sector;
        loop {
            if self.free_pages() > reserve {
                if let Some(loc) = self.find_erased_page(None)? {
                    return Ok(loc);
                }
            }
            if !self.reclaim_once()? {
                return Err(FsError::NoSpace);
            }
        }
    }
}
