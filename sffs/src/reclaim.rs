// SPDX-License-Identifier: MIT

//! Sector reclamation.
//!
//! A sector whose items have gone OLD (or RESERVED) holds space nothing can
//! use until the whole sector is erased. Reclamation evacuates the sector's
//! surviving pages through the regular copy-on-write protocol, erases it,
//! and rewrites its header. Each step is a single flash operation, so a cut
//! anywhere leaves a state the next mount already knows how to read: worst
//! case is an all-0xFF sector, treated as erased with a pending header.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::vec;

use sffs_flash::Flash;

use crate::allocator::SectorCensus;
use crate::constant::*;
use crate::error::FsResult;
use crate::filesystem::SffsFs;
use crate::ops;
use crate::state::{PageState, SectorState};
use crate::types::MetadataItem;

impl<F: Flash> SffsFs<F> {
    /// Reclaims the best victim sector, if any. Returns whether anything
    /// was reclaimed.
    pub fn reclaim_once(&mut self) -> FsResult<bool> {
        match self.pick_victim() {
            Some(victim) => {
                self.reclaim_sector(victim)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs one reclamation when the dirty-sector count crosses the
    /// watermark. Keeps steady-state wear spread out instead of deferring
    /// every erase to the moment the allocator runs dry.
    pub(crate) fn maybe_reclaim(&mut self) -> FsResult {
        if self.dirty_sectors() > self.meta.sector_count / DIRTY_WATERMARK_DIV {
            match self.reclaim_once() {
                // Housekeeping that cannot stage its copies right now is
                // retried by a later trigger; the caller's operation is done.
                Ok(_) | Err(crate::error::FsError::NoSpace) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Victim choice: a sector with something to recover, preferring those
    /// with no erased pages left (dirty-full) over partially free ones,
    /// then the highest dead count, then the lowest index.
    fn pick_victim(&self) -> Option<u32> {
        let mut best: Option<(u32, (bool, u32))> = None;

        for (sector, cs) in self.census.iter().enumerate() {
            let dead = cs.dead();
            if dead == 0 {
                continue;
            }
            let rank = (cs.erased == 0, dead);
            match &best {
                Some((_, best_rank)) if *best_rank >= rank => {}
                _ => best = Some((sector as u32, rank)),
            }
        }
        best.map(|(sector, _)| sector)
    }

    fn reclaim_sector(&mut self, victim: u32) -> FsResult {
        let dpps = self.meta.data_pages_per_sector;

        // Evacuate survivors. Claimed-but-uncommitted and RESERVED items
        // carry no readable content and die with the sector.
        let mut moved = 0u32;
        for i in 0..dpps {
            let item = self.cached_item(victim, i)?;
            match item.page_state() {
                Some(state) if state.is_live() => {
                    self.relocate(victim, i, &item, state)?;
                    moved += 1;
                }
                _ => {}
            }
        }
        log::debug!("reclaiming sector {victim}, moved {moved} live page(s)");

        self.flash.sector_erase(self.meta.sector_addr(victim))?;
        self.cache.clear();
        self.census[victim as usize] = SectorCensus::erased_sector(dpps);

        ops::write_header(&mut self.flash, &self.meta, victim, SectorState::Erased)?;
        self.cache.clear();
        self.census[victim as usize].header = Some(SectorState::Erased);
        Ok(())
    }

    /// Moves one live page out of the victim through claim/program/commit,
    /// which supersedes the source copy like any other rewrite.
    fn relocate(
        &mut self,
        victim: u32,
        i: u32,
        item: &MetadataItem,
        state: PageState,
    ) -> FsResult {
        let (ns, ni) = self.ensure_free_page(true, Some(victim))?;
        let file_id = item.file_id;
        let block = item.block;
        let size = (item.size as u32).min(self.meta.page_size) as u16;

        if state == PageState::Used {
            self.demote(victim, i, PageState::Used, PageState::Moving)?;
        }
        self.claim(ns, ni, file_id, block)?;

        if size > 0 {
            let mut scratch = vec![0u8; size as usize];
            ops::read_data(&mut self.flash, &self.meta, victim, i, 0, &mut scratch)?;
            self.program_page(ns, ni, &scratch)?;
        }
        self.commit(ns, ni, size)?;
        self.demote(victim, i, PageState::Moving, PageState::Old)?;
        Ok(())
    }
}
