// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use sffs_flash::{Flash, FlashStructExt};
use zerocopy::{FromBytes, IntoBytes};

use crate::cache::PageCache;
use crate::constant::*;
use crate::error::{FsError, FsResult};
use crate::meta::SffsMeta;
use crate::ops;
use crate::state::{PageState, SectorState};
use crate::types::{MasterPage, MetadataHeader, MetadataItem};

pub use crate::allocator::{PageLoc, SectorCensus};
pub use crate::file::{FileHandle, OpenMode};

/// A mounted SFFS filesystem.
///
/// Owns the flash device exclusively for its lifetime. All operations are
/// synchronous and single-threaded; an interrupted call is equivalent to a
/// power loss and the next mount repairs whatever it left behind.
pub struct SffsFs<F: Flash> {
    pub(crate) flash: F,
    pub(crate) meta: SffsMeta,
    pub(crate) census: Vec<SectorCensus>,
    pub(crate) cache: PageCache,
    label: [u8; LABEL_SIZE],
}

impl<F: Flash> SffsFs<F> {
    /// Mounts a formatted device: reads the geometry, scans every sector's
    /// metadata into the census, repairs crash leftovers, and validates the
    /// master page.
    pub fn mount(flash: F) -> FsResult<Self> {
        let info = flash.info();
        let meta = SffsMeta::from_info(&info)?;

        let mut fs = Self {
            cache: PageCache::new(meta.page_size),
            flash,
            meta,
            census: Vec::new(),
            label: [0u8; LABEL_SIZE],
        };
        fs.scan()?;
        fs.repair()?;
        fs.load_master()?;
        log::debug!(
            "mounted: {} sectors, {} free pages",
            fs.meta.sector_count,
            fs.free_pages()
        );
        Ok(fs)
    }

    /// Creates a fresh filesystem on `flash`. The device is erased.
    pub fn format(flash: &mut F, label: &str) -> FsResult {
        crate::formatter::format(flash, label)
    }

    /// Unmounts, handing the flash device back.
    pub fn free(self) -> F {
        self.flash
    }

    /// Drops every cached page. Never fails.
    pub fn cache_clear(&mut self) {
        self.cache.clear();
    }

    #[inline]
    pub fn meta(&self) -> &SffsMeta {
        &self.meta
    }

    #[inline]
    pub fn label_bytes(&self) -> [u8; LABEL_SIZE] {
        self.label
    }

    // === Cached metadata reads ===

    pub(crate) fn cached_header(&mut self, sector: u32) -> FsResult<MetadataHeader> {
        let mut buf = [0u8; HEADER_SIZE as usize];
        self.cache
            .read(&mut self.flash, self.meta.sector_addr(sector), &mut buf)?;
        MetadataHeader::read_from_bytes(&buf).map_err(|_| FsError::Corrupt("Short header read"))
    }

    pub(crate) fn cached_item(&mut self, sector: u32, i: u32) -> FsResult<MetadataItem> {
        let mut buf = [0u8; ITEM_SIZE as usize];
        self.cache
            .read(&mut self.flash, self.meta.item_addr(sector, i), &mut buf)?;
        MetadataItem::read_from_bytes(&buf).map_err(|_| FsError::Corrupt("Short item read"))
    }

    // === Census-updating program wrappers ===
    //
    // Every metadata program goes through one of these so the in-RAM census
    // and the header byte stay in step with the flash.

    pub(crate) fn claim(&mut self, sector: u32, i: u32, file_id: u16, block: u16) -> FsResult {
        // A sector erased right before a crash has no header yet; it must
        // come back before the first item program, or the sector would hold
        // metadata behind a blank header.
        if self.census[sector as usize].header.is_none() {
            ops::write_header(&mut self.flash, &self.meta, sector, SectorState::Erased)?;
            self.cache.clear();
            self.census[sector as usize].header = Some(SectorState::Erased);
        }
        ops::claim_item(&mut self.flash, &self.meta, sector, i, file_id, block)?;
        self.cache.clear();
        self.census[sector as usize].claimed += 1;
        Ok(())
    }

    pub(crate) fn commit(&mut self, sector: u32, i: u32, size: u16) -> FsResult {
        ops::commit_item(&mut self.flash, &self.meta, sector, i, size)?;
        self.cache.clear();
        let cs = &mut self.census[sector as usize];
        cs.claimed -= 1;
        cs.erased -= 1;
        cs.used += 1;
        self.refresh_header(sector)
    }

    pub(crate) fn demote(
        &mut self,
        sector: u32,
        i: u32,
        from: PageState,
        to: PageState,
    ) -> FsResult {
        debug_assert!(from.can_program(to));
        ops::program_item_state(&mut self.flash, &self.meta, sector, i, to)?;
        self.cache.clear();
        let cs = &mut self.census[sector as usize];
        cs.forget(from);
        cs.note(to);
        self.refresh_header(sector)
    }

    /// Ages an abandoned claim (mount repair): state stays formally erased
    /// on the item until this program lands RESERVED.
    pub(crate) fn abandon_claim(&mut self, sector: u32, i: u32) -> FsResult {
        ops::program_item_state(&mut self.flash, &self.meta, sector, i, PageState::Reserved)?;
        self.cache.clear();
        let cs = &mut self.census[sector as usize];
        cs.claimed -= 1;
        cs.erased -= 1;
        cs.reserved += 1;
        self.refresh_header(sector)
    }

    pub(crate) fn program_page(&mut self, sector: u32, i: u32, data: &[u8]) -> FsResult {
        ops::write_data_page(&mut self.flash, &self.meta, sector, i, data)
    }

    /// Brings the stored header state up to the census-derived one. A blank
    /// header (post-crash erase) is written in full on its first use here.
    pub(crate) fn refresh_header(&mut self, sector: u32) -> FsResult {
        let dpps = self.meta.data_pages_per_sector;
        let derived = self.census[sector as usize].derived(dpps);
        match self.census[sector as usize].header {
            None => {
                ops::write_header(&mut self.flash, &self.meta, sector, derived)?;
                self.cache.clear();
                self.census[sector as usize].header = Some(derived);
            }
            Some(current) if current == derived => {}
            Some(current) if current.can_program(derived) => {
                ops::program_sector_state(&mut self.flash, &self.meta, sector, derived)?;
                self.cache.clear();
                self.census[sector as usize].header = Some(derived);
            }
            // The census never derives a state behind the stored one.
            Some(_) => {}
        }
        Ok(())
    }

    // === Mount internals ===

    fn scan(&mut self) -> FsResult {
        let dpps = self.meta.data_pages_per_sector;
        self.census.clear();

        for sector in 0..self.meta.sector_count {
            let header = self.cached_header(sector)?;
            let mut cs = SectorCensus::default();

            if header.is_blank() {
                // Crash window between sector erase and header rewrite:
                // acceptable only if the whole item table is still blank.
                for i in 0..dpps {
                    let item = self.cached_item(sector, i)?;
                    if !item.as_bytes().iter().all(|&b| b == ERASED_BYTE) {
                        return Err(FsError::Corrupt("Items behind a blank header"));
                    }
                }
                cs.erased = dpps;
                cs.header = None;
            } else {
                ops::header_check(&self.meta, &header)?;
                cs.header =
                    Some(SectorState::from_raw(header.state).ok_or(FsError::Corrupt("Bad sector state"))?);
                for i in 0..dpps {
                    let item = self.cached_item(sector, i)?;
                    let state = item
                        .page_state()
                        .ok_or(FsError::Corrupt("Bad page state"))?;
                    cs.note(state);
                    if item.is_abandoned_claim() {
                        cs.claimed += 1;
                    }
                }
            }
            self.census.push(cs);
        }
        Ok(())
    }

    /// Restores the invariants a power loss may have broken: abandoned
    /// claims are aged to RESERVED, duplicate live items are resolved in
    /// scan order, and header bytes lagging the census are brought forward.
    fn repair(&mut self) -> FsResult {
        let dpps = self.meta.data_pages_per_sector;

        // Abandoned claims: age them so their half-programmed data pages are
        // never handed out again.
        let mut aged = 0u32;
        for sector in 0..self.meta.sector_count {
            if self.census[sector as usize].claimed == 0 {
                continue;
            }
            for i in 0..dpps {
                if self.cached_item(sector, i)?.is_abandoned_claim() {
                    self.abandon_claim(sector, i)?;
                    aged += 1;
                }
            }
        }
        if aged > 0 {
            log::warn!("mount: aged {aged} abandoned claim(s)");
        }

        // Duplicate live items for one (file_id, block): keep the first USED
        // in scan order, else the first MOVING; everything else goes OLD.
        let mut live: Vec<(u16, u16, u32, u32, PageState)> = Vec::new();
        for sector in 0..self.meta.sector_count {
            if self.census[sector as usize].live() == 0 {
                continue;
            }
            for i in 0..dpps {
                let item = self.cached_item(sector, i)?;
                if let Some(state) = item.page_state() {
                    if state.is_live() {
                        live.push((item.file_id, item.block, sector, i, state));
                    }
                }
            }
        }

        let mut keeper: BTreeMap<(u16, u16), (u32, u32)> = BTreeMap::new();
        for &(id, block, sector, i, state) in &live {
            if state == PageState::Used {
                keeper.entry((id, block)).or_insert((sector, i));
            }
        }
        for &(id, block, sector, i, state) in &live {
            if state == PageState::Moving {
                keeper.entry((id, block)).or_insert((sector, i));
            }
        }
        let mut demoted = 0u32;
        for &(id, block, sector, i, state) in &live {
            if keeper.get(&(id, block)) != Some(&(sector, i)) {
                self.demote(sector, i, state, PageState::Old)?;
                demoted += 1;
            }
        }
        if demoted > 0 {
            log::warn!("mount: demoted {demoted} superseded page(s)");
        }

        // Headers that missed their update before the cut.
        for sector in 0..self.meta.sector_count {
            if let Some(current) = self.census[sector as usize].header {
                let derived = self.census[sector as usize].derived(dpps);
                if current != derived && current.can_program(derived) {
                    log::debug!("mount: header of sector {sector} lagged, advancing");
                    ops::program_sector_state(&mut self.flash, &self.meta, sector, derived)?;
                    self.cache.clear();
                    self.census[sector as usize].header = Some(derived);
                }
            }
        }
        Ok(())
    }

    fn load_master(&mut self) -> FsResult {
        let loc = self
            .find_page(MASTER_FILE_ID, 0)?
            .ok_or(FsError::Corrupt("Missing master page"))?;
        let master: MasterPage = self
            .flash
            .read_struct(self.meta.page_addr(loc.sector, loc.item_idx))?;
        master.validate(&self.meta)?;
        self.label = master.label_bytes();
        Ok(())
    }

    // === File surface ===

    pub(crate) fn check_user_id(file_id: u16) -> FsResult {
        if file_id == MASTER_FILE_ID || file_id > MAX_FILE_ID {
            return Err(FsError::InvalidArg("File id outside user range"));
        }
        Ok(())
    }

    /// Opens a file by id. `Read` requires the file to exist; the write
    /// modes bring it into existence at the first committed page.
    pub fn open_id(&mut self, file_id: u16, mode: OpenMode) -> FsResult<FileHandle> {
        Self::check_user_id(file_id)?;
        let len = self.file_len(file_id)?;
        let pos = match mode {
            OpenMode::Read => {
                if len.is_none() {
                    return Err(FsError::NotFound);
                }
                0
            }
            OpenMode::Overwrite => 0,
            OpenMode::Append => len.unwrap_or(0),
        };
        Ok(FileHandle::new(file_id, pos, mode))
    }

    /// Nothing is buffered, so closing is bookkeeping only.
    pub fn close(&mut self, _f: FileHandle) -> FsResult {
        Ok(())
    }

    pub fn read(&mut self, f: &mut FileHandle, buf: &mut [u8]) -> FsResult<usize> {
        let n = self.read_at(f.file_id(), f.pos(), buf)?;
        f.advance(n as u32);
        Ok(n)
    }

    pub fn write(&mut self, f: &mut FileHandle, buf: &[u8]) -> FsResult {
        if f.mode() == OpenMode::Read {
            return Err(FsError::InvalidArg("Handle is read-only"));
        }
        self.write_at(f.file_id(), f.pos(), buf)?;
        f.advance(buf.len() as u32);
        Ok(())
    }

    pub fn read_pos(&mut self, f: &mut FileHandle, buf: &mut [u8], pos: u32) -> FsResult<usize> {
        self.seek(f, pos);
        self.read(f, buf)
    }

    pub fn write_pos(&mut self, f: &mut FileHandle, buf: &[u8], pos: u32) -> FsResult {
        self.seek(f, pos);
        self.write(f, buf)
    }

    /// Positions the handle; writing past EOF later leaves a hole that
    /// reads back as zeros.
    pub fn seek(&mut self, f: &mut FileHandle, pos: u32) {
        f.set_pos(pos);
    }

    pub fn file_size(&mut self, file_id: u16) -> FsResult<u32> {
        Self::check_user_id(file_id)?;
        self.file_len(file_id)?.ok_or(FsError::NotFound)
    }

    /// Demotes every live page of the file; the space comes back with the
    /// next reclamation of the affected sectors.
    pub fn file_remove(&mut self, file_id: u16) -> FsResult {
        Self::check_user_id(file_id)?;
        let dpps = self.meta.data_pages_per_sector;
        let mut found = false;

        for sector in 0..self.meta.sector_count {
            if self.census[sector as usize].live() == 0 {
                continue;
            }
            for i in 0..dpps {
                let item = self.cached_item(sector, i)?;
                if item.file_id != file_id {
                    continue;
                }
                if let Some(state) = item.page_state() {
                    if state.is_live() {
                        self.demote(sector, i, state, PageState::Old)?;
                        found = true;
                    }
                }
            }
        }

        if !found {
            return Err(FsError::NotFound);
        }
        self.maybe_reclaim()
    }
}
