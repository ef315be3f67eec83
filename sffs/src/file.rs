// SPDX-License-Identifier: MIT

//! File-level I/O: the copy-on-write write path and the block-wise read
//! path.
//!
//! A handle carries only (file_id, position, mode). It never holds a page
//! address: copy-on-write relocates pages under every update, so each access
//! re-resolves (file_id, block) through the locator.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::vec;

use sffs_flash::Flash;

use crate::constant::*;
use crate::error::{FsError, FsResult};
use crate::filesystem::SffsFs;
use crate::ops;
use crate::state::PageState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Reads only; the file must exist.
    Read,
    /// Read/write from position 0. Existing content past the written range
    /// is kept.
    Overwrite,
    /// Read/write from the current end of file.
    Append,
}

/// An open file. Cheap, plain state; dropping one loses nothing.
#[derive(Debug, Clone)]
pub struct FileHandle {
    file_id: u16,
    pos: u32,
    mode: OpenMode,
}

impl FileHandle {
    pub(crate) fn new(file_id: u16, pos: u32, mode: OpenMode) -> Self {
        Self { file_id, pos, mode }
    }

    #[inline]
    pub fn file_id(&self) -> u16 {
        self.file_id
    }

    #[inline]
    pub fn pos(&self) -> u32 {
        self.pos
    }

    #[inline]
    pub fn mode(&self) -> OpenMode {
        self.mode
    }

    #[inline]
    pub(crate) fn set_pos(&mut self, pos: u32) {
        self.pos = pos;
    }

    #[inline]
    pub(crate) fn advance(&mut self, n: u32) {
        self.pos += n;
    }
}

impl<F: Flash> SffsFs<F> {
    /// Logical length of a file: the furthest byte any live page covers.
    /// Interior pages are committed with `size = page_size`, so for a file
    /// without holes this equals the sum of the per-page sizes.
    pub(crate) fn file_len(&mut self, file_id: u16) -> FsResult<Option<u32>> {
        let dpps = self.meta.data_pages_per_sector;
        let ps = self.meta.page_size;
        let mut found = false;
        let mut len = 0u32;

        for sector in 0..self.meta.sector_count {
            if self.census[sector as usize].live() == 0 {
                continue;
            }
            for i in 0..dpps {
                let item = self.cached_item(sector, i)?;
                if item.file_id != file_id {
                    continue;
                }
                match item.page_state() {
                    Some(state) if state.is_live() => {
                        found = true;
                        let size = (item.size as u32).min(ps);
                        len = len.max(item.block as u32 * ps + size);
                    }
                    _ => {}
                }
            }
        }
        Ok(if found { Some(len) } else { None })
    }

    /// Reads up to `buf.len()` bytes at `pos`. Returns a short count at EOF
    /// and 0 past it. Holes and page bytes beyond the committed size read
    /// as zeros.
    pub(crate) fn read_at(&mut self, file_id: u16, pos: u32, buf: &mut [u8]) -> FsResult<usize> {
        let total = self.file_len(file_id)?.ok_or(FsError::NotFound)?;
        if pos >= total || buf.is_empty() {
            return Ok(0);
        }

        let ps = self.meta.page_size;
        let n = buf.len().min((total - pos) as usize);
        let mut done = 0usize;
        let mut cur = pos;

        while done < n {
            let block = (cur / ps) as u16;
            let off = cur % ps;
            let chunk = ((ps - off) as usize).min(n - done);
            let out = &mut buf[done..done + chunk];

            match self.find_page(file_id, block)? {
                Some(loc) => {
                    let size = (loc.item.size as u32).min(ps);
                    let stored = size.saturating_sub(off).min(chunk as u32) as usize;
                    if stored > 0 {
                        ops::read_data(
                            &mut self.flash,
                            &self.meta,
                            loc.sector,
                            loc.item_idx,
                            off,
                            &mut out[..stored],
                        )?;
                    }
                    out[stored..].fill(0);
                }
                None => out.fill(0),
            }

            done += chunk;
            cur += chunk as u32;
        }
        Ok(n)
    }

    /// Copy-on-write write of `buf` at `pos`, block by block. Every touched
    /// block moves to a freshly claimed page; the old page is demoted
    /// MOVING then OLD around the commit, so a cut at any point leaves one
    /// readable copy.
    pub(crate) fn write_at(&mut self, file_id: u16, pos: u32, buf: &[u8]) -> FsResult {
        if buf.is_empty() {
            return Ok(());
        }
        if buf.len() > (u32::MAX / 2) as usize {
            return Err(FsError::InvalidArg("Write length too large"));
        }
        let end = pos
            .checked_add(buf.len() as u32)
            .ok_or(FsError::InvalidArg("Write past end of address space"))?;

        let ps = self.meta.page_size;
        let b_start = pos / ps;
        let b_end = (end - 1) / ps;
        if b_end > MAX_BLOCK as u32 {
            return Err(FsError::InvalidArg("Block index out of range"));
        }

        let old_len = self.file_len(file_id)?.unwrap_or(0);
        let new_len = old_len.max(end);
        let mut scratch = vec![0u8; ps as usize];

        for b in b_start..=b_end {
            let block_base = b * ps;
            let dest_off = pos.saturating_sub(block_base);
            let dest_len = (ps - dest_off).min(end - block_base - dest_off);
            let src_off = (block_base + dest_off - pos) as usize;

            // Post-write image of the whole block: old content (zeros for a
            // hole or past the committed size), then the user's slice.
            scratch.fill(0);
            if let Some(loc) = self.find_page(file_id, b as u16)? {
                let size = (loc.item.size as u32).min(ps) as usize;
                if size > 0 {
                    ops::read_data(
                        &mut self.flash,
                        &self.meta,
                        loc.sector,
                        loc.item_idx,
                        0,
                        &mut scratch[..size],
                    )?;
                }
            }
            scratch[dest_off as usize..(dest_off + dest_len) as usize]
                .copy_from_slice(&buf[src_off..src_off + dest_len as usize]);

            let block_size = (new_len - block_base).min(ps) as u16;
            self.rewrite_block(file_id, b as u16, &scratch, block_size)?;
        }

        self.maybe_reclaim()
    }

    /// One block of the COW sequence: reserve, supersede, program, commit,
    /// retire.
    fn rewrite_block(&mut self, file_id: u16, block: u16, data: &[u8], size: u16) -> FsResult {
        let (ns, ni) = self.ensure_free_page(false, None)?;

        // Reclamation inside ensure_free_page may have relocated the old
        // copy; resolve it afterwards so the demotions hit the right item.
        let old = self.find_page(file_id, block)?;

        if let Some(loc) = &old {
            if loc.item.page_state() == Some(PageState::Used) {
                self.demote(loc.sector, loc.item_idx, PageState::Used, PageState::Moving)?;
            }
        }

        self.claim(ns, ni, file_id, block)?;
        self.program_page(ns, ni, data)?;
        self.commit(ns, ni, size)?;

        if let Some(loc) = &old {
            self.demote(loc.sector, loc.item_idx, PageState::Moving, PageState::Old)?;
        }
        Ok(())
    }
}
