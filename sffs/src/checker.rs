// SPDX-License-Identifier: MIT

//! Filesystem invariant checker.
//!
//! Walks the raw metadata and reports every violation it can see: header
//! bytes that disagree with the item census, duplicate live items for one
//! (file_id, block), erased pages that are not actually blank, and a
//! missing or damaged master page. Tests run it after every scenario; the
//! CLI exposes it as `check`.

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{collections::BTreeMap, vec::Vec};
#[cfg(feature = "std")]
use std::collections::BTreeMap;

use sffs_flash::{Flash, FlashStructExt};

use crate::constant::*;
use crate::error::FsResult;
use crate::filesystem::SffsFs;
use crate::ops;
use crate::state::{derive_sector_state, PageState, SectorState};
use crate::types::MasterPage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
}

#[derive(Debug, Clone)]
pub struct Finding {
    pub severity: Severity,
    pub sector: Option<u32>,
    pub message: &'static str,
}

#[derive(Debug, Default)]
pub struct CheckReport {
    pub findings: Vec<Finding>,
}

impl CheckReport {
    pub fn is_clean(&self) -> bool {
        self.findings.is_empty()
    }

    pub fn has_error(&self) -> bool {
        self.findings
            .iter()
            .any(|f| f.severity == Severity::Error)
    }

    fn push(&mut self, severity: Severity, sector: Option<u32>, message: &'static str) {
        self.findings.push(Finding {
            severity,
            sector,
            message,
        });
    }
}

pub struct Checker<'a, F: Flash> {
    fs: &'a mut SffsFs<F>,
}

impl<'a, F: Flash> Checker<'a, F> {
    pub fn new(fs: &'a mut SffsFs<F>) -> Self {
        Self { fs }
    }

    pub fn check_all(&mut self) -> FsResult<CheckReport> {
        let mut report = CheckReport::default();
        self.check_sectors(&mut report)?;
        self.check_duplicates(&mut report)?;
        self.check_master(&mut report)?;
        Ok(report)
    }

    /// Per-sector: header validity, header/census agreement, and blank
    /// data pages behind erased items.
    fn check_sectors(&mut self, report: &mut CheckReport) -> FsResult {
        let meta = self.fs.meta().clone();

        for sector in 0..meta.sector_count {
            let header = self.fs.cached_header(sector)?;
            if header.is_blank() {
                // Legal post-crash state; the header returns on first use.
                report.push(Severity::Warning, Some(sector), "Blank header");
                continue;
            }
            if ops::header_check(&meta, &header).is_err() {
                report.push(Severity::Error, Some(sector), "Bad metadata header");
                continue;
            }
            let Some(stored) = SectorState::from_raw(header.state) else {
                report.push(Severity::Error, Some(sector), "Bad sector state byte");
                continue;
            };

            let (mut e, mut r, mut u, mut m, mut o) = (0u32, 0, 0, 0, 0);
            for i in 0..meta.data_pages_per_sector {
                let item = self.fs.cached_item(sector, i)?;
                match item.page_state() {
                    Some(PageState::Erased) => {
                        e += 1;
                        if item.is_free() && !self.data_page_blank(&meta, sector, i)? {
                            report.push(
                                Severity::Error,
                                Some(sector),
                                "Erased item over a programmed page",
                            );
                        }
                    }
                    Some(PageState::Reserved) => r += 1,
                    Some(PageState::Used) => u += 1,
                    Some(PageState::Moving) => m += 1,
                    Some(PageState::Old) => o += 1,
                    None => {
                        report.push(Severity::Error, Some(sector), "Bad page state byte")
                    }
                }
            }

            let derived = derive_sector_state(e, r, u, m, o, meta.data_pages_per_sector);
            if derived != stored {
                // A header one step behind is a crash artifact mount would
                // repair; anything else is a real inconsistency.
                if stored.can_program(derived) {
                    report.push(Severity::Warning, Some(sector), "Header lags census");
                } else {
                    report.push(Severity::Error, Some(sector), "Header ahead of census");
                }
            }
        }
        Ok(())
    }

    /// At most one USED item per (file_id, block), and never more than two
    /// live items in total.
    fn check_duplicates(&mut self, report: &mut CheckReport) -> FsResult {
        let meta = self.fs.meta().clone();
        let mut used: BTreeMap<(u16, u16), u32> = BTreeMap::new();
        let mut live: BTreeMap<(u16, u16), u32> = BTreeMap::new();

        for sector in 0..meta.sector_count {
            for i in 0..meta.data_pages_per_sector {
                let item = self.fs.cached_item(sector, i)?;
                match item.page_state() {
                    Some(PageState::Used) => {
                        *used.entry((item.file_id, item.block)).or_default() += 1;
                        *live.entry((item.file_id, item.block)).or_default() += 1;
                    }
                    Some(PageState::Moving) => {
                        *live.entry((item.file_id, item.block)).or_default() += 1;
                    }
                    _ => {}
                }
            }
        }

        if used.values().any(|&n| n > 1) {
            report.push(Severity::Error, None, "Duplicate USED item");
        }
        if live.values().any(|&n| n > 2) {
            report.push(Severity::Error, None, "More than two live items");
        }
        Ok(())
    }

    fn check_master(&mut self, report: &mut CheckReport) -> FsResult {
        let meta = self.fs.meta().clone();
        match self.fs.find_page(MASTER_FILE_ID, 0)? {
            Some(loc) => {
                let master: MasterPage = self
                    .fs
                    .flash
                    .read_struct(meta.page_addr(loc.sector, loc.item_idx))?;
                if master.validate(&meta).is_err() {
                    report.push(Severity::Error, Some(loc.sector), "Invalid master page");
                }
            }
            None => report.push(Severity::Error, None, "Missing master page"),
        }
        Ok(())
    }

    fn data_page_blank(&mut self, meta: &crate::meta::SffsMeta, sector: u32, i: u32) -> FsResult<bool> {
        let mut buf = [0u8; 64];
        let mut off = 0u32;
        while off < meta.page_size {
            let chunk = ((meta.page_size - off) as usize).min(buf.len());
            ops::read_data(&mut self.fs.flash, meta, sector, i, off, &mut buf[..chunk])?;
            if buf[..chunk].iter().any(|&b| b != ERASED_BYTE) {
                return Ok(false);
            }
            off += chunk as u32;
        }
        Ok(true)
    }
}
