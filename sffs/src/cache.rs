// SPDX-License-Identifier: MIT

#[cfg(all(not(feature = "std"), feature = "alloc"))]
use alloc::{vec, vec::Vec};

use sffs_flash::Flash;

use crate::error::FsResult;

/// Single-page read-through cache for metadata reads.
///
/// Mount and the locators re-read the same header/item page many times in a
/// row; holding the last metadata page turns a sector scan into one flash
/// read. Any program or erase drops the cached page.
#[derive(Debug)]
pub(crate) struct PageCache {
    page_size: u32,
    base: Option<u32>,
    buf: Vec<u8>,
}

impl PageCache {
    pub fn new(page_size: u32) -> Self {
        Self {
            page_size,
            base: None,
            buf: vec![0u8; page_size as usize],
        }
    }

    /// Reads `out.len()` bytes at `addr`; the containing page must hold the
    /// whole range (metadata records never straddle pages).
    pub fn read<F: Flash>(&mut self, flash: &mut F, addr: u32, out: &mut [u8]) -> FsResult {
        let base = addr / self.page_size * self.page_size;
        if self.base != Some(base) {
            flash.page_read(base, &mut self.buf)?;
            self.base = Some(base);
        }
        let off = (addr - base) as usize;
        out.copy_from_slice(&self.buf[off..off + out.len()]);
        Ok(())
    }

    #[inline]
    pub fn clear(&mut self) {
        self.base = None;
    }
}

#[cfg(all(test, feature = "std"))]
mod tests {
    use super::*;
    use sffs_flash::prelude::*;

    #[test]
    fn test_hit_and_invalidate() {
        let mut buf = vec![0xFFu8; 8192];
        let mut flash = MemFlash::new(&mut buf);
        flash.page_write(8, &[1, 2, 3, 4]).unwrap();

        let mut counted = CountingFlash::new(&mut flash);
        let mut cache = PageCache::new(256);

        let mut out = [0u8; 4];
        cache.read(&mut counted, 8, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
        cache.read(&mut counted, 16, &mut [0u8; 8]).unwrap();
        // Second read hit the cache.
        assert_eq!(counted.stats.page_reads, 1);

        counted.page_write(16, &[9; 4]).unwrap();
        cache.clear();
        cache.read(&mut counted, 8, &mut out).unwrap();
        assert_eq!(counted.stats.page_reads, 2);
    }
}
