// SPDX-License-Identifier: MIT
#![allow(dead_code)]

use crate::{Flash, FlashError, FlashInfo, FlashResult};

/// Simple counters, no_std friendly.
#[derive(Clone, Copy, Default, Debug)]
pub struct FlashStats {
    pub page_reads: u64,
    pub read_bytes: u64,
    pub page_writes: u64,
    pub write_bytes: u64,
    pub sector_erases: u64,
    pub block_erases: u64,
    pub chip_erases: u64,
}

impl FlashStats {
    #[inline]
    pub fn reset(&mut self) {
        *self = FlashStats::default();
    }

    /// Total mutating operations (programs + erases).
    #[inline]
    pub fn mutations(&self) -> u64 {
        self.page_writes + self.sector_erases + self.block_erases + self.chip_erases
    }
}

/// Transparent instrumentation wrapper.
///
/// Counts every operation and can simulate power loss: once `fail_after(n)`
/// is armed, the n-th and every later mutating operation fails with
/// `FlashError::PowerCut` before touching the device. Reads keep working,
/// the way a rebooted board reads whatever the cut left behind.
pub struct CountingFlash<'a, F: Flash + ?Sized> {
    inner: &'a mut F,
    pub stats: FlashStats,
    fuse: Option<u64>,
}

impl<'a, F: Flash + ?Sized> CountingFlash<'a, F> {
    #[inline]
    pub fn new(inner: &'a mut F) -> Self {
        Self {
            inner,
            stats: FlashStats::default(),
            fuse: None,
        }
    }

    /// Arms the power-cut fuse: `budget` more mutating operations will
    /// succeed, then every mutation fails.
    #[inline]
    pub fn fail_after(&mut self, budget: u64) {
        self.fuse = Some(budget);
    }

    /// Disarms the fuse.
    #[inline]
    pub fn disarm(&mut self) {
        self.fuse = None;
    }

    /// True once the fuse has blown.
    #[inline]
    pub fn power_cut(&self) -> bool {
        self.fuse == Some(0)
    }

    #[inline]
    pub fn snapshot(&self) -> FlashStats {
        self.stats
    }

    #[inline]
    pub fn into_inner(self) -> &'a mut F {
        self.inner
    }

    #[inline]
    fn burn(&mut self) -> FlashResult {
        match self.fuse {
            Some(0) => Err(FlashError::PowerCut),
            Some(ref mut n) => {
                *n -= 1;
                Ok(())
            }
            None => Ok(()),
        }
    }
}

impl<'a, F: Flash + ?Sized> Flash for CountingFlash<'a, F> {
    #[inline]
    fn info(&self) -> FlashInfo {
        self.inner.info()
    }

    #[inline]
    fn page_read(&mut self, addr: u32, buf: &mut [u8]) -> FlashResult {
        self.stats.page_reads += 1;
        self.stats.read_bytes += buf.len() as u64;
        self.inner.page_read(addr, buf)
    }

    #[inline]
    fn page_write(&mut self, addr: u32, data: &[u8]) -> FlashResult {
        self.burn()?;
        self.stats.page_writes += 1;
        self.stats.write_bytes += data.len() as u64;
        self.inner.page_write(addr, data)
    }

    #[inline]
    fn sector_erase(&mut self, addr: u32) -> FlashResult {
        self.burn()?;
        self.stats.sector_erases += 1;
        self.inner.sector_erase(addr)
    }

    #[inline]
    fn block_erase(&mut self, addr: u32) -> FlashResult {
        self.burn()?;
        self.stats.block_erases += 1;
        self.inner.block_erase(addr)
    }

    #[inline]
    fn chip_erase(&mut self) -> FlashResult {
        self.burn()?;
        self.stats.chip_erases += 1;
        self.inner.chip_erase()
    }
}

#[cfg(all(test, feature = "std", feature = "mem"))]
mod test {
    use super::*;
    use crate::prelude::*;

    #[test]
    fn test_counting() {
        let mut buf = vec![0xFFu8; 8192];
        let mut flash = MemFlash::new(&mut buf);
        let mut counted = CountingFlash::new(&mut flash);

        counted.page_write(0, &[0x12, 0x34]).unwrap();
        let mut out = [0u8; 2];
        counted.page_read(0, &mut out).unwrap();

        assert_eq!(counted.stats.page_writes, 1);
        assert_eq!(counted.stats.write_bytes, 2);
        assert_eq!(counted.stats.page_reads, 1);
    }

    #[test]
    fn test_fuse_blows_then_reads_survive() {
        let mut buf = vec![0xFFu8; 8192];
        let mut flash = MemFlash::new(&mut buf);
        let mut counted = CountingFlash::new(&mut flash);
        counted.fail_after(2);

        counted.page_write(0, &[0x01]).unwrap();
        counted.page_write(1, &[0x02]).unwrap();
        assert_eq!(counted.page_write(2, &[0x03]), Err(FlashError::PowerCut));
        assert_eq!(counted.sector_erase(0), Err(FlashError::PowerCut));
        assert!(counted.power_cut());

        // The first two programs landed, the third did not.
        let mut out = [0u8; 3];
        counted.page_read(0, &mut out).unwrap();
        assert_eq!(out, [0x01, 0x02, 0xFF]);
    }
}
