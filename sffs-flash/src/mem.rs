// SPDX-License-Identifier: MIT

use crate::{
    Flash, FlashError, FlashInfo, FlashResult, DEFAULT_BLOCK_SIZE, DEFAULT_PAGE_SIZE,
    DEFAULT_SECTOR_SIZE,
};

/// In-memory NOR flash emulator.
///
/// Useful for tests and RAM-backed filesystems. Programming applies AND
/// semantics byte by byte and verifies the result, so a write that needs an
/// erase is reported instead of silently corrupting.
#[derive(Debug)]
pub struct MemFlash<'a> {
    data: &'a mut [u8],
    page_size: u32,
    sector_size: u32,
    block_size: u32,
}

impl<'a> MemFlash<'a> {
    /// Wraps `data` with the default geometry. The buffer length is the
    /// device capacity and must be a multiple of the sector size.
    #[inline]
    pub fn new(data: &'a mut [u8]) -> Self {
        Self::with_geometry(data, DEFAULT_PAGE_SIZE, DEFAULT_SECTOR_SIZE, DEFAULT_BLOCK_SIZE)
    }

    #[inline]
    pub fn with_geometry(
        data: &'a mut [u8],
        page_size: u32,
        sector_size: u32,
        block_size: u32,
    ) -> Self {
        assert!(page_size.is_power_of_two() && sector_size.is_power_of_two());
        assert!(sector_size >= page_size);
        assert_eq!(data.len() as u32 % sector_size, 0);
        Self {
            data,
            page_size,
            sector_size,
            block_size,
        }
    }

    #[inline]
    fn check_page_range(&self, addr: u32, len: usize) -> FlashResult {
        if len == 0 || len as u32 > self.page_size {
            return Err(FlashError::OutOfBounds);
        }
        let end = addr.checked_add(len as u32).ok_or(FlashError::OutOfBounds)?;
        if end as usize > self.data.len() {
            return Err(FlashError::OutOfBounds);
        }
        // Must not cross a page boundary.
        let page_base = addr / self.page_size * self.page_size;
        if end > page_base + self.page_size {
            return Err(FlashError::OutOfBounds);
        }
        Ok(())
    }

    #[inline]
    fn check_erase(&self, addr: u32, unit: u32) -> FlashResult {
        if addr as usize >= self.data.len() {
            return Err(FlashError::OutOfBounds);
        }
        if addr % unit != 0 {
            return Err(FlashError::NotAligned);
        }
        if (addr + unit) as usize > self.data.len() {
            return Err(FlashError::OutOfBounds);
        }
        Ok(())
    }
}

impl<'a> Flash for MemFlash<'a> {
    #[inline]
    fn info(&self) -> FlashInfo {
        FlashInfo {
            capacity: self.data.len() as u32,
            page_size: self.page_size,
            sector_size: self.sector_size,
            block_size: self.block_size,
        }
    }

    #[inline(always)]
    fn page_read(&mut self, addr: u32, buf: &mut [u8]) -> FlashResult {
        self.check_page_range(addr, buf.len())?;
        let src = &self.data[addr as usize..addr as usize + buf.len()];
        buf.copy_from_slice(src);
        Ok(())
    }

    fn page_write(&mut self, addr: u32, data: &[u8]) -> FlashResult {
        self.check_page_range(addr, data.len())?;
        let dst = &mut self.data[addr as usize..addr as usize + data.len()];

        let mut verify_failed = false;
        for (stored, &new) in dst.iter_mut().zip(data) {
            *stored &= new;
            if *stored != new {
                verify_failed = true;
            }
        }
        if verify_failed {
            log::warn!("bad write, erasing required, addr = {addr:#x}");
            return Err(FlashError::Verify { addr });
        }
        Ok(())
    }

    fn sector_erase(&mut self, addr: u32) -> FlashResult {
        self.check_erase(addr, self.sector_size)?;
        self.data[addr as usize..(addr + self.sector_size) as usize].fill(0xFF);
        Ok(())
    }

    fn block_erase(&mut self, addr: u32) -> FlashResult {
        self.check_erase(addr, self.block_size)?;
        self.data[addr as usize..(addr + self.block_size) as usize].fill(0xFF);
        Ok(())
    }

    fn chip_erase(&mut self) -> FlashResult {
        self.data.fill(0xFF);
        Ok(())
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use crate::prelude::*;

    fn erased(len: usize) -> Vec<u8> {
        vec![0xFFu8; len]
    }

    #[test]
    fn test_rw() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);
        flash.page_write(16, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        flash.page_read(16, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_and_semantics_rejects_setting_bits() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        flash.page_write(0, &[0x0F]).unwrap();
        // 0x0F -> 0xF0 needs erased bits back; must fail and leave the AND.
        let err = flash.page_write(0, &[0xF0]).unwrap_err();
        assert!(matches!(err, FlashError::Verify { addr: 0 }));

        let mut out = [0u8; 1];
        flash.page_read(0, &mut out).unwrap();
        assert_eq!(out[0], 0x00);
    }

    #[test]
    fn test_reprogram_clearing_only_is_fine() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        flash.page_write(0, &[0xB7]).unwrap();
        flash.page_write(0, &[0xB5]).unwrap();
        flash.page_write(0, &[0x35]).unwrap();

        let mut out = [0u8; 1];
        flash.page_read(0, &mut out).unwrap();
        assert_eq!(out[0], 0x35);
    }

    #[test]
    fn test_page_boundary_rejected() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        // 4 bytes straddling the first page boundary.
        assert!(matches!(
            flash.page_write(254, &[0u8; 4]),
            Err(FlashError::OutOfBounds)
        ));
        assert!(matches!(
            flash.page_read(254, &mut [0u8; 4]),
            Err(FlashError::OutOfBounds)
        ));
    }

    #[test]
    fn test_sector_erase() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        flash.page_write(4096, &[0u8; 256]).unwrap();
        flash.sector_erase(4096).unwrap();

        let mut out = [0u8; 256];
        flash.page_read(4096, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xFF));

        assert!(matches!(
            flash.sector_erase(4097),
            Err(FlashError::NotAligned)
        ));
    }

    #[test]
    fn test_primitive_rw_little_endian() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        flash.write_u32_at(0, 0x87985214).unwrap();
        assert_eq!(flash.read_u32_at(0).unwrap(), 0x87985214);
        assert_eq!(flash.read_u16_at(0).unwrap(), 0x5214);
    }

    #[test]
    fn test_block_erase() {
        let mut buf = erased(16384);
        let mut flash = MemFlash::with_geometry(&mut buf, 256, 4096, 8192);

        flash.page_write(0, &[0u8; 64]).unwrap();
        flash.page_write(8191, &[0u8; 1]).unwrap();
        flash.block_erase(0).unwrap();

        let mut out = [0u8; 64];
        flash.page_read(0, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xFF));
        assert!(matches!(
            flash.block_erase(4096),
            Err(FlashError::NotAligned)
        ));
    }

    #[test]
    fn test_read_in_pages() {
        let mut buf = erased(8192);
        let mut flash = MemFlash::new(&mut buf);

        flash.page_write(200, &[0xAB; 56]).unwrap();
        flash.page_write(256, &[0xCD; 56]).unwrap();

        let mut out = [0u8; 112];
        flash.read_in_pages(200, &mut out).unwrap();
        assert!(out[..56].iter().all(|&b| b == 0xAB));
        assert!(out[56..].iter().all(|&b| b == 0xCD));
    }
}
