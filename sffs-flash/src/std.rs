// SPDX-License-Identifier: MIT

#[cfg(feature = "std")]
use std::io::{Error, Read, Seek, SeekFrom, Write};

#[cfg(feature = "std")]
use crate::{
    Flash, FlashError, FlashInfo, FlashResult, DEFAULT_BLOCK_SIZE, DEFAULT_PAGE_SIZE,
    DEFAULT_SECTOR_SIZE,
};

/// File-backed NOR flash emulator.
///
/// Same contract as `MemFlash`, persisted in an image file so a device can be
/// inspected, remounted, or carried between tool invocations. The image must
/// be at least `capacity` bytes; fresh images should be filled with 0xFF
/// (factory-erased state).
#[cfg(feature = "std")]
#[derive(Debug)]
pub struct FileFlash<'a, T: Read + Write + Seek> {
    io: &'a mut T,
    capacity: u32,
    page_size: u32,
    sector_size: u32,
    block_size: u32,
}

#[cfg(feature = "std")]
impl<'a, T: Read + Write + Seek> FileFlash<'a, T> {
    #[inline]
    pub fn new(io: &'a mut T, capacity: u32) -> Self {
        Self::with_geometry(
            io,
            capacity,
            DEFAULT_PAGE_SIZE,
            DEFAULT_SECTOR_SIZE,
            DEFAULT_BLOCK_SIZE,
        )
    }

    #[inline]
    pub fn with_geometry(
        io: &'a mut T,
        capacity: u32,
        page_size: u32,
        sector_size: u32,
        block_size: u32,
    ) -> Self {
        assert!(page_size.is_power_of_two() && sector_size.is_power_of_two());
        assert!(sector_size >= page_size);
        assert!(page_size <= 4096, "page size above the internal scratch");
        assert_eq!(capacity % sector_size, 0);
        Self {
            io,
            capacity,
            page_size,
            sector_size,
            block_size,
        }
    }

    /// Fills a fresh image with 0xFF up to `capacity`.
    pub fn factory_erase(io: &mut T, capacity: u32) -> FlashResult {
        io.seek(SeekFrom::Start(0))?;
        let chunk = [0xFFu8; 4096];
        let mut remaining = capacity as usize;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            io.write_all(&chunk[..n])?;
            remaining -= n;
        }
        io.flush()?;
        Ok(())
    }

    #[inline]
    fn check_page_range(&self, addr: u32, len: usize) -> FlashResult {
        if len == 0 || len as u32 > self.page_size {
            return Err(FlashError::OutOfBounds);
        }
        let end = addr.checked_add(len as u32).ok_or(FlashError::OutOfBounds)?;
        if end > self.capacity {
            return Err(FlashError::OutOfBounds);
        }
        let page_base = addr / self.page_size * self.page_size;
        if end > page_base + self.page_size {
            return Err(FlashError::OutOfBounds);
        }
        Ok(())
    }

    fn fill_ff(&mut self, addr: u32, len: u32) -> FlashResult {
        self.io.seek(SeekFrom::Start(addr as u64))?;
        let chunk = [0xFFu8; 4096];
        let mut remaining = len as usize;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.io.write_all(&chunk[..n])?;
            remaining -= n;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl<'a, T: Read + Write + Seek> Flash for FileFlash<'a, T> {
    #[inline]
    fn info(&self) -> FlashInfo {
        FlashInfo {
            capacity: self.capacity,
            page_size: self.page_size,
            sector_size: self.sector_size,
            block_size: self.block_size,
        }
    }

    fn page_read(&mut self, addr: u32, buf: &mut [u8]) -> FlashResult {
        self.check_page_range(addr, buf.len())?;
        self.io.seek(SeekFrom::Start(addr as u64))?;
        self.io.read_exact(buf)?;
        Ok(())
    }

    fn page_write(&mut self, addr: u32, data: &[u8]) -> FlashResult {
        self.check_page_range(addr, data.len())?;

        let mut stored = [0u8; 4096];
        let stored = &mut stored[..data.len()];
        self.io.seek(SeekFrom::Start(addr as u64))?;
        self.io.read_exact(stored)?;

        let mut verify_failed = false;
        for (old, &new) in stored.iter_mut().zip(data) {
            *old &= new;
            if *old != new {
                verify_failed = true;
            }
        }

        self.io.seek(SeekFrom::Start(addr as u64))?;
        self.io.write_all(stored)?;

        if verify_failed {
            log::warn!("bad write, erasing required, addr = {addr:#x}");
            return Err(FlashError::Verify { addr });
        }
        Ok(())
    }

    fn sector_erase(&mut self, addr: u32) -> FlashResult {
        if addr % self.sector_size != 0 {
            return Err(FlashError::NotAligned);
        }
        if addr + self.sector_size > self.capacity {
            return Err(FlashError::OutOfBounds);
        }
        self.fill_ff(addr, self.sector_size)
    }

    fn block_erase(&mut self, addr: u32) -> FlashResult {
        if addr % self.block_size != 0 {
            return Err(FlashError::NotAligned);
        }
        if addr + self.block_size > self.capacity {
            return Err(FlashError::OutOfBounds);
        }
        self.fill_ff(addr, self.block_size)
    }

    fn chip_erase(&mut self) -> FlashResult {
        self.fill_ff(0, self.capacity)
    }
}

#[cfg(feature = "std")]
impl From<Error> for FlashError {
    #[cold]
    #[inline(never)]
    fn from(e: Error) -> Self {
        // Leak the string to produce a 'static str. Acceptable for error mapping.
        let leaked_str: &'static str = Box::leak(e.to_string().into_boxed_str());
        FlashError::Other(leaked_str)
    }
}

#[cfg(all(test, feature = "std"))]
mod test {
    use super::*;
    use tempfile::tempfile;

    #[test]
    fn test_rw() {
        let mut file = tempfile().unwrap();
        FileFlash::factory_erase(&mut file, 8192).unwrap();
        let mut flash = FileFlash::new(&mut file, 8192);

        flash.page_write(10, &[1, 2, 3, 4]).unwrap();

        let mut out = [0u8; 4];
        flash.page_read(10, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4]);
    }

    #[test]
    fn test_and_semantics_persist() {
        let mut file = tempfile().unwrap();
        FileFlash::factory_erase(&mut file, 8192).unwrap();

        {
            let mut flash = FileFlash::new(&mut file, 8192);
            flash.page_write(0, &[0x0F]).unwrap();
            assert!(flash.page_write(0, &[0xF0]).is_err());
        }

        // Reopen over the same file: the AND result survived.
        let mut flash = FileFlash::new(&mut file, 8192);
        let mut out = [0u8; 1];
        flash.page_read(0, &mut out).unwrap();
        assert_eq!(out[0], 0x00);
    }

    #[test]
    fn test_sector_erase() {
        let mut file = tempfile().unwrap();
        FileFlash::factory_erase(&mut file, 8192).unwrap();
        let mut flash = FileFlash::new(&mut file, 8192);

        flash.page_write(4096, &[0u8; 128]).unwrap();
        flash.sector_erase(4096).unwrap();

        let mut out = [0u8; 128];
        flash.page_read(4096, &mut out).unwrap();
        assert!(out.iter().all(|&b| b == 0xFF));
    }
}
