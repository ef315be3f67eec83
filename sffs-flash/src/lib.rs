// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;

// === Core modules ===
pub mod error;
mod macros;

// === Backend modules ===
#[cfg(feature = "mem")]
mod mem;

#[cfg(feature = "std")]
mod std;

mod stats;

// === Prelude re-exports (central entrypoint) ===
pub mod prelude {
    pub use super::error::*;
    pub use super::stats::{CountingFlash, FlashStats};
    pub use super::Flash;
    pub use super::FlashExt;
    pub use super::FlashInfo;
    pub use super::FlashStructExt;

    #[cfg(feature = "mem")]
    pub use super::mem::MemFlash;

    #[cfg(feature = "std")]
    pub use super::std::FileFlash;
}

// === Internal use ===
use error::*;
#[allow(clippy::single_component_path_imports)]
use paste;

// === Constants ===
/// Maximum size of the scratch buffer used by `read_struct`.
const STRUCT_BUF_SIZE: usize = 64;

/// Default geometry, matching a common 4 KiB-sector SPI NOR part.
pub const DEFAULT_PAGE_SIZE: u32 = 256;
pub const DEFAULT_SECTOR_SIZE: u32 = 4096;
pub const DEFAULT_BLOCK_SIZE: u32 = 65536;

/// Geometry of a NOR flash device, as reported by `Flash::info`.
///
/// A page is the program unit, a sector the erase unit; `block_size` is the
/// larger erase unit some parts offer on top of sectors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashInfo {
    pub capacity: u32,
    pub page_size: u32,
    pub sector_size: u32,
    pub block_size: u32,
}

// === Traits ===

/// NOR flash abstraction trait.
///
/// Programming follows AND semantics: a stored byte becomes `old & data`,
/// so bits only move 1 -> 0. Clearing back to 1 requires erasing a whole
/// sector (or block, or the chip). Reads and programs must not cross a page
/// boundary; implementations reject such requests instead of splitting them.
pub trait Flash {
    /// Device geometry.
    fn info(&self) -> FlashInfo;

    /// Reads `buf.len()` bytes from `addr`. `buf.len() <= page_size` and the
    /// range must lie within a single page.
    fn page_read(&mut self, addr: u32, buf: &mut [u8]) -> FlashResult;

    /// Programs `data` at `addr` with AND semantics, then verifies. A request
    /// that needs a 0 -> 1 bit fails with `FlashError::Verify` (the AND is
    /// still applied, as on real hardware).
    fn page_write(&mut self, addr: u32, data: &[u8]) -> FlashResult;

    /// Erases the sector starting at `addr` (sector-aligned) to all 0xFF.
    fn sector_erase(&mut self, addr: u32) -> FlashResult;

    /// Erases the block starting at `addr` (block-aligned) to all 0xFF.
    fn block_erase(&mut self, addr: u32) -> FlashResult {
        let _ = addr;
        Err(FlashError::Unsupported)
    }

    /// Erases the whole device. Equivalent to erasing every sector.
    fn chip_erase(&mut self) -> FlashResult {
        let info = self.info();
        let mut addr = 0u32;
        while addr < info.capacity {
            self.sector_erase(addr)?;
            addr += info.sector_size;
        }
        Ok(())
    }
}

/// Extension helpers for Flash.
///
/// Provides multi-page reads and little-endian primitive accessors. Writes
/// stay page-bounded on purpose: callers of a NOR device must know where
/// their program operations land.
pub trait FlashExt: Flash {
    /// Reads `buf.len()` bytes starting at `addr`, splitting the request at
    /// page boundaries.
    #[inline(always)]
    fn read_in_pages(&mut self, addr: u32, buf: &mut [u8]) -> FlashResult {
        let page_size = self.info().page_size;
        let mut off = addr;
        let mut pos = 0usize;
        let mut remaining = buf.len();

        while remaining > 0 {
            let in_page = (page_size - off % page_size) as usize;
            let to_read = remaining.min(in_page);
            self.page_read(off, &mut buf[pos..pos + to_read])?;
            off += to_read as u32;
            pos += to_read;
            remaining -= to_read;
        }

        Ok(())
    }

    // Implements read/write helpers for primitive types (u16, u32)
    flash_impl_primitive_rw!(u16, u32);
}

impl<T: Flash + ?Sized> FlashExt for T {}

/// Extension trait for reading and writing structs using zerocopy.
///
/// The struct must fit within one page at the given address; SFFS on-flash
/// records are a handful of bytes, well under any real page size.
pub trait FlashStructExt: Flash {
    /// Reads a struct of type `T` from `addr`.
    fn read_struct<T: zerocopy::FromBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        addr: u32,
    ) -> FlashResult<T> {
        let size = core::mem::size_of::<T>();
        assert!(size <= STRUCT_BUF_SIZE, "read_struct: type too large");
        let mut buf = [0u8; STRUCT_BUF_SIZE];
        self.page_read(addr, &mut buf[..size])?;
        T::read_from_bytes(&buf[..size]).map_err(|_| FlashError::Other("read_struct failed"))
    }

    /// Programs a struct of type `T` at `addr`.
    fn write_struct<T: zerocopy::IntoBytes + zerocopy::KnownLayout + zerocopy::Immutable>(
        &mut self,
        addr: u32,
        val: &T,
    ) -> FlashResult {
        self.page_write(addr, val.as_bytes())
    }
}

impl<T: Flash + ?Sized> FlashStructExt for T {}
