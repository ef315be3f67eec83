// SPDX-License-Identifier: MIT

use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

use crate::constant::*;
use crate::error::{FsError, FsResult};
use crate::meta::SffsMeta;

/// Filesystem master record, stored as file 0, block 0 through the regular
/// page protocol. Holds the label and echoes the geometry the filesystem was
/// formatted with, so a mount on a misreported device fails loudly.
#[derive(IntoBytes, FromBytes, KnownLayout, Immutable, Copy, Clone, Debug)]
#[repr(C, packed)]
pub struct MasterPage {
    pub magic: u32,
    pub page_size: u32,
    pub sector_size: u32,
    pub sector_count: u32,
    pub label: [u8; LABEL_SIZE],
    /// crc32 over all preceding bytes.
    pub crc: u32,
}

impl MasterPage {
    pub fn from_meta(meta: &SffsMeta, label: &str) -> Self {
        let mut label_safe = [0u8; LABEL_SIZE];
        for (i, b) in label.bytes().take(LABEL_SIZE).enumerate() {
            label_safe[i] = b;
        }

        let mut master = Self {
            magic: MASTER_MAGIC,
            page_size: meta.page_size,
            sector_size: meta.sector_size,
            sector_count: meta.sector_count,
            label: label_safe,
            crc: 0,
        };
        master.crc = master.compute_crc();
        master
    }

    #[inline]
    pub fn compute_crc(&self) -> u32 {
        let bytes = self.as_bytes();
        crc32fast::hash(&bytes[..bytes.len() - 4])
    }

    /// Magic, checksum, and geometry echo.
    pub fn validate(&self, meta: &SffsMeta) -> FsResult {
        if self.magic != MASTER_MAGIC {
            return Err(FsError::Corrupt("Bad master magic"));
        }
        if self.crc != self.compute_crc() {
            return Err(FsError::Corrupt("Bad master checksum"));
        }
        if self.page_size != meta.page_size
            || self.sector_size != meta.sector_size
            || self.sector_count != meta.sector_count
        {
            return Err(FsError::Corrupt("Master geometry mismatch"));
        }
        Ok(())
    }

    /// Copies the label out (the struct is packed, so no borrowing).
    pub fn label_bytes(&self) -> [u8; LABEL_SIZE] {
        self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sffs_flash::FlashInfo;

    fn meta_1mib() -> SffsMeta {
        SffsMeta::from_info(&FlashInfo {
            capacity: 1024 * 1024,
            page_size: 256,
            sector_size: 4096,
            block_size: 65536,
        })
        .unwrap()
    }

    #[test]
    fn test_master_round_trip() {
        let meta = meta_1mib();
        let master = MasterPage::from_meta(&meta, "sffs0");
        master.validate(&meta).unwrap();
        assert_eq!(&master.label_bytes()[..5], b"sffs0");
    }

    #[test]
    fn test_master_rejects_flipped_bits() {
        let meta = meta_1mib();
        let mut master = MasterPage::from_meta(&meta, "sffs0");
        master.sector_count = master.sector_count ^ 1;
        assert!(master.validate(&meta).is_err());
    }

    #[test]
    fn test_master_rejects_foreign_geometry() {
        let meta = meta_1mib();
        let master = MasterPage::from_meta(&meta, "");

        let other = SffsMeta::from_info(&FlashInfo {
            capacity: 512 * 1024,
            page_size: 256,
            sector_size: 4096,
            block_size: 65536,
        })
        .unwrap();
        assert!(master.validate(&other).is_err());
    }

    #[test]
    fn test_label_truncated_to_capacity() {
        let meta = meta_1mib();
        let master = MasterPage::from_meta(&meta, "a-rather-long-label");
        assert_eq!(&master.label_bytes(), b"a-rather");
    }
}
