// SPDX-License-Identifier: MIT
#![cfg_attr(not(feature = "std"), no_std)]

#[cfg(all(not(feature = "std"), feature = "alloc"))]
extern crate alloc;

// === Core modules ===
pub mod constant;
pub mod error;
pub mod meta;
pub mod state;
pub mod types;

// === Filesystem modules (need a heap for scratch pages and the census) ===
#[cfg(feature = "alloc")]
pub mod allocator;
#[cfg(feature = "alloc")]
mod cache;
#[cfg(feature = "alloc")]
pub mod checker;
#[cfg(feature = "alloc")]
pub mod debug;
#[cfg(feature = "alloc")]
mod file;
#[cfg(feature = "alloc")]
pub mod filesystem;
#[cfg(feature = "alloc")]
pub mod formatter;
#[cfg(feature = "alloc")]
pub mod ops;
#[cfg(feature = "alloc")]
pub mod reclaim;

// === Public Interface ===
pub mod prelude {
    pub use crate::constant::*;
    pub use crate::error::*;
    pub use crate::meta::SffsMeta;
    pub use crate::state::{PageState, SectorState};

    #[cfg(feature = "alloc")]
    pub use crate::checker::{CheckReport, Checker};
    #[cfg(feature = "alloc")]
    pub use crate::filesystem::{FileHandle, OpenMode, SffsFs};

    pub use sffs_flash::prelude::*;
}
