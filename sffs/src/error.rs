// SPDX-License-Identifier: MIT

use core::fmt;

pub use sffs_flash::error::{FlashError, FlashResult};

/// Result type for filesystem operations.
pub type FsResult<T = ()> = core::result::Result<T, FsError>;

/// Error type for filesystem operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsError {
    /// No such file, block, or page.
    NotFound,
    /// Allocator and reclamation both failed to yield an erased page.
    NoSpace,
    /// Magic mismatch, bad state byte, or master page damage.
    Corrupt(&'static str),
    InvalidArg(&'static str),
    /// The flash driver reported a failure.
    Flash(FlashError),
}

impl FsError {
    pub fn msg(&self) -> &'static str {
        match self {
            FsError::NotFound => "Not found",
            FsError::NoSpace => "No space left on device",
            FsError::Corrupt(msg) => msg,
            FsError::InvalidArg(msg) => msg,
            FsError::Flash(_) => "Flash error",
        }
    }

    pub fn source(&self) -> Option<&FlashError> {
        match self {
            FsError::Flash(e) => Some(e),
            _ => None,
        }
    }
}

impl From<FlashError> for FsError {
    #[inline]
    fn from(e: FlashError) -> Self {
        FsError::Flash(e)
    }
}

impl fmt::Display for FsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.msg())?;
        if let Some(src) = self.source() {
            write!(f, "\n  caused by: {}", src)?;
        }
        Ok(())
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FsError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FsError::Flash(e) => Some(e),
            _ => None,
        }
    }
}
