// SPDX-License-Identifier: MIT

use core::fmt;

/// Result type for flash operations.
pub type FlashResult<T = ()> = core::result::Result<T, FlashError>;

/// Error type for flash operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlashError {
    Other(&'static str),
    /// Read or program outside the device, or across a page boundary.
    OutOfBounds,
    /// Erase address not aligned to the erase unit.
    NotAligned,
    /// Post-program verify mismatch at `addr`: the request needed a 0 -> 1
    /// bit, which only an erase can provide.
    Verify { addr: u32 },
    /// Simulated power loss: the device refuses further mutation.
    PowerCut,
    Unsupported,
}

impl FlashError {
    pub fn msg(&self) -> &'static str {
        match self {
            FlashError::Other(msg) => msg,
            FlashError::OutOfBounds => "Out of bounds",
            FlashError::NotAligned => "Erase address not aligned",
            FlashError::Verify { .. } => "Program verify failed, erase required",
            FlashError::PowerCut => "Power cut",
            FlashError::Unsupported => "Unsupported operation",
        }
    }
}

impl From<&'static str> for FlashError {
    #[inline]
    fn from(msg: &'static str) -> Self {
        FlashError::Other(msg)
    }
}

impl fmt::Display for FlashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FlashError::Verify { addr } => write!(f, "{} (addr {:#010x})", self.msg(), addr),
            _ => write!(f, "{}", self.msg()),
        }
    }
}

#[cfg(feature = "std")]
impl std::error::Error for FlashError {}
