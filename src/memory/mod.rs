//! Memory module
//!
//! Tracks which host arena backs each native pointer handed out to
//! extension code, so that a pointer whose arena was torn down is rejected
//! instead of dereferenced.
//! - Arena identities and native addresses
//! - The arena registry (pointer ownership and liveness)
//! - Memory context handles

pub mod context;
pub mod registry;

use std::fmt;

pub use context::MemoryContext;
pub use registry::{ArenaEvent, ArenaListener, ArenaRegistry};

/// Identity of a host arena. Never reused within a process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ArenaId(pub(crate) u64);

impl ArenaId {
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ArenaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A raw native address inside some arena. The host allocator may hand the
/// same address out again after the owning arena is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativePtr(pub(crate) usize);

impl NativePtr {
    pub fn addr(&self) -> usize {
        self.0
    }
}

impl fmt::Display for NativePtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Generation stamp of one registration
pub type Epoch = u64;

/// A native pointer together with the epoch it was registered under.
///
/// This is the only form in which handles are kept by the `spi` layer: raw
/// address equality is never accepted as proof of liveness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedPtr {
    pub(crate) ptr: NativePtr,
    pub(crate) epoch: Epoch,
}

impl TrackedPtr {
    pub fn ptr(&self) -> NativePtr {
        self.ptr
    }

    pub fn epoch(&self) -> Epoch {
        self.epoch
    }
}

impl fmt::Display for TrackedPtr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.ptr, self.epoch)
    }
}
