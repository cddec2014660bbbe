//! Memory context handles
//!
//! A [`MemoryContext`] names one live arena as seen through the registry of a
//! particular [`Host`]. Holding one does not keep the arena alive.

use std::fmt;

use super::{ArenaId, TrackedPtr};
use crate::error::Result;
use crate::host::Host;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryContext {
    id: ArenaId,
    name: String,
}

impl MemoryContext {
    pub(crate) fn new(id: ArenaId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
        }
    }

    /// The arena active at the call site
    pub fn current(host: &Host) -> Result<Self> {
        host.registry().current()
    }

    /// The live arena backing `ptr`, or a stale-reference error
    pub fn for_pointer(host: &Host, ptr: TrackedPtr) -> Result<Self> {
        host.registry().for_pointer(ptr)
    }

    pub fn id(&self) -> ArenaId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Check if the arena is still live in `host`
    pub fn is_alive(&self, host: &Host) -> bool {
        host.registry().is_alive(self.id)
    }

    pub fn parent(&self, host: &Host) -> Option<MemoryContext> {
        let registry = host.registry();
        registry
            .parent_of(self.id)
            .and_then(|parent| registry.context(parent).ok())
    }
}

impl fmt::Display for MemoryContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.id)
    }
}
