//! Prepared plans
//!
//! A [`Plan`] is compiled inside the arena that is current when
//! [`SpiExecutor::plan`](super::SpiExecutor::plan) runs and dies with it,
//! unless [`Plan::keep`] promotes it into the host's cache arena first.
//! Every use resolves the plan through the arena registry, so a plan whose
//! arena is gone is reported as stale instead of being executed.

use tracing::{debug, warn};

use super::params::check_arguments;
use crate::error::{Error, Result};
use crate::host::{Host, WeakHost};
use crate::memory::{MemoryContext, TrackedPtr};
use crate::types::TypeTag;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlanState {
    /// Lives as long as the arena it was compiled in
    Transient,
    /// Promoted into the cache arena; lives until released
    Kept,
}

#[derive(Debug)]
pub struct Plan {
    host: WeakHost,
    handle: TrackedPtr,
    origin: MemoryContext,
    signature: Vec<TypeTag>,
    sql: String,
    state: PlanState,
    released: bool,
}

impl Plan {
    pub(crate) fn new(
        host: WeakHost,
        handle: TrackedPtr,
        origin: MemoryContext,
        signature: Vec<TypeTag>,
        sql: &str,
    ) -> Self {
        Self {
            host,
            handle,
            origin,
            signature,
            sql: sql.to_string(),
            state: PlanState::Transient,
            released: false,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Parameter types the plan was compiled with
    pub fn signature(&self) -> &[TypeTag] {
        &self.signature
    }

    pub fn state(&self) -> PlanState {
        self.state
    }

    pub fn is_kept(&self) -> bool {
        self.state == PlanState::Kept
    }

    /// Tracked handle of the host plan, usable for liveness probes
    pub fn handle(&self) -> TrackedPtr {
        self.handle
    }

    /// Arena that was current when the plan was compiled
    pub fn origin(&self) -> &MemoryContext {
        &self.origin
    }

    /// Whether the plan can still be executed
    pub fn is_valid(&self) -> bool {
        self.host
            .upgrade()
            .map_or(false, |host| MemoryContext::for_pointer(&host, self.handle).is_ok())
    }

    /// Promote the plan so it outlives the scope it was compiled in.
    /// Calling it again is a no-op.
    pub fn keep(&mut self) -> Result<()> {
        if self.is_kept() {
            return Ok(());
        }
        let host = self.live_host()?;
        MemoryContext::for_pointer(&host, self.handle)?;
        host.promote(self.handle.ptr())?;
        self.state = PlanState::Kept;
        debug!(plan = %self.handle, "plan kept");
        Ok(())
    }

    /// Free the plan now and report any host error.
    ///
    /// A transient plan whose arena is already gone has nothing left to
    /// free; a kept plan in that state is reported as stale.
    pub fn release(mut self) -> Result<()> {
        self.released = true;
        let host = self.live_host()?;
        match MemoryContext::for_pointer(&host, self.handle) {
            Ok(_) => host.free_plan(self.handle.ptr()),
            Err(_) if !self.is_kept() => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Stale check first, then the argument signature
    pub(crate) fn check_usable(&self, host: &Host, args: &[TypeTag]) -> Result<()> {
        if !self.host.is(host) {
            return Err(self.stale());
        }
        MemoryContext::for_pointer(host, self.handle)?;
        check_arguments(&self.signature, args)
    }

    fn live_host(&self) -> Result<Host> {
        self.host.upgrade().ok_or_else(|| self.stale())
    }

    fn stale(&self) -> Error {
        Error::StalePointer {
            addr: self.handle.ptr().addr(),
            epoch: self.handle.epoch(),
        }
    }
}

impl Drop for Plan {
    fn drop(&mut self) {
        if self.released || !self.is_kept() {
            return;
        }
        let Some(host) = self.host.upgrade() else {
            return;
        };
        let result = MemoryContext::for_pointer(&host, self.handle)
            .and_then(|_| host.free_plan(self.handle.ptr()));
        match result {
            Ok(()) => debug!(plan = %self.handle, "kept plan freed"),
            Err(e) => warn!(plan = %self.handle, error = %e, "failed to free kept plan"),
        }
    }
}
