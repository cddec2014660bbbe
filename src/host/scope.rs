//! Host scopes
//!
//! Transactions, subtransactions and procedure calls each run in their own
//! arena. Ending a scope, whether it commits or aborts, destroys that arena
//! together with everything allocated below it.

use std::fmt;

use tracing::warn;

use super::Host;
use crate::error::Result;
use crate::memory::{ArenaId, MemoryContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Transaction,
    Subtransaction,
    Call,
}

impl ScopeKind {
    pub(crate) fn arena_name(&self) -> &'static str {
        match self {
            ScopeKind::Transaction => "TransactionContext",
            ScopeKind::Subtransaction => "SubtransactionContext",
            ScopeKind::Call => "CallContext",
        }
    }
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScopeKind::Transaction => write!(f, "transaction"),
            ScopeKind::Subtransaction => write!(f, "subtransaction"),
            ScopeKind::Call => write!(f, "call"),
        }
    }
}

/// An open host scope. Dropping it ends the scope.
#[must_use = "dropping a scope ends it immediately"]
#[derive(Debug)]
pub struct HostScope {
    host: Host,
    arena: ArenaId,
    previous: ArenaId,
    kind: ScopeKind,
    closed: bool,
}

impl HostScope {
    pub(crate) fn open(host: &Host, kind: ScopeKind) -> Result<Self> {
        let (arena, previous) = host.enter_arena(kind.arena_name())?;
        Ok(Self {
            host: host.clone(),
            arena,
            previous,
            kind,
            closed: false,
        })
    }

    pub fn kind(&self) -> ScopeKind {
        self.kind
    }

    /// Arena backing this scope
    pub fn arena(&self) -> ArenaId {
        self.arena
    }

    pub fn context(&self) -> Result<MemoryContext> {
        self.host.registry().context(self.arena)
    }

    /// End the scope, releasing its arena. Fails if an enclosing scope has
    /// already torn it down.
    pub fn end(mut self) -> Result<()> {
        self.closed = true;
        self.host.leave_arena(self.arena, self.previous)
    }
}

impl Drop for HostScope {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Err(e) = self.host.leave_arena(self.arena, self.previous) {
            warn!(kind = %self.kind, arena = %self.arena, error = %e, "failed to end scope");
        }
    }
}
