//! Query executor
//!
//! An [`SpiExecutor`] holds one host connection for as long as it lives.
//! Opening it connects; dropping it disconnects, releasing the connection
//! arena together with every result produced through it.

use tracing::{debug, warn};

use super::decode::{validate, FromRow};
use super::params::Params;
use super::plan::Plan;
use super::results::Results;
use crate::config::SpiConfig;
use crate::error::Result;
use crate::host::{ConnectionId, ExecTarget, Execution, Host};
use crate::memory::MemoryContext;

#[derive(Debug)]
pub struct SpiExecutor {
    host: Host,
    connection: ConnectionId,
    config: SpiConfig,
    closed: bool,
}

impl SpiExecutor {
    /// Connect with default settings
    pub fn connect(host: &Host) -> Result<Self> {
        Self::with_config(host, SpiConfig::default())
    }

    pub fn with_config(host: &Host, config: SpiConfig) -> Result<Self> {
        let connection = host.connect()?;
        debug!(%connection, row_limit = config.row_limit, "executor opened");
        Ok(Self {
            host: host.clone(),
            connection,
            config,
            closed: false,
        })
    }

    pub fn connection(&self) -> ConnectionId {
        self.connection
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn config(&self) -> &SpiConfig {
        &self.config
    }

    /// Run `sql` once with `args` bound to `$1`, `$2`, ...
    pub fn query<R: FromRow, A: Params>(&self, sql: &str, args: A) -> Result<Results<'_, R>> {
        let signature = A::signature();
        let exec = self.host.execute(
            self.connection,
            ExecTarget::Sql(sql),
            args.into_datums(),
            &signature,
            self.config.row_limit,
        )?;
        self.collect(exec)
    }

    /// Compile `sql` for parameters of type `P`, bound to the current arena.
    ///
    /// The current arena belongs to the innermost open connection, so a
    /// plan compiled here while a nested executor is open dies with that
    /// executor unless it is kept.
    pub fn plan<P: Params>(&self, sql: &str) -> Result<Plan> {
        let origin = MemoryContext::current(&self.host)?;
        let signature = P::signature();
        let (ptr, arena) = self.host.compile(sql, &signature)?;
        let handle = self.host.register(ptr, arena)?;
        debug!(plan = %handle, origin = %origin, "plan compiled");
        Ok(Plan::new(self.host.downgrade(), handle, origin, signature, sql))
    }

    /// Execute a prepared plan. Staleness is checked before the argument
    /// signature, and both before the host runs anything.
    pub fn query_plan<R: FromRow, A: Params>(
        &self,
        plan: &Plan,
        args: A,
    ) -> Result<Results<'_, R>> {
        plan.check_usable(&self.host, &A::signature())?;
        let exec = self.host.execute(
            self.connection,
            ExecTarget::Plan(plan.handle().ptr()),
            args.into_datums(),
            plan.signature(),
            self.config.row_limit,
        )?;
        self.collect(exec)
    }

    /// Run `sql` and return only the number of rows processed
    pub fn execute<A: Params>(&self, sql: &str, args: A) -> Result<usize> {
        let signature = A::signature();
        let exec = self.host.execute(
            self.connection,
            ExecTarget::Sql(sql),
            args.into_datums(),
            &signature,
            self.config.row_limit,
        )?;
        Ok(exec.processed)
    }

    /// Disconnect now and report the host's answer
    pub fn close(mut self) -> Result<()> {
        self.closed = true;
        self.host.disconnect(self.connection)?;
        debug!(connection = %self.connection, "executor closed");
        Ok(())
    }

    fn collect<R: FromRow>(&self, exec: Execution) -> Result<Results<'_, R>> {
        let tuptable = self.host.register(exec.tuptable, exec.arena)?;
        // A rejected descriptor frees the tuple table with the dropped results
        let results = Results::new(&self.host, tuptable, exec.columns, exec.processed);
        validate::<R>(results.columns())?;
        Ok(results)
    }
}

impl Drop for SpiExecutor {
    fn drop(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        match self.host.disconnect(self.connection) {
            Ok(()) => debug!(connection = %self.connection, "executor closed"),
            // The enclosing scope already tore the connection down
            Err(e) if e.is_stale() => {
                debug!(connection = %self.connection, error = %e, "connection already gone")
            }
            Err(e) => warn!(connection = %self.connection, error = %e, "failed to close executor"),
        }
    }
}
