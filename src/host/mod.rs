//! Reference host
//!
//! An in-process stand-in for the database engine the `spi` layer runs
//! inside. It owns the arena tree, the connection stack, compiled plans and
//! result tuple tables, and it notifies the [`ArenaRegistry`] about every
//! arena change. The `spi` layer only ever talks to it through the methods
//! on [`Host`].

pub(crate) mod arena;
pub(crate) mod eval;
pub(crate) mod query;
pub mod scope;
pub mod sql;

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use tracing::{debug, warn};

use self::arena::ArenaTree;
use self::query::CompiledQuery;
use crate::config::HostConfig;
use crate::error::{Error, Result};
use crate::memory::{ArenaId, ArenaListener, ArenaRegistry, NativePtr, TrackedPtr};
use crate::types::{ColumnDesc, Datum, TypeTag};

pub use scope::{HostScope, ScopeKind};

/// Identifier of one open connection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(pub(crate) usize);

impl ConnectionId {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn{}", self.0)
    }
}

/// What to execute
#[derive(Debug, Clone, Copy)]
pub enum ExecTarget<'a> {
    /// Ad hoc statement text
    Sql(&'a str),
    /// A compiled plan
    Plan(NativePtr),
}

/// Outcome of one execution
#[derive(Debug, Clone)]
pub struct Execution {
    /// Number of rows produced
    pub processed: usize,
    /// Tuple table holding the rows
    pub tuptable: NativePtr,
    /// Arena the tuple table lives in
    pub arena: ArenaId,
    /// Row descriptor
    pub columns: Vec<ColumnDesc>,
}

#[derive(Debug)]
struct Connection {
    id: ConnectionId,
    arena: ArenaId,
    previous: ArenaId,
}

#[derive(Debug)]
struct CompiledPlan {
    query: CompiledQuery,
    arena: ArenaId,
}

#[derive(Debug)]
struct TupleTable {
    rows: Vec<Vec<Datum>>,
}

#[derive(Debug)]
struct HostState {
    arenas: ArenaTree,
    cache: ArenaId,
    connections: Vec<Connection>,
    next_connection: usize,
    plans: HashMap<NativePtr, CompiledPlan>,
    tuptables: HashMap<NativePtr, TupleTable>,
}

impl HostState {
    /// Forget everything whose arena is gone
    fn prune(&mut self) {
        let arenas = &self.arenas;
        self.connections.retain(|conn| arenas.contains(conn.arena));
        self.plans.retain(|ptr, _| arenas.owner_of(*ptr).is_some());
        self.tuptables.retain(|ptr, _| arenas.owner_of(*ptr).is_some());
    }

    fn current_connection(&self) -> Result<&Connection> {
        self.connections.last().ok_or(Error::NotConnected)
    }

    fn connection(&self, id: ConnectionId) -> Result<&Connection> {
        self.connections
            .iter()
            .find(|conn| conn.id == id)
            .ok_or(Error::ConnectionGone(id.0))
    }

    fn plan(&self, ptr: NativePtr) -> Result<&CompiledPlan> {
        self.plans.get(&ptr).ok_or(Error::StalePointer {
            addr: ptr.addr(),
            epoch: 0,
        })
    }
}

struct Shared {
    state: RefCell<HostState>,
    registry: RefCell<ArenaRegistry>,
    config: HostConfig,
}

/// Handle to a reference host. Clones share the same host.
///
/// The handle is neither `Send` nor `Sync`: the host and every handle into
/// it belong to one thread.
#[derive(Clone)]
pub struct Host {
    shared: Rc<Shared>,
}

/// Non-owning handle; see [`Host::downgrade`]
#[derive(Clone)]
pub struct WeakHost {
    shared: Weak<Shared>,
}

impl WeakHost {
    pub fn upgrade(&self) -> Option<Host> {
        self.shared.upgrade().map(|shared| Host { shared })
    }

    /// Whether `host` is the host this handle points to
    pub fn is(&self, host: &Host) -> bool {
        Weak::ptr_eq(&self.shared, &Rc::downgrade(&host.shared))
    }
}

impl fmt::Debug for WeakHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakHost")
            .field("alive", &(self.shared.strong_count() > 0))
            .finish()
    }
}

impl Default for Host {
    fn default() -> Self {
        Self::new(HostConfig::default())
    }
}

impl fmt::Debug for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("Host")
            .field("arenas", &state.arenas.len())
            .field("connections", &state.connections.len())
            .field("plans", &state.plans.len())
            .field("tuptables", &state.tuptables.len())
            .finish()
    }
}

impl Host {
    /// Start a host with only its top and cache arenas
    pub fn new(config: HostConfig) -> Self {
        let mut arenas = ArenaTree::new(config.recycle_addresses);
        let cache = arenas.create_top_level(&config.cache_arena_name);

        let host = Self {
            shared: Rc::new(Shared {
                state: RefCell::new(HostState {
                    arenas,
                    cache,
                    connections: Vec::new(),
                    next_connection: 1,
                    plans: HashMap::new(),
                    tuptables: HashMap::new(),
                }),
                registry: RefCell::new(ArenaRegistry::new()),
                config,
            }),
        };
        host.dispatch();
        debug!(cache = %cache, "host started");
        host
    }

    pub fn config(&self) -> &HostConfig {
        &self.shared.config
    }

    pub fn downgrade(&self) -> WeakHost {
        WeakHost {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// The registry mirroring this host's arenas
    pub(crate) fn registry(&self) -> Ref<'_, ArenaRegistry> {
        self.shared.registry.borrow()
    }

    /// Forward queued arena notifications to the registry
    fn dispatch(&self) {
        let events = self.shared.state.borrow_mut().arenas.drain_events();
        if events.is_empty() {
            return;
        }
        let mut registry = self.shared.registry.borrow_mut();
        for event in &events {
            registry.on_arena_event(event);
        }
    }

    // ========== Arenas ==========

    pub fn top_arena(&self) -> ArenaId {
        self.shared.state.borrow().arenas.top()
    }

    pub fn cache_arena(&self) -> ArenaId {
        self.shared.state.borrow().cache
    }

    pub fn current_arena(&self) -> ArenaId {
        self.shared.state.borrow().arenas.current()
    }

    /// Number of live arenas
    pub fn arena_count(&self) -> usize {
        self.shared.state.borrow().arenas.len()
    }

    /// Arena that owns `ptr`, if the allocation is still live
    pub fn pointer_owner(&self, ptr: NativePtr) -> Option<ArenaId> {
        self.shared.state.borrow().arenas.owner_of(ptr)
    }

    /// Record `ptr` as backed by `arena` in the registry
    pub fn register(&self, ptr: NativePtr, arena: ArenaId) -> Result<TrackedPtr> {
        self.shared.registry.borrow_mut().register(ptr, arena)
    }

    /// Diagnostic rendering of the live arena tree
    pub fn dump_arenas(&self) -> String {
        self.registry().dump()
    }

    /// Create a child of the current arena and make it current.
    /// Returns the new arena and the one it replaced.
    fn enter_arena(&self, name: &str) -> Result<(ArenaId, ArenaId)> {
        let (arena, previous) = {
            let mut state = self.shared.state.borrow_mut();
            let previous = state.arenas.current();
            let arena = state.arenas.create(previous, name)?;
            state.arenas.switch_to(arena)?;
            (arena, previous)
        };
        self.dispatch();
        debug!(%arena, name, "entered arena");
        Ok((arena, previous))
    }

    /// Destroy `arena` and make `previous` current again if it survived
    fn leave_arena(&self, arena: ArenaId, previous: ArenaId) -> Result<()> {
        let result = {
            let mut state = self.shared.state.borrow_mut();
            let result = if state.arenas.contains(arena) {
                state.arenas.destroy(arena).map(|_| ())
            } else {
                Err(Error::ArenaGone(arena))
            };
            if state.arenas.contains(previous) {
                state.arenas.switch_to(previous)?;
            }
            state.prune();
            result
        };
        self.dispatch();
        debug!(%arena, "left arena");
        result
    }

    // ========== Scopes ==========

    pub fn begin_transaction(&self) -> Result<HostScope> {
        HostScope::open(self, ScopeKind::Transaction)
    }

    pub fn begin_subtransaction(&self) -> Result<HostScope> {
        HostScope::open(self, ScopeKind::Subtransaction)
    }

    pub fn enter_call(&self) -> Result<HostScope> {
        HostScope::open(self, ScopeKind::Call)
    }

    // ========== Connections ==========

    /// Open a connection; its procedure arena becomes current
    pub fn connect(&self) -> Result<ConnectionId> {
        let (id, arena) = {
            let mut state = self.shared.state.borrow_mut();
            let limit = self.shared.config.max_connections;
            if state.connections.len() >= limit {
                return Err(Error::ConnectionLimit(limit));
            }

            let previous = state.arenas.current();
            let arena = state.arenas.create(previous, "SPI Proc")?;
            state.arenas.switch_to(arena)?;

            let id = ConnectionId(state.next_connection);
            state.next_connection += 1;
            state.connections.push(Connection {
                id,
                arena,
                previous,
            });
            (id, arena)
        };
        self.dispatch();
        debug!(connection = %id, %arena, "connected");
        Ok(id)
    }

    /// Close a connection and release its arena.
    ///
    /// Connections opened after `id` are closed with it.
    pub fn disconnect(&self, id: ConnectionId) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            let pos = state
                .connections
                .iter()
                .position(|conn| conn.id == id)
                .ok_or(Error::ConnectionGone(id.0))?;

            let nested = state.connections.len() - pos - 1;
            if nested > 0 {
                warn!(connection = %id, nested, "closing connection with nested connections open");
            }

            let closing: Vec<Connection> = state.connections.drain(pos..).collect();
            for conn in closing.iter().rev() {
                if state.arenas.contains(conn.arena) {
                    state.arenas.destroy(conn.arena)?;
                }
            }
            let previous = closing[0].previous;
            if state.arenas.contains(previous) {
                state.arenas.switch_to(previous)?;
            }
            state.prune();
        }
        self.dispatch();
        debug!(connection = %id, "disconnected");
        Ok(())
    }

    /// Number of open connections
    pub fn connection_depth(&self) -> usize {
        self.shared.state.borrow().connections.len()
    }

    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.shared
            .state
            .borrow()
            .connections
            .iter()
            .any(|conn| conn.id == id)
    }

    // ========== Plans ==========

    /// Compile `sql` into a plan allocated in a fresh child of the current
    /// arena
    pub fn compile(&self, sql: &str, param_types: &[TypeTag]) -> Result<(NativePtr, ArenaId)> {
        let query = CompiledQuery::compile(sql, param_types)?;
        let (ptr, arena) = {
            let mut state = self.shared.state.borrow_mut();
            state.current_connection()?;
            let parent = state.arenas.current();
            let arena = state.arenas.create(parent, "SPI Plan")?;
            let ptr = state.arenas.alloc(arena)?;
            state.plans.insert(ptr, CompiledPlan { query, arena });
            (ptr, arena)
        };
        self.dispatch();
        debug!(%ptr, %arena, sql, "compiled plan");
        Ok((ptr, arena))
    }

    /// Move a plan under the cache arena so it survives scope teardown
    pub fn promote(&self, ptr: NativePtr) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            let arena = state.plan(ptr)?.arena;
            let cache = state.cache;
            state.arenas.reparent(arena, cache)?;
        }
        self.dispatch();
        debug!(%ptr, "promoted plan");
        Ok(())
    }

    /// Release a plan and its arena
    pub fn free_plan(&self, ptr: NativePtr) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            let arena = state.plan(ptr)?.arena;
            state.arenas.destroy(arena)?;
            state.prune();
        }
        self.dispatch();
        debug!(%ptr, "freed plan");
        Ok(())
    }

    /// Parameter types a plan was compiled with
    pub fn plan_signature(&self, ptr: NativePtr) -> Result<Vec<TypeTag>> {
        let state = self.shared.state.borrow();
        Ok(state.plan(ptr)?.query.param_types().to_vec())
    }

    // ========== Execution ==========

    /// Run a statement with bound arguments on `connection`. Rows land in a
    /// tuple table owned by that connection's arena. `limit` of 0 means no
    /// limit.
    pub fn execute(
        &self,
        connection: ConnectionId,
        target: ExecTarget<'_>,
        args: Vec<Datum>,
        arg_types: &[TypeTag],
        limit: usize,
    ) -> Result<Execution> {
        let (rows, columns) = {
            let state = self.shared.state.borrow();
            state.connection(connection)?;
            if state.current_connection()?.id != connection {
                warn!(%connection, "executing on a connection that is not innermost");
            }
            match target {
                ExecTarget::Sql(sql) => {
                    let query = CompiledQuery::compile(sql, arg_types)?;
                    check_arguments(query.param_types(), &args)?;
                    (query.run(&args, limit)?, query.columns().to_vec())
                }
                ExecTarget::Plan(ptr) => {
                    let query = &state.plan(ptr)?.query;
                    check_arguments(query.param_types(), &args)?;
                    (query.run(&args, limit)?, query.columns().to_vec())
                }
            }
        };

        let processed = rows.len();
        let (tuptable, arena) = {
            let mut state = self.shared.state.borrow_mut();
            let arena = state.connection(connection)?.arena;
            let tuptable = state.arenas.alloc(arena)?;
            state.tuptables.insert(tuptable, TupleTable { rows });
            (tuptable, arena)
        };
        self.dispatch();
        debug!(processed, %tuptable, "executed");

        Ok(Execution {
            processed,
            tuptable,
            arena,
            columns,
        })
    }

    /// Values of one row of a tuple table
    pub fn native_row(&self, tuptable: NativePtr, row: usize) -> Result<Vec<Datum>> {
        let state = self.shared.state.borrow();
        let table = state.tuptables.get(&tuptable).ok_or(Error::StalePointer {
            addr: tuptable.addr(),
            epoch: 0,
        })?;
        table.rows.get(row).cloned().ok_or(Error::OutOfBounds {
            index: row,
            len: table.rows.len(),
        })
    }

    /// Release a tuple table ahead of its connection arena
    pub fn free_tuptable(&self, tuptable: NativePtr) -> Result<()> {
        {
            let mut state = self.shared.state.borrow_mut();
            if state.tuptables.remove(&tuptable).is_none() {
                return Err(Error::StalePointer {
                    addr: tuptable.addr(),
                    epoch: 0,
                });
            }
            state.arenas.free(tuptable)?;
        }
        self.dispatch();
        debug!(%tuptable, "freed tuple table");
        Ok(())
    }
}

/// Bound values must agree with the declared parameter types
fn check_arguments(param_types: &[TypeTag], args: &[Datum]) -> Result<()> {
    if param_types.len() != args.len() {
        return Err(Error::ExecutionError(format!(
            "statement expects {} parameter(s), got {}",
            param_types.len(),
            args.len()
        )));
    }
    for (i, (expected, arg)) in param_types.iter().zip(args).enumerate() {
        if let Some(actual) = arg.type_tag() {
            if actual != *expected {
                return Err(Error::ExecutionError(format!(
                    "parameter ${} declared {} but bound {}",
                    i + 1,
                    expected,
                    actual
                )));
            }
        }
    }
    Ok(())
}
