//! Arena Registry
//!
//! A mirror of the host's arena forest, maintained purely from host
//! notifications, plus an index from native pointers to the arena that
//! backs them. The registry never creates or frees arenas itself.
//!
//! Every registration is stamped with a process-wide epoch. A lookup only
//! succeeds when the caller's epoch matches the live registration for that
//! address, so an address recycled by the host allocator can never make a
//! stale handle look alive again.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, trace};

use super::{ArenaId, Epoch, MemoryContext, NativePtr, TrackedPtr};
use crate::error::{Error, Result};

/// Epochs are unique across every registry in the process
static NEXT_EPOCH: AtomicU64 = AtomicU64::new(1);

/// Host-side arena lifecycle notifications
#[derive(Debug, Clone, PartialEq)]
pub enum ArenaEvent {
    /// A new arena was created
    Created {
        arena: ArenaId,
        parent: Option<ArenaId>,
        name: String,
    },
    /// The host's current arena changed
    Switched { arena: ArenaId },
    /// An arena (and its subtree) moved under a new parent
    Reparented { arena: ArenaId, parent: ArenaId },
    /// A single allocation was released without destroying its arena
    Freed { ptr: NativePtr },
    /// An arena was torn down
    Destroyed { arena: ArenaId },
}

/// Subscriber to host arena notifications
pub trait ArenaListener {
    fn on_arena_event(&mut self, event: &ArenaEvent);
}

#[derive(Debug)]
struct ArenaNode {
    name: String,
    parent: Option<ArenaId>,
    children: BTreeSet<ArenaId>,
    pointers: HashSet<NativePtr>,
}

#[derive(Debug, Clone, Copy)]
struct Registration {
    arena: ArenaId,
    epoch: Epoch,
}

/// Pointer ownership and arena liveness index
#[derive(Debug, Default)]
pub struct ArenaRegistry {
    /// Live arenas only; destroyed arenas are removed
    arenas: HashMap<ArenaId, ArenaNode>,
    /// Native address -> current registration
    pointers: HashMap<NativePtr, Registration>,
    /// Arena active at the call site
    current: Option<ArenaId>,
}

impl ArenaRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// The arena active at the call site
    pub fn current(&self) -> Result<MemoryContext> {
        let arena = self
            .current
            .ok_or_else(|| Error::Internal("no current arena".to_string()))?;
        self.context(arena)
    }

    /// Handle for a live arena
    pub fn context(&self, arena: ArenaId) -> Result<MemoryContext> {
        let node = self.arenas.get(&arena).ok_or(Error::ArenaGone(arena))?;
        Ok(MemoryContext::new(arena, &node.name))
    }

    /// Associate `ptr` with `arena` under a fresh epoch.
    ///
    /// Any earlier association of the same address is dropped: the host only
    /// hands out an address again after the previous owner released it.
    pub fn register(&mut self, ptr: NativePtr, arena: ArenaId) -> Result<TrackedPtr> {
        if !self.arenas.contains_key(&arena) {
            return Err(Error::ArenaGone(arena));
        }

        if let Some(old) = self.pointers.remove(&ptr) {
            if let Some(node) = self.arenas.get_mut(&old.arena) {
                node.pointers.remove(&ptr);
            }
        }

        let epoch = NEXT_EPOCH.fetch_add(1, Ordering::Relaxed);
        if let Some(node) = self.arenas.get_mut(&arena) {
            node.pointers.insert(ptr);
        }
        self.pointers.insert(ptr, Registration { arena, epoch });
        trace!(%ptr, %arena, epoch, "registered pointer");

        Ok(TrackedPtr { ptr, epoch })
    }

    /// The live arena backing `tracked`, or a stale-reference error
    pub fn for_pointer(&self, tracked: TrackedPtr) -> Result<MemoryContext> {
        match self.pointers.get(&tracked.ptr) {
            Some(reg) if reg.epoch == tracked.epoch => self.context(reg.arena),
            _ => {
                trace!(ptr = %tracked.ptr, epoch = tracked.epoch, "stale pointer lookup");
                Err(Error::StalePointer {
                    addr: tracked.ptr.addr(),
                    epoch: tracked.epoch,
                })
            }
        }
    }

    /// Check if an arena is still live
    pub fn is_alive(&self, arena: ArenaId) -> bool {
        self.arenas.contains_key(&arena)
    }

    pub fn parent_of(&self, arena: ArenaId) -> Option<ArenaId> {
        self.arenas.get(&arena).and_then(|node| node.parent)
    }

    pub fn children_of(&self, arena: ArenaId) -> Vec<ArenaId> {
        self.arenas
            .get(&arena)
            .map(|node| node.children.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Number of live arenas
    pub fn live_arenas(&self) -> usize {
        self.arenas.len()
    }

    /// Number of live pointer registrations
    pub fn pointer_count(&self) -> usize {
        self.pointers.len()
    }

    /// Render the live forest, one arena per line, current arena starred
    pub fn dump(&self) -> String {
        let mut roots: Vec<ArenaId> = self
            .arenas
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(id, _)| *id)
            .collect();
        roots.sort();

        let mut output = String::new();
        for root in roots {
            self.dump_node(root, 0, &mut output);
        }
        output
    }

    fn dump_node(&self, arena: ArenaId, depth: usize, output: &mut String) {
        let Some(node) = self.arenas.get(&arena) else {
            return;
        };
        let marker = if self.current == Some(arena) { " *" } else { "" };
        output.push_str(&format!(
            "{}{} {} ({} ptrs){}\n",
            "  ".repeat(depth),
            node.name,
            arena,
            node.pointers.len(),
            marker
        ));
        for child in &node.children {
            self.dump_node(*child, depth + 1, output);
        }
    }

    fn is_ancestor(&self, ancestor: ArenaId, mut arena: ArenaId) -> bool {
        while let Some(parent) = self.parent_of(arena) {
            if parent == ancestor {
                return true;
            }
            arena = parent;
        }
        false
    }

    /// Remove `arena` and everything below it; returns the number of arenas removed
    fn destroy_subtree(&mut self, arena: ArenaId) -> usize {
        let parent = match self.arenas.get(&arena) {
            Some(node) => node.parent,
            None => return 0,
        };

        if let Some(parent) = parent.and_then(|p| self.arenas.get_mut(&p)) {
            parent.children.remove(&arena);
        }

        let mut removed = 0;
        let mut stack = vec![arena];
        while let Some(id) = stack.pop() {
            if let Some(node) = self.arenas.remove(&id) {
                for ptr in &node.pointers {
                    self.pointers.remove(ptr);
                }
                stack.extend(node.children.iter().copied());
                removed += 1;
            }
        }
        removed
    }
}

impl ArenaListener for ArenaRegistry {
    fn on_arena_event(&mut self, event: &ArenaEvent) {
        match event {
            ArenaEvent::Created {
                arena,
                parent,
                name,
            } => {
                if let Some(node) = parent.and_then(|p| self.arenas.get_mut(&p)) {
                    node.children.insert(*arena);
                }
                self.arenas.insert(
                    *arena,
                    ArenaNode {
                        name: name.clone(),
                        parent: *parent,
                        children: BTreeSet::new(),
                        pointers: HashSet::new(),
                    },
                );
                trace!(%arena, name = %name, "arena created");
            }
            ArenaEvent::Switched { arena } => {
                self.current = Some(*arena);
            }
            ArenaEvent::Reparented { arena, parent } => {
                if *arena == *parent || self.is_ancestor(*arena, *parent) {
                    return;
                }
                let old_parent = match self.arenas.get_mut(arena) {
                    Some(node) => node.parent.replace(*parent),
                    None => return,
                };
                if let Some(node) = old_parent.and_then(|p| self.arenas.get_mut(&p)) {
                    node.children.remove(arena);
                }
                if let Some(node) = self.arenas.get_mut(parent) {
                    node.children.insert(*arena);
                }
                debug!(%arena, %parent, "arena reparented");
            }
            ArenaEvent::Freed { ptr } => {
                if let Some(reg) = self.pointers.remove(ptr) {
                    if let Some(node) = self.arenas.get_mut(&reg.arena) {
                        node.pointers.remove(ptr);
                    }
                }
            }
            ArenaEvent::Destroyed { arena } => {
                let parent = self.parent_of(*arena);
                let removed = self.destroy_subtree(*arena);
                if removed > 0 {
                    debug!(%arena, removed, "arena destroyed");
                }
                if let Some(current) = self.current {
                    if !self.is_alive(current) {
                        self.current = parent;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn created(registry: &mut ArenaRegistry, id: u64, parent: Option<u64>) -> ArenaId {
        let arena = ArenaId(id);
        registry.on_arena_event(&ArenaEvent::Created {
            arena,
            parent: parent.map(ArenaId),
            name: format!("arena{}", id),
        });
        arena
    }

    #[test]
    fn test_register_and_lookup() {
        let mut registry = ArenaRegistry::new();
        let top = created(&mut registry, 1, None);
        registry.on_arena_event(&ArenaEvent::Switched { arena: top });

        let tracked = registry.register(NativePtr(0x1000), top).unwrap();
        let ctx = registry.for_pointer(tracked).unwrap();
        assert_eq!(ctx.id(), top);
        assert_eq!(registry.current().unwrap().id(), top);
    }

    #[test]
    fn test_destroy_invalidates_subtree() {
        let mut registry = ArenaRegistry::new();
        let top = created(&mut registry, 1, None);
        let txn = created(&mut registry, 2, Some(1));
        let call = created(&mut registry, 3, Some(2));

        let a = registry.register(NativePtr(0x1000), txn).unwrap();
        let b = registry.register(NativePtr(0x1040), call).unwrap();
        let c = registry.register(NativePtr(0x1080), top).unwrap();

        registry.on_arena_event(&ArenaEvent::Destroyed { arena: txn });

        assert!(registry.for_pointer(a).unwrap_err().is_stale());
        assert!(registry.for_pointer(b).unwrap_err().is_stale());
        assert!(registry.for_pointer(c).is_ok());
        assert!(!registry.is_alive(call));
        assert!(registry.children_of(top).is_empty());
        assert_eq!(registry.live_arenas(), 1);
    }

    #[test]
    fn test_reused_address_is_not_alive() {
        let mut registry = ArenaRegistry::new();
        created(&mut registry, 1, None);
        let first = created(&mut registry, 2, Some(1));
        let second = created(&mut registry, 3, Some(1));

        let old = registry.register(NativePtr(0x2000), first).unwrap();
        registry.on_arena_event(&ArenaEvent::Destroyed { arena: first });

        let new = registry.register(NativePtr(0x2000), second).unwrap();
        assert_ne!(old.epoch(), new.epoch());
        assert!(registry.for_pointer(old).unwrap_err().is_stale());
        assert_eq!(registry.for_pointer(new).unwrap().id(), second);
    }

    #[test]
    fn test_reparent_survives_old_parent() {
        let mut registry = ArenaRegistry::new();
        let top = created(&mut registry, 1, None);
        let cache = created(&mut registry, 2, Some(1));
        let proc_arena = created(&mut registry, 3, Some(1));
        let plan = created(&mut registry, 4, Some(3));

        let tracked = registry.register(NativePtr(0x3000), plan).unwrap();
        registry.on_arena_event(&ArenaEvent::Reparented {
            arena: plan,
            parent: cache,
        });
        registry.on_arena_event(&ArenaEvent::Destroyed { arena: proc_arena });

        assert_eq!(registry.for_pointer(tracked).unwrap().id(), plan);
        assert_eq!(registry.parent_of(plan), Some(cache));
        assert_eq!(registry.children_of(top), vec![cache]);
    }

    #[test]
    fn test_register_into_dead_arena_fails() {
        let mut registry = ArenaRegistry::new();
        created(&mut registry, 1, None);
        let gone = created(&mut registry, 2, Some(1));
        registry.on_arena_event(&ArenaEvent::Destroyed { arena: gone });

        let err = registry.register(NativePtr(0x10), gone).unwrap_err();
        assert!(err.is_stale());
    }

    #[test]
    fn test_freed_pointer_is_stale() {
        let mut registry = ArenaRegistry::new();
        let top = created(&mut registry, 1, None);
        let tracked = registry.register(NativePtr(0x40), top).unwrap();
        registry.on_arena_event(&ArenaEvent::Freed {
            ptr: NativePtr(0x40),
        });
        assert!(registry.for_pointer(tracked).is_err());
        assert_eq!(registry.pointer_count(), 0);
    }

    #[test]
    fn test_current_falls_back_to_parent() {
        let mut registry = ArenaRegistry::new();
        let top = created(&mut registry, 1, None);
        let call = created(&mut registry, 2, Some(1));
        registry.on_arena_event(&ArenaEvent::Switched { arena: call });
        registry.on_arena_event(&ArenaEvent::Destroyed { arena: call });
        assert_eq!(registry.current().unwrap().id(), top);
    }
}
