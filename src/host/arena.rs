//! Host arena allocator
//!
//! A strict tree of arenas rooted at the top arena. Allocations are plain
//! addresses owned by exactly one arena; destroying an arena frees its whole
//! subtree. With address recycling enabled, freed addresses are handed out
//! again, most recently freed first.
//!
//! Every mutation queues an [`ArenaEvent`]; the host drains the queue and
//! forwards it to its listeners.

use std::collections::HashMap;

use indexmap::IndexMap;

use crate::error::{Error, Result};
use crate::memory::{ArenaEvent, ArenaId, NativePtr};

const FIRST_ADDRESS: usize = 0x1000;
const ALLOC_STRIDE: usize = 0x40;

#[derive(Debug)]
struct Node {
    parent: Option<ArenaId>,
    children: Vec<ArenaId>,
    allocations: Vec<NativePtr>,
}

#[derive(Debug)]
pub(crate) struct ArenaTree {
    nodes: IndexMap<ArenaId, Node>,
    owners: HashMap<NativePtr, ArenaId>,
    next_id: u64,
    next_addr: usize,
    free_list: Vec<NativePtr>,
    recycle: bool,
    top: ArenaId,
    current: ArenaId,
    events: Vec<ArenaEvent>,
}

impl ArenaTree {
    /// Create a tree holding only the top arena, which is also current
    pub fn new(recycle: bool) -> Self {
        let top = ArenaId(1);
        let mut nodes = IndexMap::new();
        nodes.insert(
            top,
            Node {
                parent: None,
                children: Vec::new(),
                allocations: Vec::new(),
            },
        );

        Self {
            nodes,
            owners: HashMap::new(),
            next_id: 2,
            next_addr: FIRST_ADDRESS,
            free_list: Vec::new(),
            recycle,
            top,
            current: top,
            events: vec![
                ArenaEvent::Created {
                    arena: top,
                    parent: None,
                    name: "TopMemoryContext".to_string(),
                },
                ArenaEvent::Switched { arena: top },
            ],
        }
    }

    pub fn top(&self) -> ArenaId {
        self.top
    }

    pub fn current(&self) -> ArenaId {
        self.current
    }

    pub fn contains(&self, arena: ArenaId) -> bool {
        self.nodes.contains_key(&arena)
    }

    pub fn parent_of(&self, arena: ArenaId) -> Option<ArenaId> {
        self.nodes.get(&arena).and_then(|node| node.parent)
    }

    pub fn owner_of(&self, ptr: NativePtr) -> Option<ArenaId> {
        self.owners.get(&ptr).copied()
    }

    /// Create a child arena
    pub fn create(&mut self, parent: ArenaId, name: &str) -> Result<ArenaId> {
        if !self.contains(parent) {
            return Err(Error::ArenaGone(parent));
        }
        Ok(self.insert_node(parent, name))
    }

    /// Create a direct child of the top arena, which always exists
    pub fn create_top_level(&mut self, name: &str) -> ArenaId {
        self.insert_node(self.top, name)
    }

    fn insert_node(&mut self, parent: ArenaId, name: &str) -> ArenaId {
        let arena = ArenaId(self.next_id);
        self.next_id += 1;
        if let Some(parent_node) = self.nodes.get_mut(&parent) {
            parent_node.children.push(arena);
        }

        self.nodes.insert(
            arena,
            Node {
                parent: Some(parent),
                children: Vec::new(),
                allocations: Vec::new(),
            },
        );
        self.events.push(ArenaEvent::Created {
            arena,
            parent: Some(parent),
            name: name.to_string(),
        });

        arena
    }

    /// Make `arena` current; returns the previously current arena
    pub fn switch_to(&mut self, arena: ArenaId) -> Result<ArenaId> {
        if !self.contains(arena) {
            return Err(Error::ArenaGone(arena));
        }
        let previous = std::mem::replace(&mut self.current, arena);
        if previous != arena {
            self.events.push(ArenaEvent::Switched { arena });
        }
        Ok(previous)
    }

    /// Move `arena` with its subtree under `parent`
    pub fn reparent(&mut self, arena: ArenaId, parent: ArenaId) -> Result<()> {
        if arena == self.top {
            return Err(Error::Internal("cannot reparent the top arena".to_string()));
        }
        if !self.contains(parent) {
            return Err(Error::ArenaGone(parent));
        }
        if arena == parent || self.is_ancestor(arena, parent) {
            return Err(Error::Internal(format!(
                "reparenting {} under {} would create a cycle",
                arena, parent
            )));
        }

        let old_parent = {
            let node = self.nodes.get_mut(&arena).ok_or(Error::ArenaGone(arena))?;
            node.parent.replace(parent)
        };
        if let Some(node) = old_parent.and_then(|p| self.nodes.get_mut(&p)) {
            node.children.retain(|child| *child != arena);
        }
        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.push(arena);
        }

        self.events.push(ArenaEvent::Reparented { arena, parent });
        Ok(())
    }

    /// Destroy `arena` and its subtree; returns every freed allocation.
    ///
    /// If the current arena is inside the subtree, the destroyed arena's
    /// parent becomes current.
    pub fn destroy(&mut self, arena: ArenaId) -> Result<Vec<NativePtr>> {
        if arena == self.top {
            return Err(Error::Internal("cannot destroy the top arena".to_string()));
        }
        let parent = self.parent_of(arena).ok_or(Error::ArenaGone(arena))?;

        if self.current == arena || self.is_ancestor(arena, self.current) {
            self.current = parent;
            self.events.push(ArenaEvent::Switched { arena: parent });
        }

        if let Some(node) = self.nodes.get_mut(&parent) {
            node.children.retain(|child| *child != arena);
        }

        let mut freed = Vec::new();
        self.destroy_node(arena, &mut freed);
        Ok(freed)
    }

    // Children first, so listeners see leaves torn down before their parents
    fn destroy_node(&mut self, arena: ArenaId, freed: &mut Vec<NativePtr>) {
        let Some(node) = self.nodes.shift_remove(&arena) else {
            return;
        };
        for child in node.children {
            self.destroy_node(child, freed);
        }
        for ptr in node.allocations {
            self.owners.remove(&ptr);
            if self.recycle {
                self.free_list.push(ptr);
            }
            freed.push(ptr);
        }
        self.events.push(ArenaEvent::Destroyed { arena });
    }

    /// Allocate one object in `arena`
    pub fn alloc(&mut self, arena: ArenaId) -> Result<NativePtr> {
        if !self.contains(arena) {
            return Err(Error::ArenaGone(arena));
        }
        let ptr = match self.free_list.pop() {
            Some(ptr) => ptr,
            None => {
                let ptr = NativePtr(self.next_addr);
                self.next_addr += ALLOC_STRIDE;
                ptr
            }
        };
        if let Some(node) = self.nodes.get_mut(&arena) {
            node.allocations.push(ptr);
        }
        self.owners.insert(ptr, arena);
        Ok(ptr)
    }

    /// Release one allocation without touching its arena
    pub fn free(&mut self, ptr: NativePtr) -> Result<()> {
        let arena = self.owners.remove(&ptr).ok_or(Error::StalePointer {
            addr: ptr.addr(),
            epoch: 0,
        })?;
        if let Some(node) = self.nodes.get_mut(&arena) {
            node.allocations.retain(|p| *p != ptr);
        }
        if self.recycle {
            self.free_list.push(ptr);
        }
        self.events.push(ArenaEvent::Freed { ptr });
        Ok(())
    }

    pub fn drain_events(&mut self) -> Vec<ArenaEvent> {
        std::mem::take(&mut self.events)
    }

    /// Number of live arenas
    pub fn len(&self) -> usize {
        self.nodes.len()
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
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_and_destroy() {
        let mut tree = ArenaTree::new(false);
        let top = tree.top();
        let txn = tree.create(top, "txn").unwrap();
        let call = tree.create(txn, "call").unwrap();
        let ptr = tree.alloc(call).unwrap();
        assert_eq!(tree.owner_of(ptr), Some(call));

        let freed = tree.destroy(txn).unwrap();
        assert_eq!(freed, vec![ptr]);
        assert!(!tree.contains(call));
        assert_eq!(tree.owner_of(ptr), None);
        assert_eq!(tree.len(), 1);
    }

    #[test]
    fn test_destroy_emits_leaves_first() {
        let mut tree = ArenaTree::new(false);
        let txn = tree.create(tree.top(), "txn").unwrap();
        let call = tree.create(txn, "call").unwrap();
        tree.drain_events();

        tree.destroy(txn).unwrap();
        let events = tree.drain_events();
        assert_eq!(
            events,
            vec![
                ArenaEvent::Destroyed { arena: call },
                ArenaEvent::Destroyed { arena: txn },
            ]
        );
    }

    #[test]
    fn test_recycled_addresses() {
        let mut tree = ArenaTree::new(true);
        let a = tree.create(tree.top(), "a").unwrap();
        let ptr = tree.alloc(a).unwrap();
        tree.destroy(a).unwrap();

        let b = tree.create(tree.top(), "b").unwrap();
        assert_eq!(tree.alloc(b).unwrap(), ptr);
    }

    #[test]
    fn test_free_single_allocation() {
        let mut tree = ArenaTree::new(true);
        let a = tree.create(tree.top(), "a").unwrap();
        let kept = tree.alloc(a).unwrap();
        let ptr = tree.alloc(a).unwrap();
        tree.drain_events();

        tree.free(ptr).unwrap();
        assert_eq!(tree.drain_events(), vec![ArenaEvent::Freed { ptr }]);
        assert_eq!(tree.owner_of(ptr), None);
        assert_eq!(tree.owner_of(kept), Some(a));
        assert!(tree.free(ptr).is_err());

        // Destroying the arena no longer reports the freed address
        assert_eq!(tree.destroy(a).unwrap(), vec![kept]);
    }

    #[test]
    fn test_destroy_current_switches_to_parent() {
        let mut tree = ArenaTree::new(false);
        let top = tree.top();
        let call = tree.create(top, "call").unwrap();
        tree.switch_to(call).unwrap();
        tree.destroy(call).unwrap();
        assert_eq!(tree.current(), top);
    }

    #[test]
    fn test_reparent_rejects_cycles() {
        let mut tree = ArenaTree::new(false);
        let a = tree.create(tree.top(), "a").unwrap();
        let b = tree.create(a, "b").unwrap();
        assert!(tree.reparent(a, b).is_err());
        assert!(tree.reparent(tree.top(), a).is_err());

        let c = tree.create(tree.top(), "c").unwrap();
        tree.reparent(b, c).unwrap();
        assert_eq!(tree.parent_of(b), Some(c));
        tree.destroy(a).unwrap();
        assert!(tree.contains(b));
    }
}
