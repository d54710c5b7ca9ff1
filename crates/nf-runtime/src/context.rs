use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use nf_core::{DeclaredVariable, NfError, NfResult, NodeId};

use crate::callable::Callable;
use crate::declarations::DeclaredImplementation;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContextId(usize);

impl ContextId {
    pub const ROOT: ContextId = ContextId(0);

    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContextId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ctx#{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deregistration {
    Removed,
    Deferred,
}

#[derive(Debug)]
pub(crate) struct ContextRecord {
    pub(crate) parent: Option<ContextId>,
    pub(crate) depth: usize,
    pub(crate) variables: BTreeMap<String, DeclaredVariable>,
    pub(crate) functions: BTreeMap<String, Callable>,
    pub(crate) implementations: BTreeMap<String, Arc<DeclaredImplementation>>,
    pub(crate) executed: HashSet<NodeId>,
    pub(crate) children: BTreeSet<ContextId>,
    pub(crate) pending_tasks: Arc<AtomicUsize>,
    pub(crate) marked_for_removal: bool,
}

impl ContextRecord {
    fn new(parent: Option<ContextId>, depth: usize) -> Self {
        Self {
            parent,
            depth,
            variables: BTreeMap::new(),
            functions: BTreeMap::new(),
            implementations: BTreeMap::new(),
            executed: HashSet::new(),
            children: BTreeSet::new(),
            pending_tasks: Arc::new(AtomicUsize::new(0)),
            marked_for_removal: false,
        }
    }

    pub(crate) fn pending(&self) -> usize {
        self.pending_tasks.load(Ordering::SeqCst)
    }
}

/// Contexts addressed by id. Parents are referenced by id only, so removal
/// never has to untangle ownership cycles.
#[derive(Debug)]
pub(crate) struct ContextArena {
    records: HashMap<ContextId, ContextRecord>,
    next_id: usize,
}

impl ContextArena {
    pub(crate) fn new() -> Self {
        let mut records = HashMap::new();
        records.insert(ContextId::ROOT, ContextRecord::new(None, 0));
        Self {
            records,
            next_id: 1,
        }
    }

    pub(crate) fn get(&self, id: ContextId) -> NfResult<&ContextRecord> {
        self.records.get(&id).ok_or_else(|| missing_context(id))
    }

    pub(crate) fn get_mut(&mut self, id: ContextId) -> NfResult<&mut ContextRecord> {
        self.records.get_mut(&id).ok_or_else(|| missing_context(id))
    }

    pub(crate) fn contains(&self, id: ContextId) -> bool {
        self.records.contains_key(&id)
    }

    pub(crate) fn len(&self) -> usize {
        self.records.len()
    }

    pub(crate) fn register(&mut self, parent: ContextId) -> NfResult<ContextId> {
        let depth = self.get(parent)?.depth + 1;
        let id = ContextId(self.next_id);
        self.next_id += 1;
        self.records.insert(id, ContextRecord::new(Some(parent), depth));
        self.get_mut(parent)?.children.insert(id);
        Ok(id)
    }

    /// `id` followed by its ancestors up to the root.
    pub(crate) fn chain(&self, id: ContextId) -> Vec<ContextId> {
        let mut chain = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            let Some(record) = self.records.get(&current) else {
                break;
            };
            chain.push(current);
            cursor = record.parent;
        }
        chain
    }

    pub(crate) fn has_pending_in_subtree(&self, id: ContextId) -> bool {
        let Some(record) = self.records.get(&id) else {
            return false;
        };
        record.pending() > 0
            || record
                .children
                .iter()
                .any(|child| self.has_pending_in_subtree(*child))
    }

    /// Removes `id` and everything below it. Declarations whose depth does
    /// not exceed the parent's depth, and executed markers, move to the
    /// parent.
    pub(crate) fn remove(&mut self, id: ContextId) -> NfResult<()> {
        let children = self.get(id)?.children.iter().copied().collect::<Vec<_>>();
        for child in children {
            self.remove(child)?;
        }
        let record = self.records.remove(&id).ok_or_else(|| missing_context(id))?;
        let Some(parent_id) = record.parent else {
            return Ok(());
        };
        let Some(parent) = self.records.get_mut(&parent_id) else {
            return Ok(());
        };
        parent.children.remove(&id);
        let parent_depth = parent.depth;
        for (name, variable) in record.variables {
            if variable.depth() <= parent_depth {
                parent.variables.entry(name).or_insert(variable);
            }
        }
        for (name, callable) in record.functions {
            let depth = match &callable {
                Callable::Declared(function) => function.depth(),
                _ => record.depth,
            };
            if depth <= parent_depth {
                parent.functions.entry(name).or_insert(callable);
            }
        }
        for (name, implementation) in record.implementations {
            if implementation.depth() <= parent_depth {
                parent.implementations.entry(name).or_insert(implementation);
            }
        }
        parent.executed.extend(record.executed);
        Ok(())
    }

    /// Contexts in `from`'s chain that were marked for removal and no
    /// longer have pending work below them, outermost last.
    pub(crate) fn ready_removals(&self, from: ContextId) -> Vec<ContextId> {
        self.chain(from)
            .into_iter()
            .filter(|id| {
                self.records
                    .get(id)
                    .is_some_and(|record| record.marked_for_removal)
                    && !self.has_pending_in_subtree(*id)
            })
            .collect()
    }
}

pub(crate) fn missing_context(id: ContextId) -> NfError {
    NfError::new(
        "RUNTIME_CONTEXT_MISSING",
        format!("Context {} is not registered.", id),
    )
}
