use std::sync::Arc;

use nf_core::{NfError, NfResult, NfValue, NodeId, SyntaxNode};
use parking_lot::{Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::bridge::{
    ArityTypeResolver, EmptyHostFunctionRegistry, FieldAccessPolicy, HostFunctionRegistry,
    NativeRegistry, OverloadResolver,
};
use crate::builtins::core_registry;
use crate::context::{ContextArena, ContextId, Deregistration};
use crate::evaluator::{Evaluator, Flow, TreeWalker};
use crate::options::{DiagnosticSymbols, RuntimeOptions};

mod arguments;
mod dispatch;
mod qualified;
mod scope;
mod tasks;

pub use arguments::{bind_arguments, CallArgument};
pub use qualified::{QualifiedPath, OPTIONAL_MARKER};
pub use tasks::{Task, TaskCleanup};

/// Shared evaluation state. Clones refer to the same contexts, so a clone
/// can be moved into a spawned task.
#[derive(Clone)]
pub struct Runtime {
    shared: Arc<RuntimeShared>,
}

struct RuntimeShared {
    arena: Mutex<ContextArena>,
    builtins: NativeRegistry,
    host_functions: Arc<dyn HostFunctionRegistry>,
    overload_resolver: Arc<dyn OverloadResolver>,
    evaluator: Arc<dyn Evaluator>,
    field_access: FieldAccessPolicy,
    symbols: DiagnosticSymbols,
}

impl Runtime {
    pub fn new(options: RuntimeOptions) -> NfResult<Self> {
        let host_functions: Arc<dyn HostFunctionRegistry> = options
            .host_functions
            .unwrap_or_else(|| Arc::new(EmptyHostFunctionRegistry));
        let builtins = if options.install_builtins {
            core_registry()
        } else {
            NativeRegistry::new()
        };

        if let Some(name) = host_functions
            .names()
            .into_iter()
            .find(|name| builtins.contains(name))
        {
            return Err(NfError::new(
                "RUNTIME_FUNCTION_REDECLARED",
                format!("Host function \"{}\" conflicts with a builtin function.", name),
            ));
        }

        Ok(Self {
            shared: Arc::new(RuntimeShared {
                arena: Mutex::new(ContextArena::new()),
                builtins,
                host_functions,
                overload_resolver: options
                    .overload_resolver
                    .unwrap_or_else(|| Arc::new(ArityTypeResolver)),
                evaluator: options.evaluator.unwrap_or_else(|| Arc::new(TreeWalker)),
                field_access: options.field_access,
                symbols: options.symbols,
            }),
        })
    }

    fn arena(&self) -> MutexGuard<'_, ContextArena> {
        self.shared.arena.lock()
    }

    pub fn root(&self) -> ContextId {
        ContextId::ROOT
    }

    pub fn symbols(&self) -> &DiagnosticSymbols {
        &self.shared.symbols
    }

    pub fn field_access(&self) -> FieldAccessPolicy {
        self.shared.field_access
    }

    pub fn visit(&self, context: ContextId, node: &SyntaxNode) -> NfResult<Flow> {
        self.shared.evaluator.visit(self, context, node)
    }

    pub fn evaluate(&self, context: ContextId, node: &SyntaxNode) -> NfResult<NfValue> {
        self.visit(context, node).map(Flow::into_value)
    }

    /// Evaluates a whole program in the root context.
    pub fn run_program(&self, program: &SyntaxNode) -> NfResult<NfValue> {
        debug!(node = program.id, "run program");
        self.evaluate(ContextId::ROOT, program)
    }

    pub fn create_context(&self, parent: ContextId) -> NfResult<ContextId> {
        let id = self.arena().register(parent)?;
        trace!(context = %id, parent = %parent, "register context");
        Ok(id)
    }

    /// Tears a context down, or marks it for removal while it or any child
    /// still has pending tasks. A marked context is removed when its last
    /// task completes.
    pub fn deregister_context(&self, id: ContextId) -> NfResult<Deregistration> {
        if id == ContextId::ROOT {
            return Err(NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                "The root context cannot be deregistered.",
            ));
        }
        let mut arena = self.arena();
        if arena.has_pending_in_subtree(id) {
            let record = arena.get_mut(id)?;
            record.marked_for_removal = true;
            let executed = record.executed.iter().copied().collect::<Vec<_>>();
            if let Some(parent) = record.parent {
                arena.get_mut(parent)?.executed.extend(executed);
            }
            debug!(context = %id, "deregistration deferred until pending tasks complete");
            return Ok(Deregistration::Deferred);
        }
        arena.remove(id)?;
        trace!(context = %id, "deregister context");
        Ok(Deregistration::Removed)
    }

    pub fn is_registered(&self, id: ContextId) -> bool {
        self.arena().contains(id)
    }

    pub fn context_count(&self) -> usize {
        self.arena().len()
    }

    pub fn depth(&self, id: ContextId) -> NfResult<usize> {
        Ok(self.arena().get(id)?.depth)
    }

    pub fn parent(&self, id: ContextId) -> NfResult<Option<ContextId>> {
        Ok(self.arena().get(id)?.parent)
    }

    pub fn pending_tasks(&self, id: ContextId) -> NfResult<usize> {
        Ok(self.arena().get(id)?.pending())
    }

    pub fn is_marked_for_removal(&self, id: ContextId) -> NfResult<bool> {
        Ok(self.arena().get(id)?.marked_for_removal)
    }

    pub fn mark_executed(&self, id: ContextId, node: &SyntaxNode) -> NfResult<()> {
        self.arena().get_mut(id)?.executed.insert(node.id);
        Ok(())
    }

    pub fn has_executed(&self, id: ContextId, node: NodeId) -> NfResult<bool> {
        Ok(self.arena().get(id)?.executed.contains(&node))
    }

    /// Forgets the executed markers of `subtree`, e.g. before the next
    /// iteration of a loop body.
    pub fn clear_executed(&self, id: ContextId, subtree: &SyntaxNode) -> NfResult<()> {
        let mut arena = self.arena();
        let record = arena.get_mut(id)?;
        if record.executed.is_empty() {
            return Ok(());
        }
        for node in subtree.descendants() {
            record.executed.remove(&node.id);
        }
        Ok(())
    }

    /// True when an executed `return` lies inside `statement`, or when
    /// `flow` carries a loop signal and an executed `break`/`continue` lies
    /// inside it.
    pub fn should_break_statements(
        &self,
        id: ContextId,
        statement: &SyntaxNode,
        flow: &Flow,
    ) -> NfResult<bool> {
        let arena = self.arena();
        let record = arena.get(id)?;
        let signalled = flow.is_signal();
        Ok(statement.descendants().into_iter().any(|node| {
            match node.control_kind() {
                Some(nf_core::ControlKind::Return) => record.executed.contains(&node.id),
                Some(_) => signalled && record.executed.contains(&node.id),
                None => false,
            }
        }))
    }
}
