use std::sync::Arc;

use nf_core::{DeclaredVariable, NfError, NfResult, NfType, NfValue};
use tracing::trace;

use super::Runtime;
use crate::bridge::HostFunctionRegistry;
use crate::call_state;
use crate::callable::Callable;
use crate::context::ContextId;
use crate::declarations::{DeclaredFunction, DeclaredImplementation};

const SELF_PREFIX: &str = "self::";

/// Splits `Impl::member`; qualified host names (`a:b::m`) do not qualify.
fn split_member(name: &str) -> Option<(&str, &str)> {
    let (owner, member) = name.rsplit_once("::")?;
    if owner.is_empty() || member.is_empty() || owner.contains(':') {
        return None;
    }
    Some((owner, member))
}

impl Runtime {
    /// Binds a variable in `context`. A name already bound in the same
    /// context cannot be declared again; outer bindings may be shadowed.
    pub fn define_variable(&self, context: ContextId, variable: DeclaredVariable) -> NfResult<()> {
        let mut arena = self.arena();
        let record = arena.get_mut(context)?;
        if record.variables.contains_key(variable.name()) {
            let error = NfError::new(
                "RUNTIME_VARIABLE_REDECLARED",
                format!(
                    "Variable \"{}\" is already declared in the current scope.",
                    variable.name()
                ),
            );
            return Err(match variable.span() {
                Some(span) => error.at(span),
                None => error,
            });
        }
        trace!(context = %context, name = variable.name(), "define variable");
        record
            .variables
            .insert(variable.name().to_string(), variable);
        Ok(())
    }

    /// Declares a variable at the depth of `context`.
    pub fn declare(
        &self,
        context: ContextId,
        name: &str,
        constant: bool,
        declared_type: NfType,
        value: NfValue,
    ) -> NfResult<()> {
        let depth = self.depth(context)?;
        let variable = DeclaredVariable::new(depth, name, constant, declared_type, value)?;
        self.define_variable(context, variable)
    }

    pub fn find_variable(
        &self,
        context: ContextId,
        name: &str,
        local_only: bool,
    ) -> NfResult<Option<DeclaredVariable>> {
        let arena = self.arena();
        arena.get(context)?;
        for id in arena.chain(context) {
            let record = arena.get(id)?;
            if let Some(variable) = record.variables.get(name) {
                return Ok(Some(variable.clone()));
            }
            if local_only {
                break;
            }
        }
        Ok(None)
    }

    pub fn get_variable(
        &self,
        context: ContextId,
        name: &str,
        local_only: bool,
    ) -> NfResult<DeclaredVariable> {
        self.find_variable(context, name, local_only)?
            .ok_or_else(|| variable_not_found(name))
    }

    pub fn contains_variable(&self, context: ContextId, name: &str, local_only: bool) -> bool {
        matches!(self.find_variable(context, name, local_only), Ok(Some(_)))
    }

    /// Reassigns the nearest visible binding of `name`.
    pub fn assign_variable(&self, context: ContextId, name: &str, value: NfValue) -> NfResult<()> {
        let mut arena = self.arena();
        arena.get(context)?;
        for id in arena.chain(context) {
            if let Some(variable) = arena.get_mut(id)?.variables.get_mut(name) {
                return variable.assign(value);
            }
        }
        Err(variable_not_found(name))
    }

    pub fn define_function(&self, context: ContextId, function: Arc<DeclaredFunction>) -> NfResult<()> {
        let mut arena = self.arena();
        let record = arena.get_mut(context)?;
        let name = function.qualified_name();
        if record.functions.contains_key(&name) {
            return Err(NfError::with_span(
                "RUNTIME_FUNCTION_REDECLARED",
                format!("Function \"{}\" is already declared in the current scope.", name),
                function.declaration().span.clone(),
            ));
        }
        trace!(context = %context, name = %name, "define function");
        record.functions.insert(name, Callable::Declared(function));
        Ok(())
    }

    pub fn define_implementation(
        &self,
        context: ContextId,
        implementation: DeclaredImplementation,
    ) -> NfResult<()> {
        let mut arena = self.arena();
        let record = arena.get_mut(context)?;
        if record.implementations.contains_key(implementation.name()) {
            return Err(NfError::new(
                "RUNTIME_IMPLEMENTATION_REDECLARED",
                format!(
                    "Implementation \"{}\" is already declared in the current scope.",
                    implementation.name()
                ),
            ));
        }
        trace!(context = %context, name = implementation.name(), "define implementation");
        record
            .implementations
            .insert(implementation.name().to_string(), Arc::new(implementation));
        Ok(())
    }

    /// Resolves a call-site name: local functions and implementation
    /// members up the context chain, then builtins, then host functions.
    /// `self::m` refers to a member of the current implementation.
    pub fn find_function(
        &self,
        context: ContextId,
        name: &str,
        local_only: bool,
    ) -> NfResult<Option<Callable>> {
        let name = self.expand_self_reference(name)?;
        {
            let arena = self.arena();
            arena.get(context)?;
            let member = split_member(&name);
            for id in arena.chain(context) {
                let record = arena.get(id)?;
                if let Some(callable) = record.functions.get(&name) {
                    return Ok(Some(callable.clone()));
                }
                if let Some((owner, method)) = member {
                    if let Some(function) = record
                        .implementations
                        .get(owner)
                        .and_then(|implementation| implementation.function(method))
                    {
                        return Ok(Some(Callable::Declared(function)));
                    }
                }
                if local_only {
                    return Ok(None);
                }
            }
        }
        Ok(self.find_native(&name))
    }

    pub(crate) fn find_native(&self, name: &str) -> Option<Callable> {
        self.shared
            .builtins
            .resolve(name)
            .or_else(|| self.shared.host_functions.resolve(name))
    }

    pub fn get_function(&self, context: ContextId, name: &str, local_only: bool) -> NfResult<Callable> {
        self.find_function(context, name, local_only)?
            .ok_or_else(|| invocable_not_found(name))
    }

    pub fn contains_function(&self, context: ContextId, name: &str, local_only: bool) -> bool {
        matches!(self.find_function(context, name, local_only), Ok(Some(_)))
    }

    fn expand_self_reference(&self, name: &str) -> NfResult<String> {
        let Some(member) = name.strip_prefix(SELF_PREFIX) else {
            return Ok(name.to_string());
        };
        let implementation = call_state::current_implementation().ok_or_else(|| {
            NfError::new(
                "RUNTIME_INVOCABLE_NOT_FOUND",
                format!("\"{}\" is used outside of an implementation.", name),
            )
        })?;
        Ok(format!("{}::{}", implementation, member))
    }
}

pub(crate) fn variable_not_found(name: &str) -> NfError {
    NfError::new(
        "RUNTIME_VARIABLE_NOT_FOUND",
        format!("Variable \"{}\" was not found.", name),
    )
}

pub(crate) fn invocable_not_found(name: &str) -> NfError {
    NfError::new(
        "RUNTIME_INVOCABLE_NOT_FOUND",
        format!("Invocable \"{}\" was not found.", name),
    )
    .with_invocable(name, "")
}

#[cfg(test)]
mod scope_tests {
    use super::*;
    use crate::runtime_test_support::*;

    #[test]
    fn define_then_read_returns_the_same_value() {
        let runtime = runtime();
        let ctx = runtime.root();
        runtime
            .declare(ctx, "x", false, NfType::int(), NfValue::Int(5))
            .expect("declare");
        assert_eq!(
            runtime.get_variable(ctx, "x", true).expect("read").value(),
            &NfValue::Int(5)
        );
        let error = runtime
            .declare(ctx, "x", false, NfType::int(), NfValue::Int(6))
            .expect_err("redeclaration");
        assert_eq!(error.code, "RUNTIME_VARIABLE_REDECLARED");
    }

    #[test]
    fn lookups_walk_outward_unless_local_only() {
        let runtime = runtime();
        let outer = runtime.root();
        runtime
            .declare(outer, "x", false, NfType::Any, NfValue::Int(1))
            .expect("declare");
        let inner = runtime.create_context(outer).expect("inner");
        assert!(runtime.contains_variable(inner, "x", false));
        assert!(!runtime.contains_variable(inner, "x", true));
        runtime
            .declare(inner, "x", false, NfType::Any, NfValue::Int(2))
            .expect("shadowing an outer binding is allowed");
        assert_eq!(
            runtime.get_variable(inner, "x", false).expect("inner x").value(),
            &NfValue::Int(2)
        );
        let error = runtime
            .get_variable(inner, "missing", false)
            .expect_err("not found");
        assert_eq!(error.code, "RUNTIME_VARIABLE_NOT_FOUND");
    }

    #[test]
    fn assignment_reaches_outer_bindings_and_respects_constants() {
        let runtime = runtime();
        let outer = runtime.root();
        runtime
            .declare(outer, "n", false, NfType::int(), NfValue::Int(1))
            .expect("declare");
        runtime
            .declare(outer, "k", true, NfType::int(), NfValue::Int(1))
            .expect("declare");
        let inner = runtime.create_context(outer).expect("inner");
        runtime
            .assign_variable(inner, "n", NfValue::Int(9))
            .expect("assign");
        assert_eq!(
            runtime.get_variable(outer, "n", true).expect("n").value(),
            &NfValue::Int(9)
        );
        let error = runtime
            .assign_variable(inner, "k", NfValue::Int(2))
            .expect_err("constant");
        assert_eq!(error.code, "RUNTIME_CONSTANT_REASSIGNED");
    }

    #[test]
    fn functions_resolve_locally_then_through_builtins() {
        let runtime = runtime();
        let ctx = runtime.root();
        let node = function_node("f", &[], block(vec![]));
        let function = Arc::new(DeclaredFunction::from_node(&node, None, 0).expect("function"));
        runtime
            .define_function(ctx, function.clone())
            .expect("define");
        let error = runtime
            .define_function(ctx, function)
            .expect_err("redeclared");
        assert_eq!(error.code, "RUNTIME_FUNCTION_REDECLARED");

        let inner = runtime.create_context(ctx).expect("inner");
        assert!(runtime.contains_function(inner, "f", false));
        assert!(!runtime.contains_function(inner, "f", true));
        assert_eq!(
            runtime.get_function(inner, "length", false).expect("builtin").kind(),
            "builtin"
        );
        let error = runtime
            .get_function(inner, "nope", false)
            .expect_err("unknown");
        assert_eq!(error.code, "RUNTIME_INVOCABLE_NOT_FOUND");
    }

    #[test]
    fn implementation_members_resolve_by_qualified_name() {
        let runtime = runtime();
        let ctx = runtime.root();
        let mut implementation = DeclaredImplementation::new("Shape", 0);
        let node = function_node("area", &[], block(vec![]));
        implementation
            .add_function(DeclaredFunction::from_node(&node, Some("Shape"), 0).expect("fn"))
            .expect("add");
        runtime
            .define_implementation(ctx, implementation)
            .expect("define");
        assert!(runtime.contains_function(ctx, "Shape::area", false));
        assert!(!runtime.contains_function(ctx, "Shape::volume", false));
        let error = runtime
            .define_implementation(ctx, DeclaredImplementation::new("Shape", 0))
            .expect_err("redeclared");
        assert_eq!(error.code, "RUNTIME_IMPLEMENTATION_REDECLARED");

        let error = runtime
            .get_function(ctx, "self::area", false)
            .expect_err("no current implementation");
        assert_eq!(error.code, "RUNTIME_INVOCABLE_NOT_FOUND");
    }
}
