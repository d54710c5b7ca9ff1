use std::sync::Arc;

use nf_core::{DeclaredVariable, NfError, NfResult, NfType, NfValue, SourceSpan};
use tracing::debug;

use super::arguments::{bind_arguments, CallArgument};
use super::tasks::Task;
use super::Runtime;
use crate::call_state::{self, CallFrame};
use crate::callable::Callable;
use crate::context::ContextId;
use crate::declarations::{DeclaredFunction, DeclaredParameter, PreparedSignature};
use crate::evaluator::{Flow, LoopSignal};

type BoundArguments = Vec<(DeclaredParameter, NfValue)>;

/// Attaches the callee unless a nested call already did.
fn annotate(error: NfError, name: &str, signature: &str) -> NfError {
    if error.invocable.is_some() {
        return error;
    }
    error.with_invocable(name, signature)
}

fn unsupported(name: &str, callable: &Callable) -> NfError {
    NfError::new(
        "RUNTIME_UNSUPPORTED_FUNCTION",
        format!(
            "\"{}\" resolves to a {} binding, which cannot be invoked here.",
            name,
            callable.kind()
        ),
    )
    .with_invocable(name, callable.detailed_signature())
}

impl Runtime {
    /// Resolves `name` from `context` and invokes it. The call runs under a
    /// fresh call id, which is dropped again when the call returns or fails.
    pub fn call(
        &self,
        context: ContextId,
        name: &str,
        arguments: Vec<CallArgument>,
        overload_index: Option<usize>,
        span: &SourceSpan,
    ) -> NfResult<NfValue> {
        let call_id = call_state::generate_call_id(call_state::call_depth(), name);
        let _call_id = call_state::enter_call_id(call_id.clone());
        let callable = self
            .get_function(context, name, false)
            .map_err(|error| error.at(span))?;
        debug!(call_id = %call_id, callee = name, kind = callable.kind(), "dispatch");
        self.invoke(context, name, &callable, arguments, overload_index, span)
            .map_err(|error| error.at(span))
    }

    pub fn invoke(
        &self,
        context: ContextId,
        name: &str,
        callable: &Callable,
        arguments: Vec<CallArgument>,
        overload_index: Option<usize>,
        span: &SourceSpan,
    ) -> NfResult<NfValue> {
        match (callable, overload_index) {
            (Callable::Overloads(candidates), _) => {
                self.invoke_overloads(context, name, candidates, arguments, overload_index, span)
            }
            (single, Some(_)) => self.invoke_overloads(
                context,
                name,
                std::slice::from_ref(single),
                arguments,
                overload_index,
                span,
            ),
            (Callable::Declared(function), None) => {
                self.invoke_declared(context, function, arguments)
            }
            (native, None) => self.invoke_native(name, native, arguments, span),
        }
    }

    /// Picks one member of an overload set, by explicit index or through the
    /// configured resolver, and invokes it.
    fn invoke_overloads(
        &self,
        context: ContextId,
        name: &str,
        candidates: &[Callable],
        arguments: Vec<CallArgument>,
        overload_index: Option<usize>,
        span: &SourceSpan,
    ) -> NfResult<NfValue> {
        let index = match overload_index {
            Some(index) if index >= candidates.len() => {
                return Err(NfError::new(
                    "RUNTIME_OVERLOAD_INDEX",
                    format!(
                        "\"{}\" has {} overload(s); index {} is out of range.",
                        name,
                        candidates.len(),
                        index
                    ),
                )
                .with_invocable(name, Callable::Overloads(candidates.to_vec()).detailed_signature()));
            }
            Some(index) => index,
            None => {
                let values = positional_values(name, &arguments)?;
                self.shared
                    .overload_resolver
                    .select(name, candidates, &values)
                    .map_err(|error| {
                        annotate(
                            error,
                            name,
                            &Callable::Overloads(candidates.to_vec()).detailed_signature(),
                        )
                    })?
            }
        };

        let selected = &candidates[index];
        debug!(callee = name, index, signature = %selected.detailed_signature(), "overload selected");
        match selected {
            Callable::Overloads(_) => Err(unsupported(name, selected)),
            Callable::Declared(function) => self
                .invoke_declared(context, function, arguments)
                .map_err(|error| annotate(error, name, &selected.detailed_signature())),
            native => self.invoke_native(name, native, arguments, span),
        }
    }

    /// Hands a builtin, foreign function or constructor to the bridge.
    /// Instance members take their receiver from the first argument.
    fn invoke_native(
        &self,
        name: &str,
        callable: &Callable,
        arguments: Vec<CallArgument>,
        span: &SourceSpan,
    ) -> NfResult<NfValue> {
        let signature = callable.detailed_signature();
        let mut values = positional_values(name, &arguments)
            .map_err(|error| annotate(error, name, &signature))?;
        let receiver = if callable.needs_receiver() {
            if values.is_empty() {
                return Err(NfError::new(
                    "RUNTIME_INSTANCE_REQUIRED",
                    format!("\"{}\" is an instance member and needs a receiver.", name),
                )
                .with_invocable(name, signature));
            }
            Some(values.remove(0))
        } else {
            None
        };

        let outcome = match callable {
            Callable::Builtin(function) => function.invoke(values),
            Callable::Foreign(function) => function.invoke(receiver.as_ref(), values),
            Callable::Constructor(constructor) => constructor.invoke(values),
            Callable::Declared(_) | Callable::Overloads(_) => {
                return Err(unsupported(name, callable))
            }
        };
        outcome.map_err(|error| error.into_runtime_error(name, &signature, span))
    }

    fn invoke_declared(
        &self,
        context: ContextId,
        function: &Arc<DeclaredFunction>,
        arguments: Vec<CallArgument>,
    ) -> NfResult<NfValue> {
        let annotate_call =
            |error: NfError| annotate(error, &function.qualified_name(), &function.signature());
        let prepared = self
            .prepare_function(context, function)
            .map_err(annotate_call)?;
        let bound = bind_arguments(&prepared.parameters, arguments).map_err(annotate_call)?;
        if function.is_async() {
            return self.spawn_declared(context, function.clone(), bound, prepared.return_type);
        }
        self.run_declared(context, function, bound, &prepared.return_type)
            .map_err(annotate_call)
    }

    /// Materializes parameters and return type on first use. Default values
    /// are evaluated once, in the context of that first call.
    pub fn prepare_function(
        &self,
        context: ContextId,
        function: &DeclaredFunction,
    ) -> NfResult<PreparedSignature> {
        function
            .prepare(|nodes| {
                nodes
                    .iter()
                    .map(|node| -> NfResult<DeclaredParameter> {
                        let declared_type = node.declared_type.clone().unwrap_or(NfType::Any);
                        let default_value = match &node.default_value {
                            Some(expression) => {
                                let value = self.evaluate(context, expression)?;
                                Some(declared_type.admit_or_mismatch(
                                    value,
                                    &format!("Default value of \"{}\"", node.name),
                                )?)
                            }
                            None => None,
                        };
                        Ok(DeclaredParameter {
                            name: node.name.clone(),
                            constant: node.constant,
                            declared_type,
                            default_value,
                        })
                    })
                    .collect()
            })
            .cloned()
    }

    /// Runs a declared function synchronously in a fresh child of
    /// `context`. The call frame is popped and the call context torn down
    /// on every exit path.
    fn run_declared(
        &self,
        context: ContextId,
        function: &Arc<DeclaredFunction>,
        bound: BoundArguments,
        return_type: &NfType,
    ) -> NfResult<NfValue> {
        let call_context = self.create_context(context)?;
        let outcome = self.run_in_call_context(call_context, function, bound, return_type);
        let cleared = self.clear_executed(call_context, function.declaration());
        let released = self.deregister_context(call_context);
        let value = outcome?;
        cleared?;
        released?;
        Ok(value)
    }

    fn run_in_call_context(
        &self,
        call_context: ContextId,
        function: &Arc<DeclaredFunction>,
        bound: BoundArguments,
        return_type: &NfType,
    ) -> NfResult<NfValue> {
        let depth = self.depth(call_context)?;
        let mut arguments = Vec::with_capacity(bound.len());
        for (parameter, value) in bound {
            let variable = DeclaredVariable::new(
                depth,
                &parameter.name,
                parameter.constant,
                parameter.declared_type,
                value,
            )?;
            arguments.push((parameter.name, variable.value().clone()));
            self.define_variable(call_context, variable)?;
        }

        let frame = call_state::push_call(CallFrame {
            function: function.clone(),
            arguments,
            context: call_context,
            return_value: None,
        });
        let flow = self.visit(call_context, function.body()?)?;
        let value = match flow {
            Flow::Value(value) | Flow::Signal(LoopSignal::Return(value)) => value,
            Flow::Signal(_) => NfValue::None,
        };
        let value = if return_type.is_void() {
            NfValue::None
        } else {
            return_type.admit_or_mismatch(
                value,
                &format!("Return value of \"{}\"", function.qualified_name()),
            )?
        };
        call_state::set_return_value(value.clone());
        frame.finish()?;
        Ok(value)
    }

    /// Starts an async function on its own worker and hands back the task
    /// handle immediately. `context` owns the task until it completes.
    fn spawn_declared(
        &self,
        context: ContextId,
        function: Arc<DeclaredFunction>,
        bound: BoundArguments,
        return_type: NfType,
    ) -> NfResult<NfValue> {
        let name = function.qualified_name();
        let call_id = call_state::generate_call_id(function.depth(), &name);
        let runtime = self.clone();
        let task = Task::of(&name, move || {
            runtime
                .run_declared(context, &function, bound, &return_type)
                .map_err(|error| annotate(error, &function.qualified_name(), &function.signature()))
        })
        .with_call_id(call_id)
        .with_cleanup(call_state::reset);
        self.spawn_task(context, task).map(NfValue::Task)
    }
}

/// Native routines and the overload oracle only take positional arguments.
fn positional_values(name: &str, arguments: &[CallArgument]) -> NfResult<Vec<NfValue>> {
    arguments
        .iter()
        .map(|argument| match &argument.name {
            Some(label) => Err(NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                format!(
                    "\"{}\" does not accept named arguments (got \"{}\").",
                    name, label
                ),
            )),
            None => Ok(argument.value.clone()),
        })
        .collect()
}
