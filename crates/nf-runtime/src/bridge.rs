use std::collections::BTreeMap;
use std::sync::{Arc, OnceLock};

use nf_core::{NfError, NfResult, NfType, NfValue, SourceSpan};
use regex::Regex;
use thiserror::Error;

use crate::callable::{BuiltinFunction, Callable, ForeignConstructor, ForeignFunction};

pub const QUALIFIED_CALL_PATTERN: &str = r"^([^:]+)(:[^:]+)*::[^:]+$";
pub const QUALIFIED_NAME_PATTERN: &str = r"^([^:]+)(:[^:]+)*$";

fn qualified_call_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(QUALIFIED_CALL_PATTERN).expect("qualified call regex must compile")
    })
}

fn qualified_name_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(QUALIFIED_NAME_PATTERN).expect("qualified name regex must compile")
    })
}

pub fn is_qualified_call(name: &str) -> bool {
    qualified_call_regex().is_match(name)
}

pub fn is_qualified_name(name: &str) -> bool {
    qualified_name_regex().is_match(name)
}

/// Failure raised by a host routine or by argument coercion in front of it.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum HostCallError {
    #[error("argument mismatch: {0}")]
    ArgumentMismatch(String),
    #[error("access denied: {0}")]
    Access(String),
    #[error("construction failed: {0}")]
    Construction(String),
    #[error("invocation failed: {0}")]
    Invocation(String),
}

impl HostCallError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ArgumentMismatch(_) => "RUNTIME_ILLEGAL_ARGUMENT",
            Self::Access(_) => "RUNTIME_NON_INVOCABLE_FUNCTION",
            Self::Construction(_) => "RUNTIME_INSTANTIATION_FAILED",
            Self::Invocation(_) => "RUNTIME_INVOCATION_FAILED",
        }
    }

    pub fn into_runtime_error(self, name: &str, signature: &str, span: &SourceSpan) -> NfError {
        NfError::with_span(
            self.code(),
            format!("Call to \"{}\" failed: {}.", name, self),
            span.clone(),
        )
        .with_invocable(name, signature)
    }
}

pub fn coerce_arguments(
    parameters: &[NfType],
    variadic: bool,
    args: Vec<NfValue>,
) -> Result<Vec<NfValue>, HostCallError> {
    let arity_ok = if variadic {
        args.len() + 1 >= parameters.len()
    } else {
        args.len() == parameters.len()
    };
    if !arity_ok {
        return Err(HostCallError::ArgumentMismatch(format!(
            "expected {}{} argument(s), got {}",
            if variadic { "at least " } else { "" },
            if variadic {
                parameters.len().saturating_sub(1)
            } else {
                parameters.len()
            },
            args.len()
        )));
    }
    args.into_iter()
        .enumerate()
        .map(|(index, value)| {
            let expected = parameters
                .get(index)
                .or_else(|| parameters.last())
                .cloned()
                .unwrap_or(NfType::Any);
            let actual = value.type_name();
            expected.admit(value).ok_or_else(|| {
                HostCallError::ArgumentMismatch(format!(
                    "argument {} expects {}, got {}",
                    index + 1,
                    expected,
                    actual
                ))
            })
        })
        .collect()
}

/// Source of host-provided callables, looked up after the context chain.
pub trait HostFunctionRegistry: Send + Sync {
    fn resolve(&self, name: &str) -> Option<Callable>;
    fn names(&self) -> Vec<String>;
}

#[derive(Debug, Default)]
pub struct EmptyHostFunctionRegistry;

impl HostFunctionRegistry for EmptyHostFunctionRegistry {
    fn resolve(&self, _name: &str) -> Option<Callable> {
        None
    }

    fn names(&self) -> Vec<String> {
        Vec::new()
    }
}

/// Explicit registration table: call name to one or more native callables.
/// Several registrations under one name form an overload set.
#[derive(Debug, Clone, Default)]
pub struct NativeRegistry {
    entries: BTreeMap<String, Vec<Callable>>,
}

impl NativeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_builtin(&mut self, function: BuiltinFunction) -> &mut Self {
        self.entries
            .entry(function.name().to_string())
            .or_default()
            .push(Callable::Builtin(Arc::new(function)));
        self
    }

    pub fn register_foreign(&mut self, function: ForeignFunction) -> NfResult<&mut Self> {
        if !is_qualified_call(function.qualified_name()) {
            return Err(NfError::new(
                "RUNTIME_INVALID_QUALIFIED_NAME",
                format!(
                    "\"{}\" is not a qualified call name.",
                    function.qualified_name()
                ),
            ));
        }
        self.entries
            .entry(function.qualified_name().to_string())
            .or_default()
            .push(Callable::Foreign(Arc::new(function)));
        Ok(self)
    }

    pub fn register_constructor(&mut self, constructor: ForeignConstructor) -> NfResult<&mut Self> {
        let name = constructor.qualified_name();
        if !is_qualified_call(&name) {
            return Err(NfError::new(
                "RUNTIME_INVALID_QUALIFIED_NAME",
                format!("\"{}\" is not a qualified call name.", name),
            ));
        }
        self.entries
            .entry(name)
            .or_default()
            .push(Callable::Constructor(Arc::new(constructor)));
        Ok(self)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }
}

impl HostFunctionRegistry for NativeRegistry {
    fn resolve(&self, name: &str) -> Option<Callable> {
        self.entries
            .get(name)
            .and_then(|candidates| Callable::from_candidates(candidates.clone()))
    }

    fn names(&self) -> Vec<String> {
        self.entries.keys().cloned().collect()
    }
}

/// Best-match oracle: picks one candidate of an overload set for the given
/// arguments, receiver included for instance members.
pub trait OverloadResolver: Send + Sync {
    fn select(&self, name: &str, candidates: &[Callable], args: &[NfValue]) -> NfResult<usize>;
}

/// Default oracle: a candidate applies when its arity fits and every
/// argument coerces; among applicable candidates the one with the most
/// exact (non-widened) argument types wins.
#[derive(Debug, Default)]
pub struct ArityTypeResolver;

impl ArityTypeResolver {
    fn score(candidate: &Callable, args: &[NfValue]) -> Option<usize> {
        let signature = candidate.native_signature()?;
        let args = if candidate.needs_receiver() {
            args.split_first()?.1
        } else {
            args
        };
        let coerced = coerce_arguments(&signature.parameters, signature.variadic, args.to_vec()).ok()?;
        Some(
            args.iter()
                .zip(coerced.iter())
                .filter(|(given, stored)| given.type_name() == stored.type_name())
                .count(),
        )
    }
}

impl OverloadResolver for ArityTypeResolver {
    fn select(&self, name: &str, candidates: &[Callable], args: &[NfValue]) -> NfResult<usize> {
        let scored = candidates
            .iter()
            .enumerate()
            .filter_map(|(index, candidate)| Self::score(candidate, args).map(|score| (index, score)))
            .collect::<Vec<_>>();
        let Some(best) = scored.iter().map(|(_, score)| *score).max() else {
            let shape = args
                .iter()
                .map(NfValue::type_name)
                .collect::<Vec<_>>()
                .join(", ");
            return Err(NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                format!("No overload of \"{}\" accepts ({}).", name, shape),
            ));
        };
        let winners = scored
            .iter()
            .filter(|(_, score)| *score == best)
            .map(|(index, _)| *index)
            .collect::<Vec<_>>();
        match winners.as_slice() {
            [index] => Ok(*index),
            _ => Err(NfError::new(
                "RUNTIME_AMBIGUOUS_OVERLOAD",
                format!(
                    "Call to \"{}\" matches {} overloads equally well.",
                    name,
                    winners.len()
                ),
            )),
        }
    }
}

/// Host field access policy. `safe` turns access failures into "not found";
/// `fail_fast` raises accessor failures instead of falling back to direct
/// object access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldAccessPolicy {
    pub safe: bool,
    pub fail_fast: bool,
}

impl Default for FieldAccessPolicy {
    fn default() -> Self {
        Self {
            safe: true,
            fail_fast: false,
        }
    }
}
