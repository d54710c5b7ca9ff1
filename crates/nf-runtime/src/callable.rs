use std::fmt;
use std::sync::Arc;

use nf_core::{NfType, NfValue};

use crate::bridge::{coerce_arguments, HostCallError};
use crate::declarations::DeclaredFunction;

pub type NativeFn =
    Arc<dyn Fn(&[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static>;
pub type InstanceFn =
    Arc<dyn Fn(&NfValue, &[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static>;

/// Typed parameter and return metadata of a native routine. When `variadic`
/// is set, the last parameter type applies to every trailing argument.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeSignature {
    pub parameters: Vec<NfType>,
    pub return_type: NfType,
    pub variadic: bool,
}

impl NativeSignature {
    pub fn new(parameters: Vec<NfType>, return_type: NfType) -> Self {
        Self {
            parameters,
            return_type,
            variadic: false,
        }
    }

    pub fn variadic(mut self) -> Self {
        self.variadic = true;
        self
    }

    pub fn render(&self, name: &str) -> String {
        let mut parameters = self
            .parameters
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>();
        if self.variadic {
            if let Some(last) = parameters.last_mut() {
                last.push_str("...");
            }
        }
        format!("{}({}) -> {}", name, parameters.join(", "), self.return_type)
    }

    /// Coerces the arguments, runs `call`, and checks the result against the
    /// declared return type. A `void` routine always yields `None`.
    pub(crate) fn invoke_with<F>(&self, args: Vec<NfValue>, call: F) -> Result<NfValue, HostCallError>
    where
        F: FnOnce(&[NfValue]) -> Result<NfValue, HostCallError>,
    {
        let args = coerce_arguments(&self.parameters, self.variadic, args)?;
        let result = call(&args)?;
        if self.return_type.is_void() {
            return Ok(NfValue::None);
        }
        let actual = result.type_name();
        self.return_type.admit(result).ok_or_else(|| {
            HostCallError::Invocation(format!(
                "returned {} where {} was declared",
                actual, self.return_type
            ))
        })
    }
}

pub struct BuiltinFunction {
    provider: String,
    name: String,
    signature: NativeSignature,
    func: NativeFn,
}

impl BuiltinFunction {
    pub fn new<F>(provider: &str, name: &str, signature: NativeSignature, func: F) -> Self
    where
        F: Fn(&[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static,
    {
        Self {
            provider: provider.to_string(),
            name: name.to_string(),
            signature,
            func: Arc::new(func),
        }
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    pub fn detailed_signature(&self) -> String {
        format!("[{}] {}", self.provider, self.signature.render(&self.name))
    }

    pub fn invoke(&self, args: Vec<NfValue>) -> Result<NfValue, HostCallError> {
        self.signature.invoke_with(args, |args| (self.func)(args))
    }
}

impl fmt::Debug for BuiltinFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltinFunction")
            .field("provider", &self.provider)
            .field("name", &self.name)
            .field("signature", &self.signature)
            .finish()
    }
}

#[derive(Clone)]
pub enum ForeignBody {
    Static(NativeFn),
    Instance(InstanceFn),
}

/// Host routine registered under a qualified call name `Owner:Path::method`.
pub struct ForeignFunction {
    qualified_name: String,
    owner: String,
    method: String,
    invocable: bool,
    signature: NativeSignature,
    body: ForeignBody,
}

impl ForeignFunction {
    pub fn new_static<F>(owner: &str, method: &str, signature: NativeSignature, func: F) -> Self
    where
        F: Fn(&[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static,
    {
        Self::with_body(owner, method, signature, ForeignBody::Static(Arc::new(func)))
    }

    pub fn new_instance<F>(owner: &str, method: &str, signature: NativeSignature, func: F) -> Self
    where
        F: Fn(&NfValue, &[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static,
    {
        Self::with_body(owner, method, signature, ForeignBody::Instance(Arc::new(func)))
    }

    fn with_body(owner: &str, method: &str, signature: NativeSignature, body: ForeignBody) -> Self {
        Self {
            qualified_name: format!("{}::{}", owner, method),
            owner: owner.to_string(),
            method: method.to_string(),
            invocable: true,
            signature,
            body,
        }
    }

    /// Marks the routine as visible but not callable from scripts.
    pub fn restricted(mut self) -> Self {
        self.invocable = false;
        self
    }

    pub fn qualified_name(&self) -> &str {
        &self.qualified_name
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn is_invocable(&self) -> bool {
        self.invocable
    }

    pub fn is_static(&self) -> bool {
        matches!(self.body, ForeignBody::Static(_))
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    pub fn detailed_signature(&self) -> String {
        let kind = if self.is_static() { "static" } else { "instance" };
        format!("{} {}", kind, self.signature.render(&self.qualified_name))
    }

    /// `receiver` is required for instance members and ignored otherwise.
    pub fn invoke(
        &self,
        receiver: Option<&NfValue>,
        args: Vec<NfValue>,
    ) -> Result<NfValue, HostCallError> {
        if !self.invocable {
            return Err(HostCallError::Access(format!(
                "{} is not callable from scripts",
                self.qualified_name
            )));
        }
        match &self.body {
            ForeignBody::Static(func) => self.signature.invoke_with(args, |args| func(args)),
            ForeignBody::Instance(func) => {
                let receiver = receiver.ok_or_else(|| {
                    HostCallError::ArgumentMismatch(format!(
                        "{} needs a receiver instance",
                        self.qualified_name
                    ))
                })?;
                self.signature
                    .invoke_with(args, |args| func(receiver, args))
            }
        }
    }
}

impl fmt::Debug for ForeignFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignFunction")
            .field("qualified_name", &self.qualified_name)
            .field("static", &self.is_static())
            .field("invocable", &self.invocable)
            .finish()
    }
}

pub struct ForeignConstructor {
    owner: String,
    signature: NativeSignature,
    func: NativeFn,
}

impl ForeignConstructor {
    pub fn new<F>(owner: &str, parameters: Vec<NfType>, func: F) -> Self
    where
        F: Fn(&[NfValue]) -> Result<NfValue, HostCallError> + Send + Sync + 'static,
    {
        Self {
            owner: owner.to_string(),
            signature: NativeSignature::new(parameters, NfType::host(owner)),
            func: Arc::new(func),
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn qualified_name(&self) -> String {
        format!("{}::new", self.owner)
    }

    pub fn signature(&self) -> &NativeSignature {
        &self.signature
    }

    pub fn detailed_signature(&self) -> String {
        format!("constructor {}", self.signature.render(&self.qualified_name()))
    }

    pub fn invoke(&self, args: Vec<NfValue>) -> Result<NfValue, HostCallError> {
        self.signature
            .invoke_with(args, |args| (self.func)(args))
            .map_err(|error| match error {
                HostCallError::Invocation(message) => HostCallError::Construction(message),
                other => other,
            })
    }
}

impl fmt::Debug for ForeignConstructor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ForeignConstructor")
            .field("owner", &self.owner)
            .field("signature", &self.signature)
            .finish()
    }
}

/// Everything a call-site name can be bound to.
#[derive(Debug, Clone)]
pub enum Callable {
    Declared(Arc<DeclaredFunction>),
    Builtin(Arc<BuiltinFunction>),
    Foreign(Arc<ForeignFunction>),
    Constructor(Arc<ForeignConstructor>),
    Overloads(Vec<Callable>),
}

impl Callable {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Declared(_) => "declared",
            Self::Builtin(_) => "builtin",
            Self::Foreign(_) => "foreign",
            Self::Constructor(_) => "constructor",
            Self::Overloads(_) => "overloads",
        }
    }

    pub fn name(&self) -> String {
        match self {
            Self::Declared(function) => function.qualified_name(),
            Self::Builtin(function) => function.name().to_string(),
            Self::Foreign(function) => function.qualified_name().to_string(),
            Self::Constructor(constructor) => constructor.qualified_name(),
            Self::Overloads(candidates) => candidates
                .first()
                .map(Callable::name)
                .unwrap_or_default(),
        }
    }

    pub fn detailed_signature(&self) -> String {
        match self {
            Self::Declared(function) => function.signature(),
            Self::Builtin(function) => function.detailed_signature(),
            Self::Foreign(function) => function.detailed_signature(),
            Self::Constructor(constructor) => constructor.detailed_signature(),
            Self::Overloads(candidates) => candidates
                .iter()
                .map(Callable::detailed_signature)
                .collect::<Vec<_>>()
                .join(" | "),
        }
    }

    /// Instance members take their receiver from the first argument.
    pub fn needs_receiver(&self) -> bool {
        matches!(self, Self::Foreign(function) if !function.is_static())
    }

    /// Native parameter metadata, or `None` for declared functions and sets.
    pub fn native_signature(&self) -> Option<&NativeSignature> {
        match self {
            Self::Builtin(function) => Some(function.signature()),
            Self::Foreign(function) => Some(function.signature()),
            Self::Constructor(constructor) => Some(constructor.signature()),
            Self::Declared(_) | Self::Overloads(_) => None,
        }
    }

    pub fn from_candidates(mut candidates: Vec<Callable>) -> Option<Callable> {
        match candidates.len() {
            0 => None,
            1 => candidates.pop(),
            _ => Some(Self::Overloads(candidates)),
        }
    }
}

#[cfg(test)]
mod callable_tests {
    use super::*;

    fn abs() -> BuiltinFunction {
        BuiltinFunction::new(
            "math",
            "abs",
            NativeSignature::new(vec![NfType::int()], NfType::int()),
            |args| Ok(NfValue::Int(args[0].as_int().unwrap_or_default().abs())),
        )
    }

    #[test]
    fn builtins_coerce_arguments_and_render_signatures() {
        let function = abs();
        assert_eq!(function.invoke(vec![NfValue::Int(-3)]).expect("abs"), NfValue::Int(3));
        let error = function
            .invoke(vec![NfValue::from("x")])
            .expect_err("string is not int");
        assert!(matches!(error, HostCallError::ArgumentMismatch(_)));
        assert_eq!(function.detailed_signature(), "[math] abs(int) -> int");
    }

    #[test]
    fn void_routines_yield_none_and_returns_are_checked() {
        let log = NativeSignature::new(vec![NfType::Any], NfType::Void);
        assert_eq!(
            log.invoke_with(vec![NfValue::Int(1)], |_| Ok(NfValue::Int(9)))
                .expect("void call"),
            NfValue::None
        );
        let bad = NativeSignature::new(vec![], NfType::string());
        let error = bad
            .invoke_with(vec![], |_| Ok(NfValue::Int(1)))
            .expect_err("int is not a string");
        assert!(matches!(error, HostCallError::Invocation(_)));
    }

    #[test]
    fn restricted_foreign_functions_refuse_calls() {
        let function = ForeignFunction::new_static(
            "Sys",
            "exit",
            NativeSignature::new(vec![], NfType::Void),
            |_| Ok(NfValue::None),
        )
        .restricted();
        let error = function.invoke(None, vec![]).expect_err("restricted");
        assert!(matches!(error, HostCallError::Access(_)));
        assert_eq!(function.detailed_signature(), "static Sys::exit() -> void");
    }

    #[test]
    fn candidates_collapse_into_single_bindings_or_sets() {
        let first = Callable::Builtin(Arc::new(abs()));
        match Callable::from_candidates(vec![first.clone(), first.clone()]) {
            Some(Callable::Overloads(candidates)) => assert_eq!(candidates.len(), 2),
            other => panic!("expected overloads, got {:?}", other.map(|c| c.kind())),
        }
        assert!(Callable::from_candidates(vec![]).is_none());
        assert_eq!(
            Callable::from_candidates(vec![first]).map(|callable| callable.kind()),
            Some("builtin")
        );
    }
}
