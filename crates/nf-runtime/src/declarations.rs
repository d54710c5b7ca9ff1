use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use nf_core::{NfError, NfResult, NfType, NfValue, NodeKind, ParameterNode, SyntaxNode};
use once_cell::sync::OnceCell;

#[derive(Debug, Clone, PartialEq)]
pub struct DeclaredParameter {
    pub name: String,
    pub constant: bool,
    pub declared_type: NfType,
    pub default_value: Option<NfValue>,
}

impl DeclaredParameter {
    pub fn new(name: &str, declared_type: NfType) -> Self {
        Self {
            name: name.to_string(),
            constant: false,
            declared_type,
            default_value: None,
        }
    }

    pub fn with_default(mut self, value: NfValue) -> Self {
        self.default_value = Some(value);
        self
    }

    pub fn has_default(&self) -> bool {
        self.default_value.is_some()
    }
}

impl fmt::Display for DeclaredParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.declared_type)?;
        if let Some(default_value) = &self.default_value {
            write!(f, " = {}", default_value)?;
        }
        Ok(())
    }
}

/// Parameters and return type, materialized the first time a function is
/// prepared for a call.
thread_local! {
    /// Functions whose signature this thread is materializing right now.
    static PREPARING: RefCell<BTreeSet<usize>> = RefCell::new(BTreeSet::new());
}

struct PreparingGuard {
    key: usize,
}

impl PreparingGuard {
    fn enter(function: &DeclaredFunction) -> NfResult<Self> {
        let key = function as *const DeclaredFunction as usize;
        if !PREPARING.with(|preparing| preparing.borrow_mut().insert(key)) {
            return Err(NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                format!(
                    "Default values of \"{}\" refer back to \"{}\".",
                    function.qualified_name(),
                    function.qualified_name()
                ),
            ));
        }
        Ok(Self { key })
    }
}

impl Drop for PreparingGuard {
    fn drop(&mut self) {
        PREPARING.with(|preparing| preparing.borrow_mut().remove(&self.key));
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreparedSignature {
    pub parameters: Vec<DeclaredParameter>,
    pub return_type: NfType,
}

#[derive(Debug)]
pub struct DeclaredFunction {
    name: String,
    implementation: Option<String>,
    is_async: bool,
    declaration: Arc<SyntaxNode>,
    depth: usize,
    prepared: OnceCell<PreparedSignature>,
}

impl DeclaredFunction {
    pub fn from_node(
        node: &SyntaxNode,
        implementation: Option<&str>,
        depth: usize,
    ) -> NfResult<Self> {
        let NodeKind::FunctionDeclaration { name, is_async, .. } = &node.kind else {
            return Err(NfError::with_span(
                "RUNTIME_ILLEGAL_ARGUMENT",
                "Expected a function declaration node.",
                node.span.clone(),
            ));
        };
        Ok(Self {
            name: name.clone(),
            implementation: implementation.map(str::to_string),
            is_async: *is_async,
            declaration: Arc::new(node.clone()),
            depth,
            prepared: OnceCell::new(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `Impl::name` for implementation members, the plain name otherwise.
    pub fn qualified_name(&self) -> String {
        match &self.implementation {
            Some(implementation) => format!("{}::{}", implementation, self.name),
            None => self.name.clone(),
        }
    }

    pub fn implementation(&self) -> Option<&str> {
        self.implementation.as_deref()
    }

    pub fn is_async(&self) -> bool {
        self.is_async
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn declaration(&self) -> &SyntaxNode {
        &self.declaration
    }

    pub fn body(&self) -> NfResult<&SyntaxNode> {
        match &self.declaration.kind {
            NodeKind::FunctionDeclaration { body, .. } => Ok(body),
            _ => Err(NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                format!("Function \"{}\" has no body.", self.name),
            )),
        }
    }

    pub fn parameter_nodes(&self) -> &[ParameterNode] {
        self.declaration.parameter_list().unwrap_or(&[])
    }

    /// Materializes the signature at most once; later calls return the
    /// stored value without running `materialize`. A default value that
    /// needs this same signature again fails instead of blocking.
    pub fn prepare<F>(&self, materialize: F) -> NfResult<&PreparedSignature>
    where
        F: FnOnce(&[ParameterNode]) -> NfResult<Vec<DeclaredParameter>>,
    {
        if let Some(prepared) = self.prepared.get() {
            return Ok(prepared);
        }
        let _preparing = PreparingGuard::enter(self)?;
        self.prepared.get_or_try_init(|| {
            let parameters = materialize(self.parameter_nodes())?;
            let return_type = self
                .declaration
                .return_type()
                .cloned()
                .unwrap_or(NfType::Any);
            Ok(PreparedSignature {
                parameters,
                return_type,
            })
        })
    }

    pub fn prepared(&self) -> Option<&PreparedSignature> {
        self.prepared.get()
    }

    pub fn signature(&self) -> String {
        let (parameters, return_type) = match self.prepared.get() {
            Some(prepared) => (
                prepared
                    .parameters
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>(),
                prepared.return_type.clone(),
            ),
            None => (
                self.parameter_nodes()
                    .iter()
                    .map(|parameter| {
                        format!(
                            "{}: {}",
                            parameter.name,
                            parameter.declared_type.clone().unwrap_or(NfType::Any)
                        )
                    })
                    .collect::<Vec<_>>(),
                self.declaration
                    .return_type()
                    .cloned()
                    .unwrap_or(NfType::Any),
            ),
        };
        let prefix = if self.is_async { "async " } else { "" };
        format!(
            "{}{}({}) -> {}",
            prefix,
            self.qualified_name(),
            parameters.join(", "),
            return_type
        )
    }
}

impl fmt::Display for DeclaredFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.signature())
    }
}

/// Named group of functions reachable as `Impl::function`.
#[derive(Debug)]
pub struct DeclaredImplementation {
    name: String,
    depth: usize,
    functions: BTreeMap<String, Arc<DeclaredFunction>>,
}

impl DeclaredImplementation {
    pub fn new(name: &str, depth: usize) -> Self {
        Self {
            name: name.to_string(),
            depth,
            functions: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn add_function(&mut self, function: DeclaredFunction) -> NfResult<()> {
        if self.functions.contains_key(function.name()) {
            return Err(NfError::new(
                "RUNTIME_FUNCTION_REDECLARED",
                format!(
                    "Function \"{}\" is already declared in implementation \"{}\".",
                    function.name(),
                    self.name
                ),
            ));
        }
        self.functions
            .insert(function.name().to_string(), Arc::new(function));
        Ok(())
    }

    pub fn function(&self, name: &str) -> Option<Arc<DeclaredFunction>> {
        self.functions.get(name).cloned()
    }
}
