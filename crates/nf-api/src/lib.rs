use std::collections::BTreeSet;
use std::sync::Arc;

use nf_core::{NfError, NfResult, NfValue, NodeKind, SyntaxNode};
use nf_runtime::{
    DiagnosticSymbols, FieldAccessPolicy, HostFunctionRegistry, OverloadResolver, Runtime,
    RuntimeOptions,
};
use tracing::debug;

#[derive(Clone, Default)]
pub struct CreateRuntimeOptions {
    pub host_functions: Option<Arc<dyn HostFunctionRegistry>>,
    pub overload_resolver: Option<Arc<dyn OverloadResolver>>,
    pub field_access: Option<FieldAccessPolicy>,
    pub symbols: Option<DiagnosticSymbols>,
    pub without_builtins: bool,
}

pub fn create_runtime(options: CreateRuntimeOptions) -> NfResult<Runtime> {
    Runtime::new(RuntimeOptions {
        host_functions: options.host_functions,
        overload_resolver: options.overload_resolver,
        evaluator: None,
        field_access: options.field_access.unwrap_or_default(),
        symbols: options.symbols.unwrap_or_default(),
        install_builtins: !options.without_builtins,
    })
}

/// Decodes a JSON syntax tree and checks that it is a program whose node
/// ids are unique.
pub fn parse_program(source: &str) -> NfResult<SyntaxNode> {
    let program: SyntaxNode = serde_json::from_str(source).map_err(|error| {
        NfError::new(
            "API_TREE_INVALID",
            format!("Syntax tree is not valid JSON: {}.", error),
        )
    })?;
    if !matches!(program.kind, NodeKind::Program { .. }) {
        return Err(NfError::with_span(
            "API_TREE_INVALID",
            "Top-level node must be a program.",
            program.span.clone(),
        ));
    }

    let mut seen = BTreeSet::new();
    if let Some(duplicate) = program
        .descendants()
        .into_iter()
        .find(|node| !seen.insert(node.id))
    {
        return Err(NfError::with_span(
            "API_TREE_INVALID",
            format!("Node id {} is used more than once.", duplicate.id),
            duplicate.span.clone(),
        ));
    }
    Ok(program)
}

pub fn run_program(runtime: &Runtime, program: &SyntaxNode) -> NfResult<NfValue> {
    runtime.run_program(program)
}

pub fn run_program_from_json(options: CreateRuntimeOptions, source: &str) -> NfResult<NfValue> {
    let program = parse_program(source)?;
    let runtime = create_runtime(options)?;
    let value = run_program(&runtime, &program)?;
    debug!(contexts = runtime.context_count(), "program finished");
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use nf_runtime::{BuiltinFunction, NativeRegistry, NativeSignature};
    use nf_core::NfType;

    const SUM_PROGRAM: &str = r#"{
        "id": 1, "kind": "program", "statements": [
            { "id": 2, "kind": "variableDeclaration", "name": "total",
              "initializer": { "id": 3, "kind": "literal", "value": 40 } },
            { "id": 4, "kind": "binary", "operator": "add",
              "left": { "id": 5, "kind": "qualifiedName", "path": "total" },
              "right": { "id": 6, "kind": "call", "name": "two" } }
        ]
    }"#;

    fn two() -> Arc<dyn HostFunctionRegistry> {
        let mut registry = NativeRegistry::new();
        registry.register_builtin(BuiltinFunction::new(
            "host",
            "two",
            NativeSignature::new(vec![], NfType::int()),
            |_| Ok(NfValue::Int(2)),
        ));
        Arc::new(registry)
    }

    #[test]
    fn run_program_from_json_uses_host_functions() {
        let value = run_program_from_json(
            CreateRuntimeOptions {
                host_functions: Some(two()),
                ..CreateRuntimeOptions::default()
            },
            SUM_PROGRAM,
        )
        .expect("program should run");
        assert_eq!(value, NfValue::Int(42));
    }

    #[test]
    fn run_program_from_json_reports_missing_host_function() {
        let error = run_program_from_json(CreateRuntimeOptions::default(), SUM_PROGRAM)
            .expect_err("two is not registered");
        assert_eq!(error.code, "RUNTIME_INVOCABLE_NOT_FOUND");
    }

    #[test]
    fn builtins_can_be_left_out() {
        let source = r#"{ "id": 1, "kind": "program", "statements": [
            { "id": 2, "kind": "call", "name": "length",
              "arguments": [{ "value": { "id": 3, "kind": "literal", "value": "abc" } }] }
        ] }"#;
        let value = run_program_from_json(CreateRuntimeOptions::default(), source)
            .expect("builtin length");
        assert_eq!(value, NfValue::Int(3));

        let error = run_program_from_json(
            CreateRuntimeOptions {
                without_builtins: true,
                ..CreateRuntimeOptions::default()
            },
            source,
        )
        .expect_err("no builtins");
        assert_eq!(error.code, "RUNTIME_INVOCABLE_NOT_FOUND");
    }

    #[test]
    fn parse_program_rejects_invalid_trees() {
        let error = parse_program("{ not json").expect_err("invalid json");
        assert_eq!(error.code, "API_TREE_INVALID");

        let error = parse_program(r#"{ "id": 1, "kind": "literal", "value": 1 }"#)
            .expect_err("not a program");
        assert_eq!(error.code, "API_TREE_INVALID");

        let error = parse_program(
            r#"{ "id": 1, "kind": "program", "statements": [
                { "id": 1, "kind": "literal", "value": 1 }
            ] }"#,
        )
        .expect_err("duplicate id");
        assert_eq!(error.code, "API_TREE_INVALID");
        assert!(error.message.contains("Node id 1"));
    }
}
