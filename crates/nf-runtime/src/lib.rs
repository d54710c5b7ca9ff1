mod bridge;
mod builtins;
pub mod call_state;
mod callable;
mod context;
pub mod declarations;
mod evaluator;
mod options;
mod runtime;

pub use bridge::{
    coerce_arguments, is_qualified_call, is_qualified_name, ArityTypeResolver,
    EmptyHostFunctionRegistry, FieldAccessPolicy, HostCallError, HostFunctionRegistry,
    NativeRegistry, OverloadResolver,
};
pub use builtins::{core_registry, CORE_PROVIDER};
pub use call_state::CallFrame;
pub use callable::{
    BuiltinFunction, Callable, ForeignConstructor, ForeignFunction, InstanceFn, NativeFn,
    NativeSignature,
};
pub use context::{ContextId, Deregistration};
pub use declarations::{DeclaredFunction, DeclaredImplementation, DeclaredParameter};
pub use evaluator::{Evaluator, Flow, LoopSignal, TreeWalker};
pub use options::{DiagnosticSymbols, RuntimeOptions, TOKEN_OPTIONAL, TOKEN_SEPARATOR};
pub use runtime::{
    bind_arguments, CallArgument, QualifiedPath, Runtime, Task, TaskCleanup, OPTIONAL_MARKER,
};

#[cfg(test)]
pub(crate) mod runtime_test_support {
    use std::any::Any;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Arc;

    use nf_core::{
        ArgumentNode, BinaryOperator, DeclaredVariable, ForeachTarget, HostObject, HostValue,
        Literal, NativeObject, NfType, NfValue, NodeKind, ObjectFieldNode, ParameterNode,
        SourceSpan, SyntaxNode,
    };
    use parking_lot::RwLock;

    use crate::bridge::NativeRegistry;
    use crate::options::RuntimeOptions;
    use crate::runtime::Runtime;

    static NEXT_NODE_ID: AtomicU64 = AtomicU64::new(1);

    pub fn node(kind: NodeKind) -> SyntaxNode {
        SyntaxNode::new(NEXT_NODE_ID.fetch_add(1, Ordering::Relaxed), kind)
    }

    fn literal(value: Literal) -> SyntaxNode {
        node(NodeKind::Literal { value })
    }

    pub fn int(value: i64) -> SyntaxNode {
        literal(Literal::Int(value))
    }

    pub fn float(value: f64) -> SyntaxNode {
        literal(Literal::Float(value))
    }

    pub fn boolean(value: bool) -> SyntaxNode {
        literal(Literal::Bool(value))
    }

    pub fn text(value: &str) -> SyntaxNode {
        literal(Literal::String(value.to_string()))
    }

    pub fn none_literal() -> SyntaxNode {
        literal(Literal::None)
    }

    pub fn block(statements: Vec<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::Block { statements })
    }

    pub fn program(statements: Vec<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::Program { statements })
    }

    pub fn var_decl(name: &str, initializer: Option<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::VariableDeclaration {
            name: name.to_string(),
            constant: false,
            declared_type: None,
            initializer: initializer.map(Box::new),
        })
    }

    pub fn assign(target: &str, value: SyntaxNode) -> SyntaxNode {
        node(NodeKind::Assignment {
            target: target.to_string(),
            value: Box::new(value),
        })
    }

    pub fn qname(path: &str) -> SyntaxNode {
        node(NodeKind::QualifiedName {
            path: path.to_string(),
        })
    }

    pub fn call_node(name: &str, arguments: Vec<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::Call {
            name: name.to_string(),
            arguments: arguments
                .into_iter()
                .map(|value| ArgumentNode { name: None, value })
                .collect(),
            overload_index: None,
        })
    }

    pub fn binary(operator: BinaryOperator, left: SyntaxNode, right: SyntaxNode) -> SyntaxNode {
        node(NodeKind::Binary {
            operator,
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    pub fn not_node(operand: SyntaxNode) -> SyntaxNode {
        node(NodeKind::Not {
            operand: Box::new(operand),
        })
    }

    pub fn list(elements: Vec<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::ListLiteral { elements })
    }

    pub fn object_literal(fields: Vec<(&str, SyntaxNode)>) -> SyntaxNode {
        node(NodeKind::ObjectLiteral {
            fields: fields
                .into_iter()
                .map(|(name, value)| ObjectFieldNode {
                    name: name.to_string(),
                    constant: false,
                    declared_type: None,
                    value,
                })
                .collect(),
        })
    }

    pub fn function_node(
        name: &str,
        parameters: &[(&str, Option<SyntaxNode>)],
        body: SyntaxNode,
    ) -> SyntaxNode {
        let parameters = parameters
            .iter()
            .map(|(name, default_value)| ParameterNode {
                name: name.to_string(),
                constant: false,
                declared_type: None,
                default_value: default_value.clone(),
                span: SourceSpan::synthetic(),
            })
            .collect();
        node(NodeKind::FunctionDeclaration {
            name: name.to_string(),
            is_async: false,
            parameters: Some(Box::new(node(NodeKind::ParameterList { parameters }))),
            return_type: None,
            body: Box::new(body),
        })
    }

    pub fn async_function_node(name: &str, body: SyntaxNode) -> SyntaxNode {
        let mut declaration = function_node(name, &[], body);
        if let NodeKind::FunctionDeclaration { is_async, .. } = &mut declaration.kind {
            *is_async = true;
        }
        declaration
    }

    pub fn set_return_type(declaration: &mut SyntaxNode, declared: NfType) {
        if let NodeKind::FunctionDeclaration { return_type, .. } = &mut declaration.kind {
            *return_type = Some(declared);
        }
    }

    pub fn return_node(value: Option<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::Return {
            value: value.map(Box::new),
        })
    }

    pub fn break_node() -> SyntaxNode {
        node(NodeKind::Break)
    }

    pub fn continue_node() -> SyntaxNode {
        node(NodeKind::Continue)
    }

    pub fn if_node(
        condition: SyntaxNode,
        then_branch: SyntaxNode,
        else_branch: Option<SyntaxNode>,
    ) -> SyntaxNode {
        node(NodeKind::If {
            condition: Box::new(condition),
            then_branch: Box::new(then_branch),
            else_branch: else_branch.map(Box::new),
        })
    }

    pub fn while_node(condition: SyntaxNode, body: SyntaxNode) -> SyntaxNode {
        node(NodeKind::While {
            condition: Box::new(condition),
            body: Box::new(body),
        })
    }

    pub fn foreach_node(target: ForeachTarget, iterable: SyntaxNode, body: SyntaxNode) -> SyntaxNode {
        node(NodeKind::Foreach {
            target,
            iterable: Box::new(iterable),
            body: Box::new(body),
        })
    }

    pub fn await_node(task: SyntaxNode) -> SyntaxNode {
        node(NodeKind::Await {
            task: Box::new(task),
        })
    }

    pub fn impl_node(name: &str, functions: Vec<SyntaxNode>) -> SyntaxNode {
        node(NodeKind::ImplementationDeclaration {
            name: name.to_string(),
            functions,
        })
    }

    pub fn runtime() -> Runtime {
        Runtime::new(RuntimeOptions::default()).expect("default runtime")
    }

    pub fn runtime_with_host(registry: NativeRegistry) -> Runtime {
        Runtime::new(RuntimeOptions {
            host_functions: Some(Arc::new(registry)),
            ..RuntimeOptions::default()
        })
        .expect("runtime with host functions")
    }

    pub fn object(fields: Vec<(&str, NfValue)>) -> NfValue {
        let object = NativeObject::new();
        for (name, value) in fields {
            object.insert(
                DeclaredVariable::new(0, name, false, NfType::Any, value).expect("field"),
            );
        }
        NfValue::Object(object)
    }

    /// Host object with a writable `x`, a `y` that silently ignores writes,
    /// and no other fields.
    #[derive(Debug)]
    pub struct TestPoint {
        x: RwLock<i64>,
        y: i64,
    }

    impl HostObject for TestPoint {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn get_field(&self, name: &str) -> Option<NfValue> {
            match name {
                "x" => Some(NfValue::Int(*self.x.read())),
                "y" => Some(NfValue::Int(self.y)),
                _ => None,
            }
        }

        fn set_field(&self, name: &str, value: NfValue) -> Result<(), String> {
            match (name, value) {
                ("x", NfValue::Int(x)) => {
                    *self.x.write() = x;
                    Ok(())
                }
                ("y", _) => Ok(()),
                (other, _) => Err(format!("Point has no writable field {}", other)),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    pub fn point(x: i64, y: i64) -> NfValue {
        NfValue::Host(HostValue::new(TestPoint {
            x: RwLock::new(x),
            y,
        }))
    }
}
