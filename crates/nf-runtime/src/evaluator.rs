use std::sync::Arc;

use nf_core::{
    BinaryOperator, DeclaredVariable, Literal, NativeObject, NfError, NfResult, NfType, NfValue,
    NodeKind, SyntaxNode,
};

use crate::context::ContextId;
use crate::declarations::{DeclaredFunction, DeclaredImplementation};
use crate::runtime::{CallArgument, Runtime};

#[derive(Debug, Clone, PartialEq)]
pub enum LoopSignal {
    Return(NfValue),
    Break,
    Continue,
}

/// Result of visiting one node: a plain value, or a control signal that
/// travels up to the nearest loop or function boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Flow {
    Value(NfValue),
    Signal(LoopSignal),
}

impl Flow {
    pub fn none() -> Self {
        Self::Value(NfValue::None)
    }

    pub fn into_value(self) -> NfValue {
        match self {
            Self::Value(value) | Self::Signal(LoopSignal::Return(value)) => value,
            Self::Signal(_) => NfValue::None,
        }
    }

    pub fn is_signal(&self) -> bool {
        matches!(self, Self::Signal(_))
    }
}

/// Tree-walking evaluation of single nodes. The runtime calls back into it
/// for function bodies, default values and task bodies.
pub trait Evaluator: Send + Sync {
    fn visit(&self, runtime: &Runtime, context: ContextId, node: &SyntaxNode) -> NfResult<Flow>;
}

#[derive(Debug, Default)]
pub struct TreeWalker;

impl Evaluator for TreeWalker {
    fn visit(&self, runtime: &Runtime, context: ContextId, node: &SyntaxNode) -> NfResult<Flow> {
        self.visit_node(runtime, context, node)
            .map_err(|error| error.at(node.span()))
    }
}

impl TreeWalker {
    fn visit_node(&self, runtime: &Runtime, context: ContextId, node: &SyntaxNode) -> NfResult<Flow> {
        match &node.kind {
            NodeKind::Program { statements } => self.run_statements(runtime, context, statements),
            NodeKind::Block { statements } => {
                let scope = runtime.create_context(context)?;
                let outcome = self.run_statements(runtime, scope, statements);
                let released = runtime.deregister_context(scope);
                let flow = outcome?;
                released?;
                Ok(flow)
            }
            NodeKind::VariableDeclaration {
                name,
                constant,
                declared_type,
                initializer,
            } => {
                let value = match initializer {
                    Some(initializer) => runtime.evaluate(context, initializer)?,
                    None => NfValue::None,
                };
                let variable = DeclaredVariable::new(
                    runtime.depth(context)?,
                    name,
                    *constant,
                    declared_type.clone().unwrap_or(NfType::Any),
                    value,
                )?
                .with_span(node.span.clone());
                runtime.define_variable(context, variable)?;
                Ok(Flow::none())
            }
            NodeKind::Assignment { target, value } => {
                let value = runtime.evaluate(context, value)?;
                runtime.write_qualified(context, target, value)?;
                Ok(Flow::none())
            }
            NodeKind::QualifiedName { path } => {
                runtime.read_qualified(context, path).map(Flow::Value)
            }
            NodeKind::FunctionDeclaration { .. } => {
                let function = DeclaredFunction::from_node(node, None, runtime.depth(context)?)?;
                runtime.define_function(context, Arc::new(function))?;
                Ok(Flow::none())
            }
            NodeKind::ImplementationDeclaration { name, functions } => {
                let depth = runtime.depth(context)?;
                let mut implementation = DeclaredImplementation::new(name, depth);
                for function in functions {
                    implementation.add_function(DeclaredFunction::from_node(
                        function,
                        Some(name),
                        depth,
                    )?)?;
                }
                runtime.define_implementation(context, implementation)?;
                Ok(Flow::none())
            }
            NodeKind::ParameterList { .. } => Ok(Flow::none()),
            NodeKind::Call {
                name,
                arguments,
                overload_index,
            } => {
                let arguments = arguments
                    .iter()
                    .map(|argument| -> NfResult<CallArgument> {
                        Ok(CallArgument {
                            name: argument.name.clone(),
                            value: runtime.evaluate(context, &argument.value)?,
                        })
                    })
                    .collect::<NfResult<Vec<_>>>()?;
                runtime
                    .call(context, name, arguments, *overload_index, node.span())
                    .map(Flow::Value)
            }
            NodeKind::Literal { value } => Ok(Flow::Value(literal_value(value))),
            NodeKind::ObjectLiteral { fields } => {
                let depth = runtime.depth(context)?;
                let object = NativeObject::new();
                for field in fields {
                    let value = runtime.evaluate(context, &field.value)?;
                    object.insert(DeclaredVariable::new(
                        depth,
                        &field.name,
                        field.constant,
                        field.declared_type.clone().unwrap_or(NfType::Any),
                        value,
                    )?);
                }
                Ok(Flow::Value(NfValue::Object(object)))
            }
            NodeKind::ListLiteral { elements } => elements
                .iter()
                .map(|element| runtime.evaluate(context, element))
                .collect::<NfResult<Vec<_>>>()
                .map(|values| Flow::Value(NfValue::List(values))),
            NodeKind::Binary {
                operator,
                left,
                right,
            } => self.binary(runtime, context, *operator, left, right).map(Flow::Value),
            NodeKind::Not { operand } => {
                let value = runtime.evaluate(context, operand)?;
                expect_bool(&value).map(|value| Flow::Value(NfValue::Bool(!value)))
            }
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition = runtime.evaluate(context, condition)?;
                if expect_bool(&condition)? {
                    runtime.visit(context, then_branch)
                } else if let Some(else_branch) = else_branch {
                    runtime.visit(context, else_branch)
                } else {
                    Ok(Flow::none())
                }
            }
            NodeKind::While { condition, body } => loop {
                runtime.clear_executed(context, body)?;
                let condition = runtime.evaluate(context, condition)?;
                if !expect_bool(&condition)? {
                    return Ok(Flow::none());
                }
                match runtime.visit(context, body)? {
                    Flow::Signal(LoopSignal::Break) => return Ok(Flow::none()),
                    flow @ Flow::Signal(LoopSignal::Return(_)) => return Ok(flow),
                    _ => {}
                }
            },
            NodeKind::Foreach {
                target,
                iterable,
                body,
            } => {
                let iterable = runtime.evaluate(context, iterable)?;
                for slots in iteration_slots(&iterable)? {
                    runtime.clear_executed(context, body)?;
                    let scope = runtime.create_context(context)?;
                    let outcome = self.run_iteration(runtime, scope, target.bindings(), &slots, body);
                    let released = runtime.deregister_context(scope);
                    let flow = outcome?;
                    released?;
                    match flow {
                        Flow::Signal(LoopSignal::Break) => break,
                        Flow::Signal(LoopSignal::Return(_)) => return Ok(flow),
                        _ => {}
                    }
                }
                Ok(Flow::none())
            }
            NodeKind::Return { value } => {
                let value = match value {
                    Some(value) => runtime.evaluate(context, value)?,
                    None => NfValue::None,
                };
                runtime.mark_executed(context, node)?;
                Ok(Flow::Signal(LoopSignal::Return(value)))
            }
            NodeKind::Break => {
                runtime.mark_executed(context, node)?;
                Ok(Flow::Signal(LoopSignal::Break))
            }
            NodeKind::Continue => {
                runtime.mark_executed(context, node)?;
                Ok(Flow::Signal(LoopSignal::Continue))
            }
            NodeKind::Await { task } => match runtime.evaluate(context, task)? {
                NfValue::Task(handle) => handle.join().map(Flow::Value),
                other => Err(NfError::new(
                    "RUNTIME_ILLEGAL_ARGUMENT",
                    format!("Only tasks can be awaited, got {}.", other.type_name()),
                )),
            },
        }
    }

    /// Runs statements in order and stops after the first one that executed
    /// a `return`, or that raised a loop signal through a `break`/`continue`.
    fn run_statements(
        &self,
        runtime: &Runtime,
        context: ContextId,
        statements: &[SyntaxNode],
    ) -> NfResult<Flow> {
        let mut last = Flow::none();
        for statement in statements {
            let flow = runtime.visit(context, statement)?;
            if runtime.should_break_statements(context, statement, &flow)? {
                return Ok(flow);
            }
            last = flow;
        }
        Ok(last)
    }

    fn run_iteration(
        &self,
        runtime: &Runtime,
        scope: ContextId,
        bindings: Vec<(usize, &str)>,
        slots: &[NfValue; 3],
        body: &SyntaxNode,
    ) -> NfResult<Flow> {
        for (slot, name) in bindings {
            runtime.declare(scope, name, false, NfType::Any, slots[slot].clone())?;
        }
        runtime.visit(scope, body)
    }

    fn binary(
        &self,
        runtime: &Runtime,
        context: ContextId,
        operator: BinaryOperator,
        left: &SyntaxNode,
        right: &SyntaxNode,
    ) -> NfResult<NfValue> {
        let left = runtime.evaluate(context, left)?;
        match operator {
            BinaryOperator::And if !expect_bool(&left)? => return Ok(NfValue::Bool(false)),
            BinaryOperator::Or if expect_bool(&left)? => return Ok(NfValue::Bool(true)),
            BinaryOperator::And | BinaryOperator::Or => {
                let right = runtime.evaluate(context, right)?;
                return expect_bool(&right).map(NfValue::Bool);
            }
            _ => {}
        }
        let right = runtime.evaluate(context, right)?;
        apply_binary(operator, left, right)
    }
}

fn literal_value(literal: &Literal) -> NfValue {
    match literal {
        Literal::None => NfValue::None,
        Literal::Bool(value) => NfValue::Bool(*value),
        Literal::Int(value) => NfValue::Int(*value),
        Literal::Float(value) => NfValue::Float(*value),
        Literal::String(value) => NfValue::String(value.clone()),
    }
}

fn expect_bool(value: &NfValue) -> NfResult<bool> {
    value.as_bool().ok_or_else(|| {
        NfError::new(
            "RUNTIME_BOOLEAN_EXPECTED",
            format!("Expected a bool, got {}.", value.type_name()),
        )
    })
}

/// `(index, key, value)` per step. Lists and strings repeat the element in
/// the key and value slots; objects put the field name in the key slot.
fn iteration_slots(iterable: &NfValue) -> NfResult<Vec<[NfValue; 3]>> {
    let index = |position: usize| NfValue::Int(position as i64);
    match iterable {
        NfValue::List(values) => Ok(values
            .iter()
            .enumerate()
            .map(|(position, value)| [index(position), value.clone(), value.clone()])
            .collect()),
        NfValue::Object(object) => Ok(object
            .entries()
            .into_iter()
            .enumerate()
            .map(|(position, (name, value))| [index(position), NfValue::String(name), value])
            .collect()),
        NfValue::String(text) => Ok(text
            .chars()
            .enumerate()
            .map(|(position, ch)| {
                let ch = NfValue::String(ch.to_string());
                [index(position), ch.clone(), ch]
            })
            .collect()),
        other => Err(NfError::new(
            "RUNTIME_NOT_ITERABLE",
            format!("Cannot iterate over {}.", other.type_name()),
        )),
    }
}

fn operand_mismatch(operator: BinaryOperator, left: &NfValue, right: &NfValue) -> NfError {
    NfError::new(
        "RUNTIME_OPERAND_MISMATCH",
        format!(
            "Operator {:?} does not apply to {} and {}.",
            operator,
            left.type_name(),
            right.type_name()
        ),
    )
}

fn apply_binary(operator: BinaryOperator, left: NfValue, right: NfValue) -> NfResult<NfValue> {
    use BinaryOperator::*;
    match operator {
        Equal => return Ok(NfValue::Bool(left == right)),
        NotEqual => return Ok(NfValue::Bool(left != right)),
        _ => {}
    }
    match (&left, &right) {
        (NfValue::Int(a), NfValue::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match operator {
                Add => a.checked_add(b),
                Subtract => a.checked_sub(b),
                Multiply => a.checked_mul(b),
                Divide if b == 0 => {
                    return Err(NfError::new("RUNTIME_ILLEGAL_ARGUMENT", "Division by zero."))
                }
                Divide => a.checked_div(b),
                Less => return Ok(NfValue::Bool(a < b)),
                LessEqual => return Ok(NfValue::Bool(a <= b)),
                Greater => return Ok(NfValue::Bool(a > b)),
                GreaterEqual => return Ok(NfValue::Bool(a >= b)),
                _ => return Err(operand_mismatch(operator, &left, &right)),
            };
            result.map(NfValue::Int).ok_or_else(|| {
                NfError::new(
                    "RUNTIME_ILLEGAL_ARGUMENT",
                    format!("Integer overflow in {} {:?} {}.", a, operator, b),
                )
            })
        }
        (NfValue::Int(_) | NfValue::Float(_), NfValue::Int(_) | NfValue::Float(_)) => {
            let (Some(a), Some(b)) = (left.as_float(), right.as_float()) else {
                return Err(operand_mismatch(operator, &left, &right));
            };
            Ok(match operator {
                Add => NfValue::Float(a + b),
                Subtract => NfValue::Float(a - b),
                Multiply => NfValue::Float(a * b),
                Divide => NfValue::Float(a / b),
                Less => NfValue::Bool(a < b),
                LessEqual => NfValue::Bool(a <= b),
                Greater => NfValue::Bool(a > b),
                GreaterEqual => NfValue::Bool(a >= b),
                _ => return Err(operand_mismatch(operator, &left, &right)),
            })
        }
        (NfValue::String(a), NfValue::String(b)) => Ok(match operator {
            Add => NfValue::String(format!("{}{}", a, b)),
            Less => NfValue::Bool(a < b),
            LessEqual => NfValue::Bool(a <= b),
            Greater => NfValue::Bool(a > b),
            GreaterEqual => NfValue::Bool(a >= b),
            _ => return Err(operand_mismatch(operator, &left, &right)),
        }),
        (NfValue::String(a), other) if operator == Add => {
            Ok(NfValue::String(format!("{}{}", a, other)))
        }
        (NfValue::List(a), NfValue::List(b)) if operator == Add => {
            Ok(NfValue::List(a.iter().chain(b).cloned().collect()))
        }
        _ => Err(operand_mismatch(operator, &left, &right)),
    }
}

#[cfg(test)]
mod evaluator_tests {
    use super::*;
    use crate::runtime_test_support::*;
    use nf_core::ForeachTarget;
    use pretty_assertions::assert_eq;

    fn run(statements: Vec<SyntaxNode>) -> NfResult<NfValue> {
        runtime().run_program(&program(statements))
    }

    #[test]
    fn blocks_scope_their_declarations() {
        let runtime = runtime();
        let outcome = runtime.run_program(&program(vec![
            block(vec![var_decl("inner", Some(int(1)))]),
            qname("inner"),
        ]));
        let error = outcome.expect_err("inner is out of scope");
        assert_eq!(error.code, "RUNTIME_VARIABLE_NOT_FOUND");
        assert_eq!(runtime.context_count(), 1);
    }

    #[test]
    fn redeclaration_in_one_scope_fails_with_position() {
        let error = run(vec![
            var_decl("x", Some(int(1))),
            var_decl("x", Some(int(2))).with_span(nf_core::SourceSpan::at(2, 5)),
        ])
        .expect_err("redeclared");
        assert_eq!(error.code, "RUNTIME_VARIABLE_REDECLARED");
        assert_eq!(error.position(), Some((2, 5)));
    }

    #[test]
    fn while_loops_honour_break_and_continue() {
        // n = 0; total = 0
        // while true { n = n + 1; if n == 5 { break }; if n == 2 { continue }; total = total + n }
        let value = run(vec![
            var_decl("n", Some(int(0))),
            var_decl("total", Some(int(0))),
            while_node(
                boolean(true),
                block(vec![
                    assign("n", binary(BinaryOperator::Add, qname("n"), int(1))),
                    if_node(
                        binary(BinaryOperator::Equal, qname("n"), int(5)),
                        block(vec![break_node()]),
                        None,
                    ),
                    if_node(
                        binary(BinaryOperator::Equal, qname("n"), int(2)),
                        block(vec![continue_node()]),
                        None,
                    ),
                    assign("total", binary(BinaryOperator::Add, qname("total"), qname("n"))),
                ]),
            ),
            qname("total"),
        ])
        .expect("program");
        assert_eq!(value, NfValue::Int(1 + 3 + 4));
    }

    #[test]
    fn return_inside_a_loop_leaves_the_function() {
        let find = function_node(
            "find",
            &[("items", None)],
            block(vec![
                foreach_node(
                    ForeachTarget::IndexValue {
                        index: "i".to_string(),
                        value: "item".to_string(),
                    },
                    qname("items"),
                    block(vec![if_node(
                        binary(BinaryOperator::Equal, qname("item"), text("b")),
                        block(vec![return_node(Some(qname("i")))]),
                        None,
                    )]),
                ),
                return_node(Some(int(-1))),
            ]),
        );
        let value = run(vec![
            find,
            call_node("find", vec![list(vec![text("a"), text("b"), text("c")])]),
        ])
        .expect("program");
        assert_eq!(value, NfValue::Int(1));
    }

    #[test]
    fn foreach_binds_keys_and_values_of_objects() {
        let value = run(vec![
            var_decl("out", Some(text(""))),
            foreach_node(
                ForeachTarget::KeyValue {
                    key: "k".to_string(),
                    value: "v".to_string(),
                },
                object_literal(vec![("a", int(1)), ("b", int(2))]),
                block(vec![assign(
                    "out",
                    binary(
                        BinaryOperator::Add,
                        qname("out"),
                        binary(BinaryOperator::Add, qname("k"), qname("v")),
                    ),
                )]),
            ),
            qname("out"),
        ])
        .expect("program");
        assert_eq!(value, NfValue::from("a1b2"));

        let error = run(vec![foreach_node(
            ForeachTarget::Value {
                value: "v".to_string(),
            },
            int(3),
            block(vec![]),
        )])
        .expect_err("int is not iterable");
        assert_eq!(error.code, "RUNTIME_NOT_ITERABLE");
    }

    #[test]
    fn object_literals_support_qualified_reads_and_writes() {
        let value = run(vec![
            var_decl(
                "shape",
                Some(object_literal(vec![("size", object_literal(vec![("w", int(2))]))])),
            ),
            assign("shape:size:w", int(9)),
            qname("shape:size:w"),
        ])
        .expect("program");
        assert_eq!(value, NfValue::Int(9));
    }

    #[test]
    fn operators_check_their_operands() {
        let error = run(vec![binary(BinaryOperator::Divide, int(1), int(0))]).expect_err("div 0");
        assert_eq!(error.code, "RUNTIME_ILLEGAL_ARGUMENT");
        let error = run(vec![binary(BinaryOperator::Subtract, text("a"), int(1))])
            .expect_err("string minus int");
        assert_eq!(error.code, "RUNTIME_OPERAND_MISMATCH");
        let error = run(vec![if_node(int(1), block(vec![]), None)]).expect_err("int condition");
        assert_eq!(error.code, "RUNTIME_BOOLEAN_EXPECTED");
        assert_eq!(
            run(vec![binary(BinaryOperator::Add, int(1), float(0.5))]).expect("mixed"),
            NfValue::Float(1.5)
        );
        assert_eq!(
            run(vec![binary(BinaryOperator::Or, boolean(true), qname("undefined"))])
                .expect("short circuit"),
            NfValue::Bool(true)
        );
    }

    #[test]
    fn negation_requires_a_boolean() {
        assert_eq!(run(vec![not_node(boolean(false))]).expect("not"), NfValue::Bool(true));
        assert_eq!(
            run(vec![var_decl("n", Some(none_literal())), qname("n")]).expect("none"),
            NfValue::None
        );
        let error = run(vec![not_node(none_literal())]).expect_err("not none");
        assert_eq!(error.code, "RUNTIME_BOOLEAN_EXPECTED");
    }

    #[test]
    fn await_joins_async_calls() {
        let value = run(vec![
            async_function_node("g", block(vec![return_node(Some(int(4)))])),
            var_decl("task", Some(call_node("g", vec![]))),
            await_node(qname("task")),
        ])
        .expect("program");
        assert_eq!(value, NfValue::Int(4));

        let error = run(vec![await_node(int(1))]).expect_err("not a task");
        assert_eq!(error.code, "RUNTIME_ILLEGAL_ARGUMENT");
    }

    #[test]
    fn implementation_members_see_their_siblings_through_self() {
        let value = run(vec![
            impl_node(
                "Shape",
                vec![
                    function_node("side", &[], block(vec![return_node(Some(int(3)))])),
                    function_node(
                        "area",
                        &[],
                        block(vec![return_node(Some(binary(
                            BinaryOperator::Multiply,
                            call_node("self::side", vec![]),
                            call_node("self::side", vec![]),
                        )))]),
                    ),
                ],
            ),
            call_node("Shape::area", vec![]),
        ])
        .expect("program");
        assert_eq!(value, NfValue::Int(9));
    }
}
