use serde::{Deserialize, Serialize};

use crate::types::{NfType, SourceSpan};

pub type NodeId = u64;

/// Node of the syntax tree handed over by the parser. Node ids are unique
/// within one program and key the executed-node markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyntaxNode {
    pub id: NodeId,
    #[serde(default)]
    pub span: SourceSpan,
    #[serde(flatten)]
    pub kind: NodeKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    Program {
        statements: Vec<SyntaxNode>,
    },
    Block {
        statements: Vec<SyntaxNode>,
    },
    VariableDeclaration {
        name: String,
        #[serde(default)]
        constant: bool,
        #[serde(default)]
        declared_type: Option<NfType>,
        #[serde(default)]
        initializer: Option<Box<SyntaxNode>>,
    },
    Assignment {
        target: String,
        value: Box<SyntaxNode>,
    },
    QualifiedName {
        path: String,
    },
    FunctionDeclaration {
        name: String,
        #[serde(default)]
        is_async: bool,
        #[serde(default)]
        parameters: Option<Box<SyntaxNode>>,
        #[serde(default)]
        return_type: Option<NfType>,
        body: Box<SyntaxNode>,
    },
    ParameterList {
        parameters: Vec<ParameterNode>,
    },
    ImplementationDeclaration {
        name: String,
        functions: Vec<SyntaxNode>,
    },
    Call {
        name: String,
        #[serde(default)]
        arguments: Vec<ArgumentNode>,
        #[serde(default)]
        overload_index: Option<usize>,
    },
    Literal {
        value: Literal,
    },
    ObjectLiteral {
        fields: Vec<ObjectFieldNode>,
    },
    ListLiteral {
        elements: Vec<SyntaxNode>,
    },
    Binary {
        operator: BinaryOperator,
        left: Box<SyntaxNode>,
        right: Box<SyntaxNode>,
    },
    Not {
        operand: Box<SyntaxNode>,
    },
    If {
        condition: Box<SyntaxNode>,
        then_branch: Box<SyntaxNode>,
        #[serde(default)]
        else_branch: Option<Box<SyntaxNode>>,
    },
    While {
        condition: Box<SyntaxNode>,
        body: Box<SyntaxNode>,
    },
    Foreach {
        target: ForeachTarget,
        iterable: Box<SyntaxNode>,
        body: Box<SyntaxNode>,
    },
    Return {
        #[serde(default)]
        value: Option<Box<SyntaxNode>>,
    },
    Break,
    Continue,
    Await {
        task: Box<SyntaxNode>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterNode {
    pub name: String,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub declared_type: Option<NfType>,
    #[serde(default)]
    pub default_value: Option<SyntaxNode>,
    #[serde(default)]
    pub span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgumentNode {
    #[serde(default)]
    pub name: Option<String>,
    pub value: SyntaxNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectFieldNode {
    pub name: String,
    #[serde(default)]
    pub constant: bool,
    #[serde(default)]
    pub declared_type: Option<NfType>,
    pub value: SyntaxNode,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Literal {
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BinaryOperator {
    Add,
    Subtract,
    Multiply,
    Divide,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

/// Slot of the `(index, key, value)` tuple produced by one iteration step.
pub const SLOT_INDEX: usize = 0;
pub const SLOT_KEY: usize = 1;
pub const SLOT_VALUE: usize = 2;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "shape", rename_all = "camelCase")]
pub enum ForeachTarget {
    Value {
        value: String,
    },
    KeyValue {
        key: String,
        value: String,
    },
    IndexValue {
        index: String,
        value: String,
    },
    IndexKeyValue {
        index: String,
        key: String,
        value: String,
    },
}

impl ForeachTarget {
    /// Fixed slot table: value-only reads slot 1, key-value slots 1 and 2,
    /// index-value slots 0 and 1, index-key-value all three.
    pub fn bindings(&self) -> Vec<(usize, &str)> {
        match self {
            Self::Value { value } => vec![(SLOT_KEY, value.as_str())],
            Self::KeyValue { key, value } => {
                vec![(SLOT_KEY, key.as_str()), (SLOT_VALUE, value.as_str())]
            }
            Self::IndexValue { index, value } => {
                vec![(SLOT_INDEX, index.as_str()), (SLOT_KEY, value.as_str())]
            }
            Self::IndexKeyValue { index, key, value } => vec![
                (SLOT_INDEX, index.as_str()),
                (SLOT_KEY, key.as_str()),
                (SLOT_VALUE, value.as_str()),
            ],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    Return,
    Break,
    Continue,
}

impl SyntaxNode {
    pub fn new(id: NodeId, kind: NodeKind) -> Self {
        Self {
            id,
            span: SourceSpan::synthetic(),
            kind,
        }
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = span;
        self
    }

    pub fn span(&self) -> &SourceSpan {
        &self.span
    }

    pub fn line(&self) -> usize {
        self.span.start.line
    }

    pub fn column(&self) -> usize {
        self.span.start.column
    }

    pub fn control_kind(&self) -> Option<ControlKind> {
        match self.kind {
            NodeKind::Return { .. } => Some(ControlKind::Return),
            NodeKind::Break => Some(ControlKind::Break),
            NodeKind::Continue => Some(ControlKind::Continue),
            _ => None,
        }
    }

    pub fn parameter_list(&self) -> Option<&[ParameterNode]> {
        match &self.kind {
            NodeKind::FunctionDeclaration { parameters, .. } => match parameters.as_deref() {
                Some(SyntaxNode {
                    kind: NodeKind::ParameterList { parameters },
                    ..
                }) => Some(parameters.as_slice()),
                _ => Some(&[]),
            },
            NodeKind::ParameterList { parameters } => Some(parameters.as_slice()),
            _ => None,
        }
    }

    pub fn return_type(&self) -> Option<&NfType> {
        match &self.kind {
            NodeKind::FunctionDeclaration { return_type, .. } => return_type.as_ref(),
            _ => None,
        }
    }

    pub fn foreach_target(&self) -> Option<&ForeachTarget> {
        match &self.kind {
            NodeKind::Foreach { target, .. } => Some(target),
            _ => None,
        }
    }

    /// Direct children in source order, including parameter defaults,
    /// call arguments and object-literal field values.
    pub fn children(&self) -> Vec<&SyntaxNode> {
        match &self.kind {
            NodeKind::Program { statements } | NodeKind::Block { statements } => {
                statements.iter().collect()
            }
            NodeKind::VariableDeclaration { initializer, .. } => {
                initializer.iter().map(|node| node.as_ref()).collect()
            }
            NodeKind::Assignment { value, .. } => vec![value.as_ref()],
            NodeKind::FunctionDeclaration {
                parameters, body, ..
            } => parameters
                .iter()
                .map(|node| node.as_ref())
                .chain(std::iter::once(body.as_ref()))
                .collect(),
            NodeKind::ParameterList { parameters } => parameters
                .iter()
                .filter_map(|parameter| parameter.default_value.as_ref())
                .collect(),
            NodeKind::ImplementationDeclaration { functions, .. } => functions.iter().collect(),
            NodeKind::Call { arguments, .. } => {
                arguments.iter().map(|argument| &argument.value).collect()
            }
            NodeKind::ObjectLiteral { fields } => fields.iter().map(|field| &field.value).collect(),
            NodeKind::ListLiteral { elements } => elements.iter().collect(),
            NodeKind::Binary { left, right, .. } => vec![left.as_ref(), right.as_ref()],
            NodeKind::Not { operand } => vec![operand.as_ref()],
            NodeKind::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut children = vec![condition.as_ref(), then_branch.as_ref()];
                if let Some(else_branch) = else_branch {
                    children.push(else_branch.as_ref());
                }
                children
            }
            NodeKind::While { condition, body } => vec![condition.as_ref(), body.as_ref()],
            NodeKind::Foreach { iterable, body, .. } => vec![iterable.as_ref(), body.as_ref()],
            NodeKind::Return { value } => value.iter().map(|node| node.as_ref()).collect(),
            NodeKind::Await { task } => vec![task.as_ref()],
            NodeKind::QualifiedName { .. }
            | NodeKind::Literal { .. }
            | NodeKind::Break
            | NodeKind::Continue => Vec::new(),
        }
    }

    /// Pre-order walk over this node and every descendant.
    pub fn descendants(&self) -> Vec<&SyntaxNode> {
        let mut out = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            out.push(node);
            let children = node.children();
            stack.extend(children.into_iter().rev());
        }
        out
    }
}
