use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    pub start: SourceLocation,
    pub end: SourceLocation,
}

impl SourceSpan {
    pub fn synthetic() -> Self {
        Self::at(1, 1)
    }

    pub fn at(line: usize, column: usize) -> Self {
        Self {
            start: SourceLocation { line, column },
            end: SourceLocation { line, column },
        }
    }
}

impl Default for SourceSpan {
    fn default() -> Self {
        Self::synthetic()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NfType {
    Any,
    Void,
    Primitive { name: String },
    List { element_type: Box<NfType> },
    Object,
    Task,
    Host { type_name: String },
}

pub const PRIMITIVE_BOOL: &str = "bool";
pub const PRIMITIVE_INT: &str = "int";
pub const PRIMITIVE_FLOAT: &str = "float";
pub const PRIMITIVE_STRING: &str = "string";

impl NfType {
    pub fn primitive(name: &str) -> Self {
        Self::Primitive {
            name: name.to_string(),
        }
    }

    pub fn bool() -> Self {
        Self::primitive(PRIMITIVE_BOOL)
    }

    pub fn int() -> Self {
        Self::primitive(PRIMITIVE_INT)
    }

    pub fn float() -> Self {
        Self::primitive(PRIMITIVE_FLOAT)
    }

    pub fn string() -> Self {
        Self::primitive(PRIMITIVE_STRING)
    }

    pub fn list_of(element_type: NfType) -> Self {
        Self::List {
            element_type: Box::new(element_type),
        }
    }

    pub fn host(type_name: &str) -> Self {
        Self::Host {
            type_name: type_name.to_string(),
        }
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Void)
    }

    pub fn is_any(&self) -> bool {
        matches!(self, Self::Any)
    }
}

impl Default for NfType {
    fn default() -> Self {
        Self::Any
    }
}

impl fmt::Display for NfType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Any => write!(f, "any"),
            Self::Void => write!(f, "void"),
            Self::Primitive { name } => write!(f, "{}", name),
            Self::List { element_type } => write!(f, "list<{}>", element_type),
            Self::Object => write!(f, "object"),
            Self::Task => write!(f, "task"),
            Self::Host { type_name } => write!(f, "{}", type_name),
        }
    }
}

#[cfg(test)]
mod types_tests {
    use super::*;

    #[test]
    fn types_deserialize_from_tagged_json() {
        let ty: NfType = serde_json::from_str(
            r#"{"kind":"list","element_type":{"kind":"primitive","name":"int"}}"#,
        )
        .expect("type should parse");
        assert_eq!(ty, NfType::list_of(NfType::int()));
        assert_eq!(ty.to_string(), "list<int>");

        let any: NfType = serde_json::from_str(r#"{"kind":"any"}"#).expect("any should parse");
        assert!(any.is_any());
    }

    #[test]
    fn synthetic_span_points_at_origin() {
        let span = SourceSpan::default();
        assert_eq!(span.start.line, 1);
        assert_eq!(span.start.column, 1);
    }
}
