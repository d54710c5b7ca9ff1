use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::{NfError, NfResult};
use crate::task::TaskHandle;
use crate::types::{NfType, PRIMITIVE_BOOL, PRIMITIVE_FLOAT, PRIMITIVE_INT, PRIMITIVE_STRING};
use crate::variable::DeclaredVariable;

/// An object owned by the embedding host. Field access goes through the
/// object itself, so implementations use interior mutability for writes.
pub trait HostObject: Send + Sync + fmt::Debug {
    fn type_name(&self) -> &str;
    fn get_field(&self, name: &str) -> Option<NfValue>;
    fn set_field(&self, name: &str, value: NfValue) -> Result<(), String>;
    fn as_any(&self) -> &dyn Any;
}

#[derive(Clone, Debug)]
pub struct HostValue(Arc<dyn HostObject>);

impl HostValue {
    pub fn new<T: HostObject + 'static>(object: T) -> Self {
        Self(Arc::new(object))
    }

    pub fn from_arc(object: Arc<dyn HostObject>) -> Self {
        Self(object)
    }

    pub fn type_name(&self) -> &str {
        self.0.type_name()
    }

    pub fn get_field(&self, name: &str) -> Option<NfValue> {
        self.0.get_field(name)
    }

    pub fn set_field(&self, name: &str, value: NfValue) -> Result<(), String> {
        self.0.set_field(name, value)
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.as_any().downcast_ref::<T>()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// Script-created object: a shared map of declared fields.
#[derive(Clone, Debug, Default)]
pub struct NativeObject {
    fields: Arc<RwLock<BTreeMap<String, DeclaredVariable>>>,
}

impl NativeObject {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, variable: DeclaredVariable) {
        self.fields
            .write()
            .insert(variable.name().to_string(), variable);
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.read().contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<NfValue> {
        self.fields.read().get(name).map(|field| field.value().clone())
    }

    pub fn variable(&self, name: &str) -> Option<DeclaredVariable> {
        self.fields.read().get(name).cloned()
    }

    /// Assigns an existing field. Returns `Ok(false)` when the field is absent.
    pub fn assign(&self, name: &str, value: NfValue) -> NfResult<bool> {
        match self.fields.write().get_mut(name) {
            Some(field) => field.assign(value).map(|_| true),
            None => Ok(false),
        }
    }

    pub fn field_names(&self) -> Vec<String> {
        self.fields.read().keys().cloned().collect()
    }

    pub fn entries(&self) -> Vec<(String, NfValue)> {
        self.fields
            .read()
            .iter()
            .map(|(name, field)| (name.clone(), field.value().clone()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.fields.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.read().is_empty()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.fields, &other.fields)
    }
}

#[derive(Clone, Debug, Default)]
pub enum NfValue {
    #[default]
    None,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<NfValue>),
    Object(NativeObject),
    Host(HostValue),
    Task(TaskHandle),
}

impl NfValue {
    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn is_none(&self) -> bool {
        matches!(self, Self::None)
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Int(value) => Some(*value as f64),
            Self::Float(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn type_name(&self) -> String {
        match self {
            Self::None => "none".to_string(),
            Self::Bool(_) => PRIMITIVE_BOOL.to_string(),
            Self::Int(_) => PRIMITIVE_INT.to_string(),
            Self::Float(_) => PRIMITIVE_FLOAT.to_string(),
            Self::String(_) => PRIMITIVE_STRING.to_string(),
            Self::List(_) => "list".to_string(),
            Self::Object(_) => "object".to_string(),
            Self::Host(host) => host.type_name().to_string(),
            Self::Task(_) => "task".to_string(),
        }
    }

    fn render_nested(&self) -> String {
        match self {
            Self::String(value) => format!("\"{}\"", value),
            other => other.to_string(),
        }
    }
}

impl PartialEq for NfValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::None, Self::None) => true,
            (Self::Bool(left), Self::Bool(right)) => left == right,
            (Self::Int(left), Self::Int(right)) => left == right,
            (Self::Int(_), Self::Float(_)) | (Self::Float(_), Self::Int(_)) | (Self::Float(_), Self::Float(_)) => {
                self.as_float() == other.as_float()
            }
            (Self::String(left), Self::String(right)) => left == right,
            (Self::List(left), Self::List(right)) => left == right,
            (Self::Object(left), Self::Object(right)) => {
                left.ptr_eq(right) || left.entries() == right.entries()
            }
            (Self::Host(left), Self::Host(right)) => left.ptr_eq(right),
            (Self::Task(left), Self::Task(right)) => left.id() == right.id(),
            _ => false,
        }
    }
}

impl fmt::Display for NfValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => write!(f, "none"),
            Self::Bool(value) => write!(f, "{}", value),
            Self::Int(value) => write!(f, "{}", value),
            Self::Float(value) => write!(f, "{}", value),
            Self::String(value) => write!(f, "{}", value),
            Self::List(values) => {
                let rendered = values
                    .iter()
                    .map(NfValue::render_nested)
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "[{}]", rendered)
            }
            Self::Object(object) => {
                let rendered = object
                    .entries()
                    .iter()
                    .map(|(name, value)| format!("{}: {}", name, value.render_nested()))
                    .collect::<Vec<_>>()
                    .join(", ");
                write!(f, "{{{}}}", rendered)
            }
            Self::Host(host) => write!(f, "<{}>", host.type_name()),
            Self::Task(task) => write!(f, "{}", task),
        }
    }
}

impl From<bool> for NfValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for NfValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for NfValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for NfValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for NfValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl NfType {
    pub fn accepts(&self, value: &NfValue) -> bool {
        self.admit(value.clone()).is_some()
    }

    /// Returns the value as stored under this type, widening `int` to
    /// `float` where needed. `None` is admitted by every type.
    pub fn admit(&self, value: NfValue) -> Option<NfValue> {
        if value.is_none() {
            return Some(value);
        }
        match (self, value) {
            (Self::Any, value) => Some(value),
            (Self::Void, _) => None,
            (Self::Primitive { name }, value) => match (name.as_str(), value) {
                (PRIMITIVE_BOOL, value @ NfValue::Bool(_)) => Some(value),
                (PRIMITIVE_INT, value @ NfValue::Int(_)) => Some(value),
                (PRIMITIVE_FLOAT, NfValue::Int(value)) => Some(NfValue::Float(value as f64)),
                (PRIMITIVE_FLOAT, value @ NfValue::Float(_)) => Some(value),
                (PRIMITIVE_STRING, value @ NfValue::String(_)) => Some(value),
                _ => None,
            },
            (Self::List { element_type }, NfValue::List(values)) => values
                .into_iter()
                .map(|entry| element_type.admit(entry))
                .collect::<Option<Vec<_>>>()
                .map(NfValue::List),
            (Self::Object, value @ NfValue::Object(_)) => Some(value),
            (Self::Task, value @ NfValue::Task(_)) => Some(value),
            (Self::Host { type_name }, NfValue::Host(host)) if host.type_name() == type_name.as_str() => {
                Some(NfValue::Host(host))
            }
            _ => None,
        }
    }

    pub fn admit_or_mismatch(&self, value: NfValue, what: &str) -> NfResult<NfValue> {
        let actual = value.type_name();
        self.admit(value).ok_or_else(|| {
            NfError::new(
                "RUNTIME_TYPE_MISMATCH",
                format!("{} expects {}, got {}.", what, self, actual),
            )
        })
    }
}

#[cfg(test)]
mod value_tests {
    use super::*;

    #[derive(Debug)]
    struct Point {
        x: RwLock<i64>,
    }

    impl HostObject for Point {
        fn type_name(&self) -> &str {
            "Point"
        }

        fn get_field(&self, name: &str) -> Option<NfValue> {
            (name == "x").then(|| NfValue::Int(*self.x.read()))
        }

        fn set_field(&self, name: &str, value: NfValue) -> Result<(), String> {
            match (name, value) {
                ("x", NfValue::Int(value)) => {
                    *self.x.write() = value;
                    Ok(())
                }
                _ => Err(format!("cannot set {}", name)),
            }
        }

        fn as_any(&self) -> &dyn Any {
            self
        }
    }

    #[test]
    fn admit_widens_ints_and_checks_lists() {
        assert_eq!(NfType::float().admit(NfValue::Int(2)), Some(NfValue::Float(2.0)));
        assert_eq!(NfType::int().admit(NfValue::Float(2.5)), None);
        assert_eq!(NfType::string().admit(NfValue::None), Some(NfValue::None));
        assert!(NfType::list_of(NfType::int()).accepts(&NfValue::List(vec![NfValue::Int(1)])));
        assert!(!NfType::list_of(NfType::int()).accepts(&NfValue::List(vec![NfValue::from("a")])));

        let error = NfType::bool()
            .admit_or_mismatch(NfValue::Int(1), "flag")
            .expect_err("int is not a bool");
        assert_eq!(error.code, "RUNTIME_TYPE_MISMATCH");
    }

    #[test]
    fn native_objects_share_fields_across_clones() {
        let object = NativeObject::new();
        object.insert(
            DeclaredVariable::new(0, "b", false, NfType::int(), NfValue::Int(1)).expect("field"),
        );
        let alias = object.clone();
        assert!(alias.assign("b", NfValue::Int(7)).expect("assign should pass"));
        assert_eq!(object.get("b"), Some(NfValue::Int(7)));
        assert!(!alias.assign("c", NfValue::from("new")).expect("missing field"));
        object.insert(
            DeclaredVariable::new(0, "c", true, NfType::Any, NfValue::from("new")).expect("field"),
        );
        assert_eq!(object.field_names(), vec!["b".to_string(), "c".to_string()]);
        assert_eq!(NfValue::Object(object).to_string(), "{b: 7, c: \"new\"}");
    }

    #[test]
    fn host_values_route_field_access_to_the_object() {
        let host = HostValue::new(Point { x: RwLock::new(1) });
        assert_eq!(host.get_field("x"), Some(NfValue::Int(1)));
        host.set_field("x", NfValue::Int(5)).expect("write should pass");
        assert_eq!(host.get_field("x"), Some(NfValue::Int(5)));
        assert!(host.set_field("y", NfValue::Int(1)).is_err());
        assert!(host.downcast_ref::<Point>().is_some());
        assert!(NfType::host("Point").accepts(&NfValue::Host(host)));
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert_eq!(NfValue::Int(2), NfValue::Float(2.0));
        assert_ne!(NfValue::Int(2), NfValue::from("2"));
        assert_eq!(NfValue::List(vec![NfValue::Int(1), "a".into()]).to_string(), "[1, \"a\"]");
    }
}
