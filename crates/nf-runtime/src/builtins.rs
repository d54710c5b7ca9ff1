use nf_core::{NfType, NfValue};

use crate::bridge::{HostCallError, NativeRegistry};
use crate::callable::{BuiltinFunction, NativeSignature};

pub const CORE_PROVIDER: &str = "core";

/// The standard `core` provider installed into every runtime unless the
/// options opt out.
pub fn core_registry() -> NativeRegistry {
    let mut registry = NativeRegistry::new();
    registry
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "print",
            NativeSignature::new(vec![NfType::Any], NfType::Void).variadic(),
            |args| {
                let line = args
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(" ");
                println!("{}", line);
                Ok(NfValue::None)
            },
        ))
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "length",
            NativeSignature::new(vec![NfType::Any], NfType::int()),
            |args| {
                let length = match &args[0] {
                    NfValue::String(text) => text.chars().count(),
                    NfValue::List(values) => values.len(),
                    NfValue::Object(object) => object.len(),
                    other => {
                        return Err(HostCallError::ArgumentMismatch(format!(
                            "{} has no length",
                            other.type_name()
                        )))
                    }
                };
                Ok(NfValue::Int(length as i64))
            },
        ))
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "to_string",
            NativeSignature::new(vec![NfType::Any], NfType::string()),
            |args| Ok(NfValue::String(args[0].to_string())),
        ))
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "type_of",
            NativeSignature::new(vec![NfType::Any], NfType::string()),
            |args| Ok(NfValue::String(args[0].type_name())),
        ))
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "max",
            NativeSignature::new(vec![NfType::int(), NfType::int()], NfType::int()),
            |args| match (&args[0], &args[1]) {
                (NfValue::Int(a), NfValue::Int(b)) => Ok(NfValue::Int(*a.max(b))),
                _ => Err(HostCallError::ArgumentMismatch("max expects ints".to_string())),
            },
        ))
        .register_builtin(BuiltinFunction::new(
            CORE_PROVIDER,
            "max",
            NativeSignature::new(vec![NfType::float(), NfType::float()], NfType::float()),
            |args| match (args[0].as_float(), args[1].as_float()) {
                (Some(a), Some(b)) => Ok(NfValue::Float(a.max(b))),
                _ => Err(HostCallError::ArgumentMismatch("max expects floats".to_string())),
            },
        ));
    registry
}

#[cfg(test)]
mod builtins_tests {
    use super::*;
    use crate::bridge::HostFunctionRegistry;
    use crate::callable::Callable;

    fn invoke(name: &str, args: Vec<NfValue>) -> Result<NfValue, HostCallError> {
        match core_registry().resolve(name) {
            Some(Callable::Builtin(function)) => function.invoke(args),
            other => panic!("{} is not a single builtin: {:?}", name, other),
        }
    }

    #[test]
    fn core_provider_registers_every_builtin() {
        let registry = core_registry();
        assert_eq!(
            registry.names(),
            vec!["length", "max", "print", "to_string", "type_of"]
        );
        assert!(matches!(registry.resolve("max"), Some(Callable::Overloads(list)) if list.len() == 2));
    }

    #[test]
    fn builtins_compute_their_results() {
        assert_eq!(invoke("length", vec![NfValue::from("héllo")]).expect("length"), NfValue::Int(5));
        assert_eq!(
            invoke("length", vec![NfValue::List(vec![NfValue::None; 3])]).expect("length"),
            NfValue::Int(3)
        );
        assert!(matches!(
            invoke("length", vec![NfValue::Int(1)]),
            Err(HostCallError::ArgumentMismatch(_))
        ));
        assert_eq!(
            invoke("type_of", vec![NfValue::Float(1.0)]).expect("type_of"),
            NfValue::from("float")
        );
        assert_eq!(
            invoke("to_string", vec![NfValue::List(vec![NfValue::Int(1), NfValue::from("a")])])
                .expect("to_string"),
            NfValue::from("[1, \"a\"]")
        );
        assert_eq!(invoke("print", vec![]).expect("print"), NfValue::None);
    }
}
