use nf_core::{NfError, NfResult, NfValue};

use crate::declarations::DeclaredParameter;

/// One call-site argument, optionally named.
#[derive(Debug, Clone, PartialEq)]
pub struct CallArgument {
    pub name: Option<String>,
    pub value: NfValue,
}

impl CallArgument {
    pub fn positional(value: impl Into<NfValue>) -> Self {
        Self {
            name: None,
            value: value.into(),
        }
    }

    pub fn named(name: &str, value: impl Into<NfValue>) -> Self {
        Self {
            name: Some(name.to_string()),
            value: value.into(),
        }
    }

    pub fn is_named(&self) -> bool {
        self.name.is_some()
    }
}

/// Binds call-site arguments to declared parameters. The result follows
/// declaration order and covers every parameter.
///
/// Without named arguments, the leading arguments fill the parameters that
/// have no default, the rest fill defaulted parameters in order. With named
/// arguments, a positional argument binds the parameter at its own index,
/// named arguments bind by name, and defaults fill whatever is left.
pub fn bind_arguments(
    parameters: &[DeclaredParameter],
    arguments: Vec<CallArgument>,
) -> NfResult<Vec<(DeclaredParameter, NfValue)>> {
    if arguments.len() > parameters.len() {
        return Err(NfError::new(
            "RUNTIME_TOO_MANY_ARGUMENTS",
            format!(
                "Expected at most {} argument(s), got {}.",
                parameters.len(),
                arguments.len()
            ),
        ));
    }

    let mut slots: Vec<Option<NfValue>> = vec![None; parameters.len()];
    if arguments.iter().any(CallArgument::is_named) {
        bind_mixed(parameters, arguments, &mut slots)?;
    } else {
        bind_positional(parameters, arguments, &mut slots)?;
    }

    parameters
        .iter()
        .zip(slots)
        .map(|(parameter, slot)| {
            let value = match slot.or_else(|| parameter.default_value.clone()) {
                Some(value) => value,
                None => {
                    return Err(NfError::new(
                        "RUNTIME_ARGUMENT_NOT_MATCHED",
                        format!("Parameter \"{}\" is not matched by any argument.", parameter.name),
                    ))
                }
            };
            Ok((parameter.clone(), value))
        })
        .collect()
}

fn bind_positional(
    parameters: &[DeclaredParameter],
    arguments: Vec<CallArgument>,
    slots: &mut [Option<NfValue>],
) -> NfResult<()> {
    let required = parameters.iter().filter(|p| !p.has_default()).count();
    if arguments.len() < required {
        return Err(NfError::new(
            "RUNTIME_TOO_FEW_ARGUMENTS",
            format!(
                "Expected at least {} argument(s), got {}.",
                required,
                arguments.len()
            ),
        ));
    }
    let order = parameters
        .iter()
        .enumerate()
        .filter(|(_, parameter)| !parameter.has_default())
        .chain(
            parameters
                .iter()
                .enumerate()
                .filter(|(_, parameter)| parameter.has_default()),
        )
        .map(|(index, _)| index);
    for (index, argument) in order.zip(arguments) {
        slots[index] = Some(argument.value);
    }
    Ok(())
}

fn bind_mixed(
    parameters: &[DeclaredParameter],
    arguments: Vec<CallArgument>,
    slots: &mut [Option<NfValue>],
) -> NfResult<()> {
    let named_here = |index: usize| {
        arguments
            .iter()
            .any(|argument| argument.name.as_deref() == Some(parameters[index].name.as_str()))
    };
    for (index, argument) in arguments.iter().enumerate() {
        if argument.is_named() {
            continue;
        }
        if named_here(index) {
            return Err(NfError::new(
                "RUNTIME_DUPLICATE_BINDING",
                format!(
                    "Parameter \"{}\" is bound both by position and by name.",
                    parameters[index].name
                ),
            ));
        }
        slots[index] = Some(argument.value.clone());
    }

    for argument in arguments {
        let Some(name) = argument.name else {
            continue;
        };
        let index = parameters
            .iter()
            .position(|parameter| parameter.name == name)
            .ok_or_else(|| {
                NfError::new(
                    "RUNTIME_UNKNOWN_ARGUMENT",
                    format!("No parameter is named \"{}\".", name),
                )
            })?;
        if slots[index].is_some() {
            return Err(NfError::new(
                "RUNTIME_DUPLICATE_ARGUMENT",
                format!("Argument \"{}\" is given more than once.", name),
            ));
        }
        slots[index] = Some(argument.value);
    }
    Ok(())
}
