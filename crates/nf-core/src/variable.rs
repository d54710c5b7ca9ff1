use std::fmt;

use crate::error::{NfError, NfResult};
use crate::types::{NfType, SourceSpan};
use crate::value::NfValue;

#[derive(Debug, Clone)]
pub struct DeclaredVariable {
    name: String,
    constant: bool,
    declared_type: NfType,
    value: NfValue,
    depth: usize,
    span: Option<SourceSpan>,
}

impl DeclaredVariable {
    pub fn new(
        depth: usize,
        name: &str,
        constant: bool,
        declared_type: NfType,
        value: NfValue,
    ) -> NfResult<Self> {
        let value = declared_type.admit_or_mismatch(value, &format!("Variable \"{}\"", name))?;
        Ok(Self {
            name: name.to_string(),
            constant,
            declared_type,
            value,
            depth,
            span: None,
        })
    }

    pub fn with_span(mut self, span: SourceSpan) -> Self {
        self.span = Some(span);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_constant(&self) -> bool {
        self.constant
    }

    pub fn declared_type(&self) -> &NfType {
        &self.declared_type
    }

    pub fn value(&self) -> &NfValue {
        &self.value
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    pub fn span(&self) -> Option<&SourceSpan> {
        self.span.as_ref()
    }

    pub fn assign(&mut self, value: NfValue) -> NfResult<()> {
        if self.constant {
            return Err(NfError::new(
                "RUNTIME_CONSTANT_REASSIGNED",
                format!("Constant \"{}\" cannot be reassigned.", self.name),
            ));
        }
        self.value = self
            .declared_type
            .admit_or_mismatch(value, &format!("Variable \"{}\"", self.name))?;
        Ok(())
    }
}

impl fmt::Display for DeclaredVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.constant { "const" } else { "var" };
        write!(
            f,
            "<{} {} : {} = {}>",
            kind, self.name, self.declared_type, self.value
        )
    }
}

#[cfg(test)]
mod variable_tests {
    use super::*;

    #[test]
    fn constants_reject_reassignment() {
        let mut variable =
            DeclaredVariable::new(1, "pi", true, NfType::float(), NfValue::Float(3.14))
                .expect("declaration should pass");
        let error = variable
            .assign(NfValue::Float(3.0))
            .expect_err("constant must not change");
        assert_eq!(error.code, "RUNTIME_CONSTANT_REASSIGNED");
        assert_eq!(variable.value(), &NfValue::Float(3.14));
        assert_eq!(variable.to_string(), "<const pi : float = 3.14>");
    }

    #[test]
    fn assignment_checks_declared_type() {
        let mut variable = DeclaredVariable::new(0, "n", false, NfType::int(), NfValue::Int(1))
            .expect("declaration should pass");
        let error = variable
            .assign(NfValue::from("x"))
            .expect_err("string is not int");
        assert_eq!(error.code, "RUNTIME_TYPE_MISMATCH");
        variable.assign(NfValue::Int(4)).expect("int should pass");
        assert_eq!(variable.value(), &NfValue::Int(4));
        assert_eq!(variable.depth(), 0);

        let error = DeclaredVariable::new(0, "s", false, NfType::string(), NfValue::Int(1))
            .expect_err("initial value is checked too");
        assert_eq!(error.code, "RUNTIME_TYPE_MISMATCH");
    }
}
