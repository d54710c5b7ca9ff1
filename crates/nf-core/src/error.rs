use crate::types::SourceSpan;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvocableInfo {
    pub name: String,
    pub signature: String,
}

#[derive(Debug, Error, Clone)]
#[error("{code}: {message}")]
pub struct NfError {
    pub code: String,
    pub message: String,
    pub span: Option<SourceSpan>,
    pub invocable: Option<InvocableInfo>,
}

pub type NfResult<T> = Result<T, NfError>;

impl NfError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: None,
            invocable: None,
        }
    }

    pub fn with_span(
        code: impl Into<String>,
        message: impl Into<String>,
        span: SourceSpan,
    ) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
            span: Some(span),
            invocable: None,
        }
    }

    /// Attaches a position unless the error already carries a more precise one.
    pub fn at(mut self, span: &SourceSpan) -> Self {
        if self.span.is_none() {
            self.span = Some(span.clone());
        }
        self
    }

    pub fn with_invocable(mut self, name: impl Into<String>, signature: impl Into<String>) -> Self {
        self.invocable = Some(InvocableInfo {
            name: name.into(),
            signature: signature.into(),
        });
        self
    }

    pub fn position(&self) -> Option<(usize, usize)> {
        self.span
            .as_ref()
            .map(|span| (span.start.line, span.start.column))
    }

    /// Multi-line rendering used by front-ends: message, call site and signature.
    pub fn describe(&self) -> String {
        let mut out = format!("{}: {}", self.code, self.message);
        if let Some((line, column)) = self.position() {
            out.push_str(&format!(" (line {}, column {})", line, column));
        }
        if let Some(invocable) = &self.invocable {
            out.push_str(&format!("\n  in call to \"{}\"", invocable.name));
            if !invocable.signature.is_empty() {
                out.push_str(&format!("\n  signature: {}", invocable.signature));
            }
        }
        out
    }
}

#[cfg(test)]
mod error_tests {
    use super::*;

    #[test]
    fn at_keeps_the_first_position() {
        let error = NfError::with_span("X", "inner", SourceSpan::at(3, 4)).at(&SourceSpan::at(9, 9));
        assert_eq!(error.position(), Some((3, 4)));

        let error = NfError::new("X", "outer").at(&SourceSpan::at(9, 1));
        assert_eq!(error.position(), Some((9, 1)));
    }

    #[test]
    fn describe_includes_call_site_and_signature() {
        let error = NfError::with_span("RUNTIME_INVOCATION_FAILED", "boom", SourceSpan::at(2, 5))
            .with_invocable("Math::abs", "Math::abs(int) -> int");
        let text = error.describe();
        assert!(text.contains("line 2, column 5"));
        assert!(text.contains("\"Math::abs\""));
        assert!(text.contains("Math::abs(int) -> int"));
        assert_eq!(error.to_string(), "RUNTIME_INVOCATION_FAILED: boom");
    }
}
