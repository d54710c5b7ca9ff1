use std::collections::BTreeMap;
use std::sync::Arc;

use nf_core::{NfError, NfResult};
use serde::{Deserialize, Serialize};

use crate::bridge::{FieldAccessPolicy, HostFunctionRegistry, OverloadResolver};
use crate::evaluator::Evaluator;

/// Display strings for grammar tokens, used only when formatting
/// diagnostics. Missing entries fall back to the raw token name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticSymbols {
    #[serde(default)]
    tokens: BTreeMap<String, String>,
    #[serde(default)]
    literal_keywords: Vec<String>,
}

pub const TOKEN_SEPARATOR: &str = "COLON";
pub const TOKEN_OPTIONAL: &str = "QUESTION";

impl DiagnosticSymbols {
    pub fn from_json(source: &str) -> NfResult<Self> {
        serde_json::from_str(source).map_err(|error| {
            NfError::new(
                "RUNTIME_ILLEGAL_ARGUMENT",
                format!("Diagnostic symbols are not valid JSON: {}", error),
            )
        })
    }

    pub fn with_token(mut self, token: &str, display: &str) -> Self {
        self.tokens.insert(token.to_string(), display.to_string());
        self
    }

    pub fn display(&self, token: &str) -> String {
        self.tokens
            .get(token)
            .cloned()
            .unwrap_or_else(|| token.to_string())
    }

    /// Like `display`, but with an explicit fallback for tokens whose raw
    /// name is not what a reader expects to see.
    pub fn display_or(&self, token: &str, fallback: &str) -> String {
        self.tokens
            .get(token)
            .cloned()
            .unwrap_or_else(|| fallback.to_string())
    }

    pub fn is_literal_keyword(&self, word: &str) -> bool {
        self.literal_keywords.iter().any(|keyword| keyword == word)
    }

    pub fn literal_keywords(&self) -> &[String] {
        &self.literal_keywords
    }
}

#[derive(Clone)]
pub struct RuntimeOptions {
    pub host_functions: Option<Arc<dyn HostFunctionRegistry>>,
    pub overload_resolver: Option<Arc<dyn OverloadResolver>>,
    pub evaluator: Option<Arc<dyn Evaluator>>,
    pub field_access: FieldAccessPolicy,
    pub symbols: DiagnosticSymbols,
    pub install_builtins: bool,
}

impl Default for RuntimeOptions {
    fn default() -> Self {
        Self {
            host_functions: None,
            overload_resolver: None,
            evaluator: None,
            field_access: FieldAccessPolicy::default(),
            symbols: DiagnosticSymbols::default(),
            install_builtins: true,
        }
    }
}

#[cfg(test)]
mod options_tests {
    use super::*;

    #[test]
    fn symbols_fall_back_to_raw_names() {
        let symbols = DiagnosticSymbols::from_json(
            r#"{"tokens": {"PLUS": "+"}, "literal_keywords": ["true", "false"]}"#,
        )
        .expect("symbols should parse");
        assert_eq!(symbols.display("PLUS"), "+");
        assert_eq!(symbols.display("MINUS"), "MINUS");
        assert_eq!(symbols.display_or(TOKEN_SEPARATOR, ":"), ":");
        assert!(symbols.is_literal_keyword("true"));
        assert!(!symbols.is_literal_keyword("none"));

        let empty = DiagnosticSymbols::default();
        assert_eq!(empty.display("PLUS"), "PLUS");
        assert!(empty.literal_keywords().is_empty());
    }

    #[test]
    fn invalid_symbol_files_are_reported() {
        let error = DiagnosticSymbols::from_json("{").expect_err("broken json");
        assert_eq!(error.code, "RUNTIME_ILLEGAL_ARGUMENT");
    }

    #[test]
    fn defaults_install_builtins_with_safe_field_access() {
        let options = RuntimeOptions::default();
        assert!(options.install_builtins);
        assert!(options.field_access.safe);
        assert!(!options.field_access.fail_fast);
    }
}
