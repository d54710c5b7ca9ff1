use std::fmt::Display;

use nf_core::NfError;

fn map_error(code: &'static str, error: impl Display) -> NfError {
    NfError::new(code, error.to_string())
}

pub(crate) fn json_string(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| format!("{:?}", text))
}

pub(crate) fn emit_error(error: NfError) -> i32 {
    println!("RESULT:ERROR");
    println!("ERROR_CODE:{}", error.code);
    println!("ERROR_MSG_JSON:{}", json_string(&error.message));
    if let Some((line, column)) = error.position() {
        println!("ERROR_AT:{}:{}", line, column);
    }
    if let Some(invocable) = error.invocable {
        println!("INVOCABLE_JSON:{}", json_string(&invocable.name));
        if !invocable.signature.is_empty() {
            println!("SIGNATURE_JSON:{}", json_string(&invocable.signature));
        }
    }
    1
}

pub(crate) fn map_cli_io(error: std::io::Error) -> NfError {
    map_error("CLI_IO", error)
}

pub(crate) fn map_cli_symbols_invalid(error: serde_json::Error) -> NfError {
    map_error("CLI_SYMBOLS_INVALID", error)
}
