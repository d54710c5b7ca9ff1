use std::ffi::OsString;
use std::fs;

use clap::Parser;
use nf_api::{parse_program, run_program, CreateRuntimeOptions};
use nf_core::{NfError, NfValue};
use nf_runtime::{DiagnosticSymbols, FieldAccessPolicy};
use tracing::debug;
use tracing_subscriber::EnvFilter;

mod cli_args;
mod error_map;

pub(crate) use cli_args::{Cli, Mode, RunArgs};
pub(crate) use error_map::{emit_error, json_string, map_cli_io, map_cli_symbols_invalid};

const LOG_ENV: &str = "NF_LOG";
const DEFAULT_LOG_FILTER: &str = "warn";

pub fn run_cli_from_args<I, T>(args: I) -> i32
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let cli = match Cli::try_parse_from(args) {
        Ok(cli) => cli,
        Err(error) => {
            let _ = error.print();
            return error.exit_code();
        }
    };
    init_logging(cli.log_level.as_deref());
    match run(cli) {
        Ok(code) => code,
        Err(error) => emit_error(error),
    }
}

/// Logs go to stderr so the result protocol on stdout stays parseable.
fn init_logging(level: Option<&str>) {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).ok(),
        None => EnvFilter::try_from_env(LOG_ENV).ok(),
    }
    .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<i32, NfError> {
    match cli.command {
        Mode::Run(args) => run_tree(args),
    }
}

fn run_tree(args: RunArgs) -> Result<i32, NfError> {
    let source = fs::read_to_string(&args.tree).map_err(map_cli_io)?;
    let symbols = args.symbols.as_deref().map(load_symbols).transpose()?;
    let program = parse_program(&source)?;
    let runtime = nf_api::create_runtime(CreateRuntimeOptions {
        field_access: args.strict_fields.then_some(FieldAccessPolicy {
            safe: false,
            fail_fast: true,
        }),
        symbols,
        without_builtins: args.no_builtins,
        ..CreateRuntimeOptions::default()
    })?;
    debug!(tree = %args.tree, "running program");
    let value = run_program(&runtime, &program)?;
    emit_value(&value);
    Ok(0)
}

fn load_symbols(path: &str) -> Result<DiagnosticSymbols, NfError> {
    let source = fs::read_to_string(path).map_err(map_cli_io)?;
    serde_json::from_str(&source).map_err(map_cli_symbols_invalid)
}

fn emit_value(value: &NfValue) {
    println!("RESULT:OK");
    println!("TYPE:{}", value.type_name());
    println!("VALUE_JSON:{}", json_string(&value.to_string()));
}
